//! Text completions: `/v1/completions` ⇄ `/api/generate`.

use super::{options, stream::ChunkMapper, ResponseMeta};
use crate::{
    backends::ollama::{self, GenerateChunk, GenerateResponse},
    openai::{CompletionRequest, FinishReason, TextChoice, TextCompletion, Usage},
};

/// Build the `/api/generate` body.
pub fn to_ollama(request: &CompletionRequest) -> ollama::GenerateRequest {
    ollama::GenerateRequest {
        model: request.model.clone(),
        prompt: request.prompt.clone(),
        stream: request.stream,
        options: options(request.temperature, request.max_tokens),
    }
}

/// Wrap a buffered `/api/generate` reply as a `text_completion`.
pub fn from_ollama(response: GenerateResponse, meta: ResponseMeta) -> TextCompletion {
    TextCompletion {
        id: meta.id,
        object: "text_completion",
        created: meta.created,
        model: meta.model,
        choices: vec![TextChoice {
            index: 0,
            text: response.response,
            finish_reason: Some(FinishReason::Stop),
        }],
        usage: Some(Usage::default()),
    }
}

/// Produces streamed `text_completion` chunks sharing one [`ResponseMeta`].
pub struct TextChunks {
    meta: ResponseMeta,
}

impl TextChunks {
    pub fn new(meta: ResponseMeta) -> Self {
        Self { meta }
    }

    fn chunk(&self, text: String, finish_reason: Option<FinishReason>) -> TextCompletion {
        TextCompletion {
            id: self.meta.id.clone(),
            object: "text_completion",
            created: self.meta.created,
            model: self.meta.model.clone(),
            choices: vec![TextChoice { index: 0, text, finish_reason }],
            usage: None,
        }
    }
}

impl ChunkMapper for TextChunks {
    type Line = GenerateChunk;
    type Chunk = TextCompletion;

    fn content_chunk(&self, text: &str) -> TextCompletion {
        self.chunk(text.to_string(), None)
    }

    fn terminal_chunk(&self) -> TextCompletion {
        self.chunk(String::new(), Some(FinishReason::Stop))
    }
}
