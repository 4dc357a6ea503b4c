//! `/api/tags` → `/v1/models`.

use crate::{
    backends::ollama::TagsResponse,
    openai::{ModelInfo, ModelList, MODEL_OWNER},
};

/// Build the OpenAI model list. Ollama keeps no creation time we can use, so
/// every entry reports `created` as the translation time.
pub fn to_openai(tags: TagsResponse, created: i64) -> ModelList {
    let data = tags
        .models
        .into_iter()
        .map(|tag| ModelInfo {
            id: tag.name,
            object: "model",
            created,
            owned_by: MODEL_OWNER,
        })
        .collect();

    ModelList { object: "list", data }
}
