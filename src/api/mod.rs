//! HTTP surface.

pub mod health;
pub mod openai;
pub mod request_id;
