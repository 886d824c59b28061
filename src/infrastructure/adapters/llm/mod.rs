//! LLM Adapter - 流式补全的 Token Source 实现

mod http_token_source;
mod scripted_token_source;

pub use http_token_source::{HttpTokenSource, HttpTokenSourceConfig};
pub use scripted_token_source::ScriptedTokenSource;
