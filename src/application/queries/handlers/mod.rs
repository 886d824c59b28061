//! Query Handlers 实现

mod chat_handlers;

pub use chat_handlers::*;
