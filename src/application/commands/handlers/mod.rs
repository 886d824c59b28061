//! Command Handlers 实现
//!
//! - 对话用例（会话、回合）
//! - 命令副作用处理器（故事 / 角色 / 章节 / 大纲 / 对白）

mod chat_handlers;
mod story_command_handlers;

pub use chat_handlers::*;
pub use story_command_handlers::*;
