//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Command Context: 流式命令协议（语法、扫描、解码）
//! - Story Context: 命令所操作的故事实体的值对象

pub mod command;
pub mod story;
