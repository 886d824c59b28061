//! Command Context - Errors

use thiserror::Error;

use super::grammar::Precondition;
use super::CommandKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("载荷不是合法的 JSON: {0}")]
    MalformedJson(String),

    #[error("参数无效: {0}")]
    InvalidParams(String),

    #[error("缺少必填字段: {0}")]
    MissingField(&'static str),

    #[error("对白批次中没有有效条目（跳过 {skipped} 条）")]
    EmptyBatch { skipped: usize },

    #[error("未注册的命令: {0}")]
    UnknownKind(CommandKind),

    #[error("前置条件不满足: {}", .0.describe())]
    PreconditionUnmet(Precondition),
}
