//! Dispatch - 流式命令分发
//!
//! 职责:
//! - 回合上下文（当前故事等请求级状态）
//! - 分发记录：每个命令出现至多执行一次
//! - 分发协调器：片段 -> 扫描 -> 解码 -> 处理器
//! - 展示：去除命令语法的文本 + 最近命令状态
//! - 回合驱动与会话级闸门

mod context;
mod coordinator;
mod ledger;
mod presenter;
mod turn;

pub use context::TurnContext;
pub use coordinator::DispatchCoordinator;
pub use ledger::{DispatchLedger, DispatchRecord, DispatchStatus, FailureKind};
pub use presenter::{Presentation, PresentedStatus, StreamPresenter};
pub use turn::{run_turn, TurnGate, TurnOutcome, TurnReport, TurnTicket};
