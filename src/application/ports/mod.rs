//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod chat_sessions;
mod command_handler;
mod repositories;
mod token_source;
mod turn_events;

pub use chat_sessions::{ChatSession, ChatSessionError, ChatSessionManagerPort};
pub use command_handler::{CommandHandlerPort, HandlerError, HandlerOutcome, HandlerRegistry};
pub use repositories::{EntityRecord, EntityRepositoryPort, NewEntity, RepositoryError};
pub use token_source::{
    ChatMessage, ChatRole, CompletionRequest, TokenSourceError, TokenSourcePort, TokenStream,
};
pub use turn_events::{TurnEvent, TurnEventSink};
