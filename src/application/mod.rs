//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（TokenSource、CommandHandler、Repository、ChatSession 等）
//! - dispatch: 流式命令分发（协调器、分发记录、展示、回合驱动）
//! - prompt: 由命令语法生成的模型提示
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod dispatch;
pub mod error;
pub mod ports;
pub mod prompt;
pub mod queries;

// Re-exports
pub use commands::{
    CancelTurn,
    CancelTurnResponse,
    CloseChatSession,
    CloseChatSessionResponse,
    CreateChatSession,
    CreateChatSessionResponse,
    SelectStory,
    SendMessage,
    SendMessageResponse,
    // Handlers
    handlers::{
        standard_registry, CancelTurnHandler, ChapterHandler, CharacterHandler,
        CloseChatSessionHandler, CreateChatSessionHandler, DialogueHandler, OutlineHandler,
        SelectStoryHandler, SendMessageHandler, StoryHandler,
    },
};

pub use dispatch::{
    run_turn, DispatchCoordinator, DispatchLedger, DispatchRecord, DispatchStatus, FailureKind,
    Presentation, PresentedStatus, StreamPresenter, TurnContext, TurnGate, TurnOutcome,
    TurnReport,
};

pub use error::ApplicationError;

pub use ports::{
    // Chat sessions
    ChatSession,
    ChatSessionError,
    ChatSessionManagerPort,
    // Command handlers
    CommandHandlerPort,
    HandlerError,
    HandlerOutcome,
    HandlerRegistry,
    // Repositories
    EntityRecord,
    EntityRepositoryPort,
    NewEntity,
    RepositoryError,
    // Token source
    ChatMessage,
    ChatRole,
    CompletionRequest,
    TokenSourceError,
    TokenSourcePort,
    TokenStream,
    // Turn events
    TurnEvent,
    TurnEventSink,
};

pub use queries::{
    GetChatSession,
    ListEntities,
    // Handlers
    handlers::{ChatSessionResponse, GetChatSessionHandler, ListEntitiesHandler},
};
