//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;

use crate::application::{
    // Command handlers
    standard_registry, CancelTurnHandler, CloseChatSessionHandler, CreateChatSessionHandler,
    SelectStoryHandler, SendMessageHandler,
    // Query handlers
    GetChatSessionHandler, ListEntitiesHandler,
    // Ports
    ChatSessionManagerPort, EntityRepositoryPort, TokenSourcePort,
};
use crate::domain::command::CommandGrammar;
use crate::infrastructure::events::EventPublisher;

/// 应用状态
///
/// 会话为内存实现，实体存储由配置选择（SQLite / 内存）
pub struct AppState {
    // ========== Ports ==========
    pub sessions: Arc<dyn ChatSessionManagerPort>,
    pub entity_repo: Arc<dyn EntityRepositoryPort>,
    pub token_source: Arc<dyn TokenSourcePort>,
    pub event_publisher: Arc<EventPublisher>,

    // ========== Command Handlers ==========
    pub create_session_handler: CreateChatSessionHandler,
    pub select_story_handler: SelectStoryHandler,
    pub send_message_handler: SendMessageHandler,
    pub cancel_turn_handler: CancelTurnHandler,
    pub close_session_handler: CloseChatSessionHandler,

    // ========== Query Handlers ==========
    pub get_session_handler: GetChatSessionHandler,
    pub list_entities_handler: ListEntitiesHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        sessions: Arc<dyn ChatSessionManagerPort>,
        entity_repo: Arc<dyn EntityRepositoryPort>,
        token_source: Arc<dyn TokenSourcePort>,
        event_publisher: Arc<EventPublisher>,
        history_limit: usize,
    ) -> Self {
        let grammar = Arc::new(CommandGrammar::default());
        let registry = standard_registry(entity_repo.clone());

        Self {
            // Ports
            sessions: sessions.clone(),
            entity_repo: entity_repo.clone(),
            token_source: token_source.clone(),
            event_publisher: event_publisher.clone(),

            // Command handlers
            create_session_handler: CreateChatSessionHandler::new(
                sessions.clone(),
                entity_repo.clone(),
            ),
            select_story_handler: SelectStoryHandler::new(sessions.clone(), entity_repo.clone()),
            send_message_handler: SendMessageHandler::new(
                sessions.clone(),
                token_source,
                grammar,
                registry,
                event_publisher.clone(),
                history_limit,
            ),
            cancel_turn_handler: CancelTurnHandler::new(sessions.clone()),
            close_session_handler: CloseChatSessionHandler::new(
                sessions.clone(),
                event_publisher,
            ),

            // Query handlers
            get_session_handler: GetChatSessionHandler::new(sessions),
            list_entities_handler: ListEntitiesHandler::new(entity_repo),
        }
    }
}
