//! Chat Command Handlers - 对话会话与回合

use futures_util::StreamExt;
use std::sync::Arc;

use crate::application::commands::chat_commands::*;
use crate::application::dispatch::{run_turn, DispatchCoordinator, TurnContext};
use crate::application::error::ApplicationError;
use crate::application::ports::{
    ChatMessage, ChatSession, ChatSessionManagerPort, CompletionRequest, EntityRepositoryPort,
    HandlerRegistry, TokenSourcePort, TurnEvent, TurnEventSink,
};
use crate::application::prompt::system_prompt;
use crate::domain::command::CommandGrammar;
use crate::domain::story::EntityKind;
use crate::infrastructure::events::EventPublisher;

/// CreateChatSession Handler
pub struct CreateChatSessionHandler {
    sessions: Arc<dyn ChatSessionManagerPort>,
    repo: Arc<dyn EntityRepositoryPort>,
}

impl CreateChatSessionHandler {
    pub fn new(sessions: Arc<dyn ChatSessionManagerPort>, repo: Arc<dyn EntityRepositoryPort>) -> Self {
        Self { sessions, repo }
    }

    pub async fn handle(
        &self,
        cmd: CreateChatSession,
    ) -> Result<CreateChatSessionResponse, ApplicationError> {
        if let Some(story_id) = cmd.active_story {
            self.repo
                .find(EntityKind::Story, story_id)
                .await?
                .ok_or_else(|| ApplicationError::not_found("Story", story_id))?;
        }

        let session_id = self.sessions.create(ChatSession::new(cmd.active_story))?;

        tracing::info!(
            session_id = %session_id,
            active_story = ?cmd.active_story,
            "Chat session created"
        );

        Ok(CreateChatSessionResponse {
            session_id,
            active_story: cmd.active_story,
        })
    }
}

/// SelectStory Handler
pub struct SelectStoryHandler {
    sessions: Arc<dyn ChatSessionManagerPort>,
    repo: Arc<dyn EntityRepositoryPort>,
}

impl SelectStoryHandler {
    pub fn new(sessions: Arc<dyn ChatSessionManagerPort>, repo: Arc<dyn EntityRepositoryPort>) -> Self {
        Self { sessions, repo }
    }

    pub async fn handle(&self, cmd: SelectStory) -> Result<(), ApplicationError> {
        self.sessions.get(&cmd.session_id)?;

        if let Some(story_id) = cmd.story_id {
            self.repo
                .find(EntityKind::Story, story_id)
                .await?
                .ok_or_else(|| ApplicationError::not_found("Story", story_id))?;
        }

        self.sessions.set_active_story(&cmd.session_id, cmd.story_id)?;
        self.sessions.touch(&cmd.session_id);

        tracing::info!(
            session_id = %cmd.session_id,
            story_id = ?cmd.story_id,
            "Story selected"
        );
        Ok(())
    }
}

/// SendMessage Handler - 运行一个回合
///
/// 同一会话的新回合会先取消上一个回合并等待它结束。
/// 回合在独立任务中运行：调用方（例如断开的 HTTP 请求）放弃等待时，
/// 已开始的处理器调用仍会执行完毕，回合结果照常同步回会话。
pub struct SendMessageHandler {
    runner: Arc<TurnRunner>,
}

impl SendMessageHandler {
    pub fn new(
        sessions: Arc<dyn ChatSessionManagerPort>,
        token_source: Arc<dyn TokenSourcePort>,
        grammar: Arc<CommandGrammar>,
        registry: HandlerRegistry,
        events: Arc<dyn TurnEventSink>,
        history_limit: usize,
    ) -> Self {
        Self {
            runner: Arc::new(TurnRunner {
                sessions,
                token_source,
                grammar,
                registry,
                events,
                history_limit,
            }),
        }
    }

    pub async fn handle(&self, cmd: SendMessage) -> Result<SendMessageResponse, ApplicationError> {
        let message = cmd.message.trim().to_string();
        if message.is_empty() {
            return Err(ApplicationError::validation("message must not be empty"));
        }
        self.runner.sessions.get(&cmd.session_id)?;

        let runner = self.runner.clone();
        let session_id = cmd.session_id;
        tokio::spawn(async move { runner.run(session_id, message).await })
            .await
            .map_err(|e| ApplicationError::internal(format!("turn task failed: {}", e)))?
    }
}

/// 回合执行体，由 SendMessageHandler 放入独立任务运行
struct TurnRunner {
    sessions: Arc<dyn ChatSessionManagerPort>,
    token_source: Arc<dyn TokenSourcePort>,
    grammar: Arc<CommandGrammar>,
    registry: HandlerRegistry,
    events: Arc<dyn TurnEventSink>,
    history_limit: usize,
}

impl TurnRunner {
    async fn run(
        &self,
        session_id: String,
        message: String,
    ) -> Result<SendMessageResponse, ApplicationError> {
        let gate = self.sessions.get(&session_id)?.gate;
        let ticket = gate.begin().await;

        // 上一个回合可能改变了选中的故事，占用闸门后重新读取
        let session = self.sessions.get(&session_id)?;
        self.sessions.touch(&session_id);
        let context = TurnContext::new(&session_id, session.active_story);

        let stream = if ticket.token().is_cancelled() {
            // 排队期间已被更新的回合取消，不再请求模型
            futures_util::stream::empty().boxed()
        } else {
            let mut messages = Vec::with_capacity(session.history.len() + 2);
            messages.push(ChatMessage::system(system_prompt(&self.grammar, &context)));
            messages.extend(session.history.iter().cloned());
            messages.push(ChatMessage::user(message.clone()));

            match self.token_source.open(CompletionRequest { messages }).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Failed to open token stream");
                    self.events.publish(TurnEvent::TurnFinished {
                        session_id: session_id.clone(),
                        outcome: "stream_failed".to_string(),
                    });
                    return Err(e.into());
                }
            }
        };

        let coordinator = DispatchCoordinator::new(
            self.grammar.clone(),
            self.registry.clone(),
            context,
            self.events.clone(),
        );
        let report = run_turn(coordinator, stream, ticket.token()).await;

        // 已执行的命令无论如何都生效；会话在回合期间被关闭时只记录日志，报告照常返回
        if let Err(e) = self
            .sessions
            .set_active_story(&session_id, report.context.active_story)
        {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to sync active story after turn");
        }

        if report.outcome.persists() {
            if let Err(e) = self.sessions.append_exchange(
                &session_id,
                ChatMessage::user(message),
                ChatMessage::assistant(report.presentation.display_text.clone()),
                self.history_limit,
            ) {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to append turn to history");
            }
        }
        self.sessions.touch(&session_id);
        drop(ticket);

        Ok(SendMessageResponse {
            session_id,
            active_story: report.context.active_story,
            report,
        })
    }
}

/// CancelTurn Handler
pub struct CancelTurnHandler {
    sessions: Arc<dyn ChatSessionManagerPort>,
}

impl CancelTurnHandler {
    pub fn new(sessions: Arc<dyn ChatSessionManagerPort>) -> Self {
        Self { sessions }
    }

    pub fn handle(&self, cmd: CancelTurn) -> Result<CancelTurnResponse, ApplicationError> {
        let session = self.sessions.get(&cmd.session_id)?;
        let cancelled = session.gate.cancel_current();

        tracing::info!(session_id = %cmd.session_id, cancelled = cancelled, "Turn cancel requested");

        Ok(CancelTurnResponse {
            session_id: cmd.session_id,
            cancelled,
        })
    }
}

/// CloseChatSession Handler
pub struct CloseChatSessionHandler {
    sessions: Arc<dyn ChatSessionManagerPort>,
    event_publisher: Arc<EventPublisher>,
}

impl CloseChatSessionHandler {
    pub fn new(sessions: Arc<dyn ChatSessionManagerPort>, event_publisher: Arc<EventPublisher>) -> Self {
        Self {
            sessions,
            event_publisher,
        }
    }

    pub fn handle(&self, cmd: CloseChatSession) -> Result<CloseChatSessionResponse, ApplicationError> {
        // 关闭会话，正在运行的回合随之取消
        let session = self.sessions.close(&cmd.session_id)?;
        let cancelled = session.gate.cancel_current();

        // 发布会话关闭事件
        self.event_publisher.publish(TurnEvent::SessionClosed {
            session_id: cmd.session_id.clone(),
            reason: "client_close".to_string(),
        });

        // 取消注册事件通道
        self.event_publisher.unregister_session(&cmd.session_id);

        tracing::info!(
            session_id = %cmd.session_id,
            cancelled_turn = cancelled,
            "Chat session closed"
        );

        Ok(CloseChatSessionResponse {
            session_id: cmd.session_id,
        })
    }
}
