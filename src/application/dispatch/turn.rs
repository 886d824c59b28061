//! Turn Runner - 驱动一个回合
//!
//! 从文本片段流逐个读取片段交给协调器，每个片段（包括它触发的处理器调用）
//! 处理完之后才读取下一个。取消只在片段之间生效，已开始的处理器调用会执行完毕。

use futures_util::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::coordinator::DispatchCoordinator;
use super::context::TurnContext;
use super::ledger::DispatchRecord;
use super::presenter::Presentation;
use crate::application::ports::{TokenStream, TurnEvent};

/// 回合结束方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// 流正常结束
    Completed,
    /// 模型服务出错，带错误描述
    StreamFailed(String),
    /// 被调用方取消
    Cancelled,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Completed => "completed",
            TurnOutcome::StreamFailed(_) => "stream_failed",
            TurnOutcome::Cancelled => "cancelled",
        }
    }

    /// 回合结果是否应写入对话历史
    pub fn persists(&self) -> bool {
        !matches!(self, TurnOutcome::Cancelled)
    }
}

impl std::fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnOutcome::StreamFailed(reason) => write!(f, "stream_failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// 回合报告
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub turn_id: String,
    pub outcome: TurnOutcome,
    pub presentation: Presentation,
    pub records: Vec<DispatchRecord>,
    /// 回合结束时的上下文（可能被处理器改变）
    #[serde(skip)]
    pub context: TurnContext,
    /// 完整累积文本
    #[serde(skip)]
    pub text: String,
}

/// 运行一个回合直到流结束、出错或被取消
pub async fn run_turn(
    mut coordinator: DispatchCoordinator,
    mut stream: TokenStream,
    cancel: CancellationToken,
) -> TurnReport {
    let turn_id = Uuid::new_v4().to_string();
    let session_id = coordinator.session_id().to_string();

    tracing::info!(session_id = %session_id, turn_id = %turn_id, "Turn started");
    coordinator.publish(TurnEvent::TurnStarted {
        session_id: session_id.clone(),
        turn_id: turn_id.clone(),
    });

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break TurnOutcome::Cancelled,
            item = stream.next() => item,
        };

        match next {
            Some(Ok(fragment)) => {
                coordinator.on_fragment(&fragment).await;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    session_id = %session_id,
                    turn_id = %turn_id,
                    error = %e,
                    "Token stream failed"
                );
                break TurnOutcome::StreamFailed(e.to_string());
            }
            None => break TurnOutcome::Completed,
        }
    };

    let presentation = coordinator.finish(&outcome).await;
    let records = coordinator.records();

    tracing::info!(
        session_id = %session_id,
        turn_id = %turn_id,
        outcome = %outcome,
        commands = records.len(),
        "Turn finished"
    );
    coordinator.publish(TurnEvent::TurnFinished {
        session_id,
        outcome: outcome.as_str().to_string(),
    });

    TurnReport {
        turn_id,
        outcome,
        presentation,
        records,
        context: coordinator.context().clone(),
        text: coordinator.accumulator().to_string(),
    }
}

// ============================================================================
// Turn Gate
// ============================================================================

/// 会话级回合闸门：同一会话同时只有一个回合在运行
///
/// 新回合先登记自己的取消令牌并取消所有已登记的回合（运行中的和排队中的），
/// 再等待闸门空闲。连续到达的多个回合中总是最新的那个得以运行。
#[derive(Debug, Default)]
pub struct TurnGate {
    running: Arc<tokio::sync::Mutex<()>>,
    registered: Mutex<Vec<(u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl TurnGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取消之前的回合，等待其结束后占用闸门
    pub async fn begin(self: &Arc<Self>) -> TurnTicket {
        let token = CancellationToken::new();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut registered = self.registered_slot();
            for (_, previous) in registered.iter() {
                previous.cancel();
            }
            registered.push((id, token.clone()));
        }

        // 等待期间 future 被丢弃时由 Registration 注销
        let registration = Registration {
            gate: self.clone(),
            id,
            token,
        };
        let guard = self.running.clone().lock_owned().await;

        TurnTicket {
            registration,
            _guard: guard,
        }
    }

    /// 取消所有已登记的回合，没有回合时返回 false
    pub fn cancel_current(&self) -> bool {
        let registered = self.registered_slot();
        for (_, token) in registered.iter() {
            token.cancel();
        }
        !registered.is_empty()
    }

    pub fn is_busy(&self) -> bool {
        !self.registered_slot().is_empty()
    }

    fn registered_slot(&self) -> std::sync::MutexGuard<'_, Vec<(u64, CancellationToken)>> {
        self.registered.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Registration {
    gate: Arc<TurnGate>,
    id: u64,
    token: CancellationToken,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.gate
            .registered_slot()
            .retain(|(id, _)| *id != self.id);
    }
}

/// 回合许可，释放时注销并让出闸门
pub struct TurnTicket {
    registration: Registration,
    _guard: OwnedMutexGuard<()>,
}

impl TurnTicket {
    pub fn token(&self) -> CancellationToken {
        self.registration.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch::{DispatchStatus, PresentedStatus};
    use crate::application::ports::{
        CommandHandlerPort, HandlerError, HandlerOutcome, HandlerRegistry, TokenSourceError,
        TurnEventSink,
    };
    use crate::domain::command::{CommandGrammar, CommandKind, CommandParams};
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    struct CountingHandler(AtomicUsize);

    #[async_trait]
    impl CommandHandlerPort for CountingHandler {
        async fn handle(
            &self,
            _params: &CommandParams,
            _context: &TurnContext,
        ) -> Result<HandlerOutcome, HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerOutcome::Done)
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<TurnEvent>>);

    impl TurnEventSink for CollectingSink {
        fn publish(&self, event: TurnEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn coordinator(handler: Arc<CountingHandler>, sink: Arc<CollectingSink>) -> DispatchCoordinator {
        let mut registry = HandlerRegistry::new();
        registry.register(CommandKind::CreateStory, handler);
        DispatchCoordinator::new(
            Arc::new(CommandGrammar::default()),
            registry,
            TurnContext::new("s1", None),
            sink,
        )
    }

    fn fragments(parts: &[&str]) -> TokenStream {
        let items: Vec<Result<String, TokenSourceError>> =
            parts.iter().map(|s| Ok(s.to_string())).collect();
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_run_turn_completed() {
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let sink = Arc::new(CollectingSink::default());

        let report = run_turn(
            coordinator(handler.clone(), sink.clone()),
            fragments(&["Đã xong! /create-", "story {\"title\":", "\"Hello\"}"]),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.outcome, TurnOutcome::Completed);
        assert_eq!(report.presentation.display_text, "Đã xong!");
        assert_eq!(report.presentation.status, PresentedStatus::Success);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].status, DispatchStatus::Success);
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);

        let events = sink.0.lock().unwrap().clone();
        assert!(matches!(events.first(), Some(TurnEvent::TurnStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(TurnEvent::TurnFinished { outcome, .. }) if outcome == "completed"
        ));
    }

    #[tokio::test]
    async fn test_run_turn_stream_failure_keeps_partial_state() {
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let sink = Arc::new(CollectingSink::default());

        let items: Vec<Result<String, TokenSourceError>> = vec![
            Ok("Một /create-story {\"title\":\"A\"} ".to_string()),
            Ok("hai /create-story {\"ti".to_string()),
            Err(TokenSourceError::NetworkError("reset".to_string())),
            Ok("never read".to_string()),
        ];

        let report = run_turn(
            coordinator(handler.clone(), sink),
            stream::iter(items).boxed(),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(report.outcome, TurnOutcome::StreamFailed(_)));
        assert!(report.outcome.persists());
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[1].status, DispatchStatus::Error);
        assert!(!report.text.contains("never read"));
        assert_eq!(report.presentation.display_text, "Một");
    }

    #[tokio::test]
    async fn test_run_turn_cancelled_stops_reading() {
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let sink = Arc::new(CollectingSink::default());
        let cancel = CancellationToken::new();

        let first = stream::iter(vec![Ok::<_, TokenSourceError>("Xin chào ".to_string())]);
        let cancel_on_pull = {
            let cancel = cancel.clone();
            stream::once(async move {
                cancel.cancel();
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok("/create-story {\"title\":\"X\"}".to_string())
            })
        };

        let report = run_turn(
            coordinator(handler.clone(), sink),
            first.chain(cancel_on_pull).boxed(),
            cancel,
        )
        .await;

        assert_eq!(report.outcome, TurnOutcome::Cancelled);
        assert!(!report.outcome.persists());
        assert_eq!(handler.0.load(Ordering::SeqCst), 0);
        assert!(report.records.is_empty());
        assert_eq!(report.text, "Xin chào ");
    }

    #[tokio::test]
    async fn test_gate_cancels_previous_turn() {
        let gate = Arc::new(TurnGate::new());
        assert!(!gate.cancel_current());

        let first = gate.begin().await;
        let first_token = first.token();
        assert!(gate.is_busy());

        let gate2 = gate.clone();
        let second = tokio::spawn(async move {
            let ticket = gate2.begin().await;
            ticket.token().is_cancelled()
        });

        first_token.cancelled().await;
        drop(first);

        assert!(!second.await.unwrap());
        assert!(!gate.is_busy());
    }

    /// 在 handle 内部触发取消的处理器
    struct CancellingHandler {
        cancel: CancellationToken,
        finished: AtomicBool,
    }

    #[async_trait]
    impl CommandHandlerPort for CancellingHandler {
        async fn handle(
            &self,
            _params: &CommandParams,
            _context: &TurnContext,
        ) -> Result<HandlerOutcome, HandlerError> {
            self.cancel.cancel();
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(HandlerOutcome::Done)
        }
    }

    #[tokio::test]
    async fn test_cancel_during_handler_lets_it_finish() {
        let cancel = CancellationToken::new();
        let handler = Arc::new(CancellingHandler {
            cancel: cancel.clone(),
            finished: AtomicBool::new(false),
        });
        let mut registry = HandlerRegistry::new();
        registry.register(CommandKind::CreateStory, handler.clone());
        let coordinator = DispatchCoordinator::new(
            Arc::new(CommandGrammar::default()),
            registry,
            TurnContext::new("s1", None),
            Arc::new(CollectingSink::default()),
        );

        let later_read = Arc::new(AtomicBool::new(false));
        let first = stream::iter(vec![Ok::<_, TokenSourceError>(
            "Mở đầu /create-story {\"title\":\"A\"}\n".to_string(),
        )]);
        let second = {
            let later_read = later_read.clone();
            stream::once(async move {
                later_read.store(true, Ordering::SeqCst);
                Ok("/create-story {\"title\":\"B\"}".to_string())
            })
        };

        let report = run_turn(coordinator, first.chain(second).boxed(), cancel).await;

        assert_eq!(report.outcome, TurnOutcome::Cancelled);
        assert!(handler.finished.load(Ordering::SeqCst));
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].status, DispatchStatus::Success);
        assert!(!later_read.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_gate_newest_turn_cancels_queued_turns() {
        let gate = Arc::new(TurnGate::new());
        let a = gate.begin().await;
        let a_token = a.token();

        let b = gate.begin();
        tokio::pin!(b);
        assert!(futures_util::poll!(b.as_mut()).is_pending());
        assert!(a_token.is_cancelled());

        // A 释放前 C 已到达：B 必须被取消，而不是正常运行
        let c = gate.begin();
        tokio::pin!(c);
        assert!(futures_util::poll!(c.as_mut()).is_pending());

        drop(a);
        let b_ticket = b.await;
        assert!(b_ticket.token().is_cancelled());
        drop(b_ticket);

        let c_ticket = c.await;
        assert!(!c_ticket.token().is_cancelled());
        drop(c_ticket);
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_gate_abandoned_wait_unregisters() {
        let gate = Arc::new(TurnGate::new());
        let a = gate.begin().await;

        {
            let waiting = gate.begin();
            tokio::pin!(waiting);
            assert!(futures_util::poll!(waiting.as_mut()).is_pending());
        }

        drop(a);
        assert!(!gate.is_busy());
        assert!(!gate.cancel_current());
    }
}
