//! Dispatch Coordinator - 分发协调器
//!
//! 每收到一个片段：
//! 1. 追加到累积文本
//! 2. 对完整累积文本重新扫描
//! 3. 对分发记录中没有的命令出现：解码 -> 检查前置条件 -> 调用处理器 -> 记录结果
//!
//! 同一次扫描中的多个命令按标记出现顺序依次执行。
//! 任何一个命令失败都不影响其他命令，也不会中断流。

use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::context::TurnContext;
use super::ledger::{DispatchLedger, DispatchRecord, FailureKind};
use super::presenter::{Presentation, StreamPresenter};
use super::turn::TurnOutcome;
use crate::application::ports::{HandlerOutcome, HandlerRegistry, TurnEvent, TurnEventSink};
use crate::domain::command::{
    decode, scan, CommandError, CommandGrammar, CommandOccurrence, ScanMode, ScanResult,
};

/// 单个命令的失败
struct DispatchFailure {
    kind: FailureKind,
    message: String,
}

impl DispatchFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// 分发协调器（一个回合一个实例）
pub struct DispatchCoordinator {
    grammar: Arc<CommandGrammar>,
    registry: HandlerRegistry,
    context: TurnContext,
    accumulator: String,
    ledger: DispatchLedger,
    events: Arc<dyn TurnEventSink>,
    last_presentation: Option<Presentation>,
}

impl DispatchCoordinator {
    pub fn new(
        grammar: Arc<CommandGrammar>,
        registry: HandlerRegistry,
        context: TurnContext,
        events: Arc<dyn TurnEventSink>,
    ) -> Self {
        Self {
            grammar,
            registry,
            context,
            accumulator: String::new(),
            ledger: DispatchLedger::new(),
            events,
            last_presentation: None,
        }
    }

    /// 处理一个新片段，返回最新的展示结果
    pub async fn on_fragment(&mut self, fragment: &str) -> Presentation {
        self.accumulator.push_str(fragment);
        self.rescan(ScanMode::Streaming).await
    }

    /// 重新扫描累积文本并分发新出现的命令
    ///
    /// 对未变化的累积文本重复调用不会再次分发。
    pub async fn rescan(&mut self, mode: ScanMode) -> Presentation {
        let result = scan(&self.accumulator, &self.grammar, mode);

        let fresh: Vec<&CommandOccurrence> = result
            .occurrences
            .iter()
            .filter(|o| !self.ledger.contains(&o.key()))
            .collect();

        if !fresh.is_empty() {
            // 先让渲染层看到 pending
            self.present(&result, mode);
            for occurrence in fresh {
                self.dispatch(occurrence).await;
            }
        }

        self.present(&result, mode)
    }

    /// 回合结束
    ///
    /// - 正常结束：以 Final 模式再扫描一次（对象串以输入结束为终止），
    ///   仍未完整的末尾命令记为 `truncated` 失败
    /// - 流失败：不再分发，末尾未完整的命令同样记为失败
    /// - 取消：不再分发，也不记录任何新状态
    pub async fn finish(&mut self, outcome: &TurnOutcome) -> Presentation {
        match outcome {
            TurnOutcome::Completed => {
                self.rescan(ScanMode::Final).await;
                let result = scan(&self.accumulator, &self.grammar, ScanMode::Final);
                self.mark_truncated(&result);
                self.present(&result, ScanMode::Final)
            }
            TurnOutcome::StreamFailed(_) => {
                let result = scan(&self.accumulator, &self.grammar, ScanMode::Streaming);
                self.mark_truncated(&result);
                let result = scan(&self.accumulator, &self.grammar, ScanMode::Final);
                self.present(&result, ScanMode::Final)
            }
            TurnOutcome::Cancelled => {
                let result = scan(&self.accumulator, &self.grammar, ScanMode::Streaming);
                self.present(&result, ScanMode::Streaming)
            }
        }
    }

    pub fn accumulator(&self) -> &str {
        &self.accumulator
    }

    pub fn context(&self) -> &TurnContext {
        &self.context
    }

    pub fn ledger(&self) -> &DispatchLedger {
        &self.ledger
    }

    pub fn records(&self) -> Vec<DispatchRecord> {
        self.ledger.records()
    }

    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }

    pub(crate) fn publish(&self, event: TurnEvent) {
        self.events.publish(event);
    }

    // ========================================================================
    // 内部
    // ========================================================================

    /// 分发一个命令出现（至多一次）
    async fn dispatch(&mut self, occurrence: &CommandOccurrence) {
        let key = occurrence.key();
        if !self.ledger.begin(key) {
            return;
        }

        let session_id = self.context.session_id.clone();
        tracing::debug!(session_id = %session_id, key = %key, "Dispatching command");
        self.publish(TurnEvent::CommandStarted {
            session_id: session_id.clone(),
            key: key.to_string(),
            kind: key.kind,
        });

        match self.execute(occurrence).await {
            Ok(outcome) => {
                self.context.apply(outcome);
                self.ledger.resolve_success(key);
                tracing::info!(
                    session_id = %session_id,
                    key = %key,
                    kind = %key.kind,
                    "Command dispatched"
                );
                self.publish(TurnEvent::CommandSucceeded {
                    session_id,
                    key: key.to_string(),
                    kind: key.kind,
                });
            }
            Err(failure) => {
                tracing::warn!(
                    session_id = %session_id,
                    key = %key,
                    kind = %key.kind,
                    failure = ?failure.kind,
                    error = %failure.message,
                    "Command failed"
                );
                self.ledger
                    .resolve_error(key, failure.kind, failure.message.clone());
                self.publish(TurnEvent::CommandFailed {
                    session_id,
                    key: key.to_string(),
                    kind: key.kind,
                    reason: failure.message,
                });
            }
        }
    }

    /// 解码、检查前置条件并调用处理器
    async fn execute(&self, occurrence: &CommandOccurrence) -> Result<HandlerOutcome, DispatchFailure> {
        let kind = occurrence.kind;

        let decoded = decode(occurrence)
            .map_err(|e| DispatchFailure::new(FailureKind::Decode, e.to_string()))?;

        let entry = self.grammar.entry(kind).ok_or_else(|| {
            DispatchFailure::new(
                FailureKind::Unregistered,
                CommandError::UnknownKind(kind).to_string(),
            )
        })?;
        for precondition in &entry.preconditions {
            self.context
                .check(*precondition, &decoded.params)
                .map_err(|e| DispatchFailure::new(FailureKind::Precondition, e.to_string()))?;
        }

        let handler = self.registry.get(kind).ok_or_else(|| {
            DispatchFailure::new(
                FailureKind::Unregistered,
                CommandError::UnknownKind(kind).to_string(),
            )
        })?;

        // 处理器 panic 也只影响这一个命令
        let result = AssertUnwindSafe(handler.handle(&decoded.params, &self.context))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(DispatchFailure::new(FailureKind::Handler, e.to_string())),
            Err(panic) => Err(DispatchFailure::new(
                FailureKind::Handler,
                format!("handler panicked: {}", panic_message(panic.as_ref())),
            )),
        }
    }

    /// 末尾未完整的命令记为截断
    fn mark_truncated(&mut self, result: &ScanResult) {
        let Some(pending) = result.pending else {
            return;
        };
        let key = pending.key();
        if self
            .ledger
            .record_error(key, FailureKind::Truncated, "truncated")
        {
            tracing::warn!(
                session_id = %self.context.session_id,
                key = %key,
                "Command payload truncated at end of turn"
            );
            self.publish(TurnEvent::CommandFailed {
                session_id: self.context.session_id.clone(),
                key: key.to_string(),
                kind: key.kind,
                reason: "truncated".to_string(),
            });
        }
    }

    /// 计算展示结果，有变化时推送事件
    fn present(&mut self, result: &ScanResult, mode: ScanMode) -> Presentation {
        let presentation = StreamPresenter::present_scan(
            &self.accumulator,
            &self.grammar,
            result,
            &self.ledger,
            mode,
        );

        if self.last_presentation.as_ref() != Some(&presentation) {
            self.publish(TurnEvent::Presentation {
                session_id: self.context.session_id.clone(),
                display_text: presentation.display_text.clone(),
                status: presentation.status,
            });
            self.last_presentation = Some(presentation.clone());
        }

        presentation
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch::{DispatchStatus, PresentedStatus};
    use crate::application::ports::{CommandHandlerPort, HandlerError};
    use crate::domain::command::{CommandKind, CommandParams, OccurrenceKey};
    use crate::domain::story::EntityId;
    use async_trait::async_trait;
    use std::sync::Mutex;

    // ========================================================================
    // Test doubles
    // ========================================================================

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        params: CommandParams,
        active_story: Option<EntityId>,
    }

    #[derive(Default)]
    struct CallLog(Mutex<Vec<Call>>);

    impl CallLog {
        fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }

        fn kinds(&self) -> Vec<CommandKind> {
            self.calls().iter().map(|c| c.params.kind()).collect()
        }
    }

    enum Behavior {
        Succeed(HandlerOutcome),
        Fail,
        Panic,
    }

    struct RecordingHandler {
        log: Arc<CallLog>,
        behavior: Behavior,
    }

    #[async_trait]
    impl CommandHandlerPort for RecordingHandler {
        async fn handle(
            &self,
            params: &CommandParams,
            context: &TurnContext,
        ) -> Result<HandlerOutcome, HandlerError> {
            self.log.0.lock().unwrap().push(Call {
                params: params.clone(),
                active_story: context.active_story,
            });
            match self.behavior {
                Behavior::Succeed(outcome) => Ok(outcome),
                Behavior::Fail => Err(HandlerError::rejected("persistence rejected")),
                Behavior::Panic => panic!("handler exploded"),
            }
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<TurnEvent>>);

    impl TurnEventSink for CollectingSink {
        fn publish(&self, event: TurnEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl CollectingSink {
        fn events(&self) -> Vec<TurnEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    fn registry(log: &Arc<CallLog>) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        for kind in CommandKind::ALL {
            let behavior = match kind {
                CommandKind::CreateStory => {
                    Behavior::Succeed(HandlerOutcome::SelectStory(EntityId::new(1)))
                }
                _ => Behavior::Succeed(HandlerOutcome::Done),
            };
            registry.register(
                kind,
                Arc::new(RecordingHandler {
                    log: log.clone(),
                    behavior,
                }),
            );
        }
        registry
    }

    fn coordinator_with(
        registry: HandlerRegistry,
        active_story: Option<EntityId>,
    ) -> (DispatchCoordinator, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let coordinator = DispatchCoordinator::new(
            Arc::new(CommandGrammar::default()),
            registry,
            TurnContext::new("session-1", active_story),
            sink.clone(),
        );
        (coordinator, sink)
    }

    async fn feed(coordinator: &mut DispatchCoordinator, fragments: &[String]) -> Presentation {
        for fragment in fragments {
            coordinator.on_fragment(fragment).await;
        }
        coordinator.finish(&TurnOutcome::Completed).await
    }

    /// 按字符数切分（保证 UTF-8 边界）
    fn chunks(text: &str, size: usize) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.chunks(size).map(|c| c.iter().collect()).collect()
    }

    const SCRIPT: &str = "Được rồi, tôi sẽ tạo câu chuyện.\n\
/create-story {\"title\":\"Rừng Đêm\",\"description\":\"Một câu chuyện {kỳ bí}\",\"suggestedTags\":[\"fantasy\"]}\n\
/create-character {\"name\":\"Lan\",\"meta\":{\"age\":17}}\n\
/create-chapter {\"title\":\"Chương 1\"}\n\
/create-dialogue {\"chapter_id\":1,\"content\":\"Ai đó?\",\"type\":\"dialogue\",\"character_name\":\"Lan\"}\n\
{\"chapter_id\":1,\"content\":\"Gió thổi qua rừng.\",\"type\":\"aside\"}\n\n\
Xong rồi!";

    // ========================================================================
    // Tests
    // ========================================================================

    #[tokio::test]
    async fn test_chunking_does_not_change_dispatch() {
        let mut reference: Option<Vec<Call>> = None;

        for size in [SCRIPT.chars().count(), 97, 13, 5, 2, 1] {
            let log = Arc::new(CallLog::default());
            let (mut coordinator, _) = coordinator_with(registry(&log), None);
            feed(&mut coordinator, &chunks(SCRIPT, size)).await;

            let calls = log.calls();
            assert_eq!(calls.len(), 4, "chunk size {}", size);
            match &reference {
                None => reference = Some(calls),
                Some(expected) => assert_eq!(&calls, expected, "chunk size {}", size),
            }
        }
    }

    #[tokio::test]
    async fn test_two_fragment_split_inside_payload() {
        let text = "Xong /create-chapter {\"title\":\"A {b}\"} hết";
        for split in 1..text.len() {
            if !text.is_char_boundary(split) {
                continue;
            }
            let log = Arc::new(CallLog::default());
            let (mut coordinator, _) = coordinator_with(registry(&log), Some(EntityId::new(1)));
            feed(
                &mut coordinator,
                &[text[..split].to_string(), text[split..].to_string()],
            )
            .await;
            assert_eq!(log.kinds(), vec![CommandKind::CreateChapter], "split {}", split);
        }
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), Some(EntityId::new(1)));

        coordinator
            .on_fragment("/create-character {\"name\":\"A\"}")
            .await;
        coordinator.rescan(ScanMode::Streaming).await;
        coordinator.rescan(ScanMode::Streaming).await;
        coordinator.finish(&TurnOutcome::Completed).await;

        assert_eq!(log.calls().len(), 1);
        assert_eq!(coordinator.records().len(), 1);
    }

    #[tokio::test]
    async fn test_display_text_excludes_commands() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), None);
        let presentation = feed(&mut coordinator, &chunks(SCRIPT, 7)).await;

        assert_eq!(
            presentation.display_text,
            "Được rồi, tôi sẽ tạo câu chuyện."
        );
        assert!(!presentation.display_text.contains('/'));
        assert!(!presentation.display_text.contains('{'));
        assert_eq!(presentation.status, PresentedStatus::Success);
    }

    #[tokio::test]
    async fn test_partial_payload_is_not_an_error() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), None);

        let presentation = coordinator
            .on_fragment("Đang tạo /create-story {\"title\": \"Foo")
            .await;

        assert!(log.calls().is_empty());
        assert!(coordinator.records().is_empty());
        assert_eq!(presentation.display_text, "Đang tạo");
        assert_eq!(presentation.status, PresentedStatus::Pending);
    }

    #[tokio::test]
    async fn test_nested_braces_extracted_whole() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), Some(EntityId::new(1)));
        feed(
            &mut coordinator,
            &["/create-character {\"name\":\"A\",\"meta\":{\"x\":1}}".to_string()],
        )
        .await;

        let calls = log.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0].params {
            CommandParams::CreateCharacter(p) => {
                assert_eq!(p.name, "A");
                assert_eq!(p.extra.get("meta"), Some(&serde_json::json!({"x": 1})));
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_dialogue_partial_failure() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), Some(EntityId::new(1)));
        feed(
            &mut coordinator,
            &chunks(
                "/create-dialogue {\"chapter_id\":1,\"content\":\"ok\",\"type\":\"dialogue\"} {malformed}",
                4,
            ),
        )
        .await;

        let calls = log.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0].params {
            CommandParams::CreateDialogue(batch) => {
                assert_eq!(batch.chapter_id, EntityId::new(1));
                assert_eq!(batch.entries.len(), 1);
                assert_eq!(batch.entries[0].content, "ok");
                assert_eq!(batch.skipped, 1);
            }
            other => panic!("unexpected params: {:?}", other),
        }
        assert_eq!(
            coordinator.records()[0].status,
            DispatchStatus::Success
        );
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), Some(EntityId::new(1)));
        feed(
            &mut coordinator,
            &[concat!(
                "/create-character {\"name\":\"Minh\"}\n",
                "/create-dialogue {\"chapter_id\":2,\"content\":\"Chào\",\"type\":\"dialogue\",\"character_name\":\"Minh\"}\n\n",
                "/create-chapter {\"title\":\"Sau\"}"
            )
            .to_string()],
        )
        .await;

        assert_eq!(
            log.kinds(),
            vec![
                CommandKind::CreateCharacter,
                CommandKind::CreateDialogue,
                CommandKind::CreateChapter
            ]
        );
    }

    #[tokio::test]
    async fn test_example_pending_then_success() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, sink) = coordinator_with(registry(&log), None);
        let text = "Đã xong! /create-story {\"title\":\"Hello\",\"description\":\"World\",\"mainCategory\":\"Fantasy\",\"suggestedTags\":[]}";
        let presentation = feed(&mut coordinator, &[text.to_string()]).await;

        assert_eq!(presentation.display_text, "Đã xong!");
        assert_eq!(presentation.status, PresentedStatus::Success);

        let records = coordinator.records();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].key,
            OccurrenceKey::new(CommandKind::CreateStory, "Đã xong! ".len())
        );
        assert_eq!(records[0].status, DispatchStatus::Success);

        let statuses: Vec<PresentedStatus> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::Presentation { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![PresentedStatus::Pending, PresentedStatus::Success]
        );

        match &log.calls()[0].params {
            CommandParams::CreateStory(p) => {
                assert_eq!(p.title, "Hello");
                assert_eq!(p.main_category.as_deref(), Some("Fantasy"));
            }
            other => panic!("unexpected params: {:?}", other),
        }
        // 创建的故事成为当前故事
        assert_eq!(coordinator.context().active_story, Some(EntityId::new(1)));
    }

    #[tokio::test]
    async fn test_handler_failure_is_terminal_and_isolated() {
        let log = Arc::new(CallLog::default());
        let mut registry = registry(&log);
        registry.register(
            CommandKind::CreateCharacter,
            Arc::new(RecordingHandler {
                log: log.clone(),
                behavior: Behavior::Fail,
            }),
        );
        let (mut coordinator, sink) = coordinator_with(registry, Some(EntityId::new(1)));

        coordinator
            .on_fragment("/create-character {\"name\":\"A\"} /create-chapter {\"title\":\"B\"}")
            .await;
        coordinator.rescan(ScanMode::Streaming).await;
        let presentation = coordinator.finish(&TurnOutcome::Completed).await;

        assert_eq!(
            log.kinds(),
            vec![CommandKind::CreateCharacter, CommandKind::CreateChapter]
        );
        let records = coordinator.records();
        assert_eq!(records[0].status, DispatchStatus::Error);
        assert_eq!(records[0].failure, Some(FailureKind::Handler));
        assert_eq!(records[1].status, DispatchStatus::Success);
        assert_eq!(presentation.status, PresentedStatus::Success);

        let failed = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, TurnEvent::CommandFailed { .. }))
            .count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let log = Arc::new(CallLog::default());
        let mut registry = registry(&log);
        registry.register(
            CommandKind::CreateChapter,
            Arc::new(RecordingHandler {
                log: log.clone(),
                behavior: Behavior::Panic,
            }),
        );
        let (mut coordinator, _) = coordinator_with(registry, Some(EntityId::new(1)));

        feed(
            &mut coordinator,
            &["/create-chapter {\"title\":\"A\"} /create-outline {\"title\":\"B\"}".to_string()],
        )
        .await;

        let records = coordinator.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, DispatchStatus::Error);
        assert!(records[0]
            .error
            .as_deref()
            .unwrap()
            .contains("handler exploded"));
        assert_eq!(records[1].status, DispatchStatus::Success);
    }

    #[tokio::test]
    async fn test_precondition_unmet_skips_handler() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), None);

        let presentation = feed(
            &mut coordinator,
            &["Thêm nhân vật /create-character {\"name\":\"A\"}".to_string()],
        )
        .await;

        assert!(log.calls().is_empty());
        let records = coordinator.records();
        assert_eq!(records[0].status, DispatchStatus::Error);
        assert_eq!(records[0].failure, Some(FailureKind::Precondition));
        assert_eq!(presentation.status, PresentedStatus::Error);
    }

    #[tokio::test]
    async fn test_story_created_earlier_in_turn_satisfies_precondition() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), None);

        feed(
            &mut coordinator,
            &["/create-story {\"title\":\"S\"} /create-chapter {\"title\":\"C\"}".to_string()],
        )
        .await;

        let calls = log.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].active_story, None);
        assert_eq!(calls[1].active_story, Some(EntityId::new(1)));
    }

    #[tokio::test]
    async fn test_decode_error_not_retried() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), Some(EntityId::new(1)));

        coordinator
            .on_fragment("/create-chapter {\"title\": }")
            .await;
        coordinator.on_fragment(" tiếp tục").await;
        coordinator.finish(&TurnOutcome::Completed).await;

        assert!(log.calls().is_empty());
        let records = coordinator.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].failure, Some(FailureKind::Decode));
    }

    #[tokio::test]
    async fn test_unregistered_kind() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(HandlerRegistry::new(), None);

        feed(
            &mut coordinator,
            &["/create-story {\"title\":\"S\"}".to_string()],
        )
        .await;

        assert!(log.calls().is_empty());
        assert_eq!(
            coordinator.records()[0].failure,
            Some(FailureKind::Unregistered)
        );
    }

    #[tokio::test]
    async fn test_truncated_command_resolves_to_error() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), None);

        coordinator
            .on_fragment("Được /create-story {\"title\": \"Fo")
            .await;
        let presentation = coordinator.finish(&TurnOutcome::Completed).await;

        assert!(log.calls().is_empty());
        let records = coordinator.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].failure, Some(FailureKind::Truncated));
        assert_eq!(presentation.display_text, "Được");
        assert_eq!(presentation.status, PresentedStatus::Error);
    }

    #[tokio::test]
    async fn test_dialogue_run_at_end_dispatched_on_completion() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), Some(EntityId::new(1)));

        coordinator
            .on_fragment("/create-dialogue {\"chapter_id\":1,\"content\":\"a\",\"type\":\"aside\"}")
            .await;
        assert!(log.calls().is_empty());

        coordinator.finish(&TurnOutcome::Completed).await;
        assert_eq!(log.kinds(), vec![CommandKind::CreateDialogue]);
    }

    #[tokio::test]
    async fn test_stream_failure_does_not_dispatch_pending_run() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), Some(EntityId::new(1)));

        coordinator
            .on_fragment("Ok /create-dialogue {\"chapter_id\":1,\"content\":\"a\",\"type\":\"aside\"}")
            .await;
        let presentation = coordinator
            .finish(&TurnOutcome::StreamFailed("connection reset".to_string()))
            .await;

        assert!(log.calls().is_empty());
        assert_eq!(coordinator.records()[0].failure, Some(FailureKind::Truncated));
        assert_eq!(presentation.display_text, "Ok");
        assert_eq!(presentation.status, PresentedStatus::Error);
    }

    #[tokio::test]
    async fn test_cancel_records_nothing_new() {
        let log = Arc::new(CallLog::default());
        let (mut coordinator, _) = coordinator_with(registry(&log), None);

        coordinator
            .on_fragment("Ok /create-story {\"title\": \"Fo")
            .await;
        let presentation = coordinator.finish(&TurnOutcome::Cancelled).await;

        assert!(coordinator.records().is_empty());
        assert_eq!(presentation.status, PresentedStatus::Pending);
    }
}
