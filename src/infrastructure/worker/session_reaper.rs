//! Session Reaper - Background Idle Session Cleanup

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ChatSessionManagerPort, TurnEvent, TurnEventSink};
use crate::infrastructure::events::EventPublisher;

/// Reaper 配置
#[derive(Debug, Clone)]
pub struct SessionReaperConfig {
    /// 检查间隔（秒）
    pub interval_secs: u64,
    /// 会话空闲多久后关闭（秒）
    pub expire_secs: u64,
}

impl Default for SessionReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            expire_secs: 3600,
        }
    }
}

/// 空闲会话回收器
///
/// 有回合在运行的会话不会被视为空闲
pub struct SessionReaper {
    config: SessionReaperConfig,
    sessions: Arc<dyn ChatSessionManagerPort>,
    event_publisher: Arc<EventPublisher>,
}

impl SessionReaper {
    pub fn new(
        config: SessionReaperConfig,
        sessions: Arc<dyn ChatSessionManagerPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            config,
            sessions,
            event_publisher,
        }
    }

    /// 启动回收循环，直到 `shutdown` 被取消
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            expire_secs = self.config.expire_secs,
            "SessionReaper started"
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let closed = self.sweep();
                    if closed > 0 {
                        tracing::info!(closed = closed, "Expired chat sessions closed");
                    }
                }
            }
        }

        tracing::info!("SessionReaper stopped");
    }

    /// 关闭所有过期会话，返回关闭数量
    pub fn sweep(&self) -> usize {
        let expired = self.sessions.get_expired_sessions(self.config.expire_secs);
        let mut closed = 0;

        for session_id in expired {
            // 与客户端关闭并发时会话可能已不存在
            match self.sessions.close(&session_id) {
                Ok(session) => {
                    session.gate.cancel_current();
                    self.event_publisher.publish(TurnEvent::SessionClosed {
                        session_id: session_id.clone(),
                        reason: "expired".to_string(),
                    });
                    self.event_publisher.unregister_session(&session_id);
                    tracing::debug!(session_id = %session_id, "Chat session expired");
                    closed += 1;
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "Expired session already gone");
                }
            }
        }

        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::ChatSession;
    use crate::infrastructure::memory::InMemoryChatSessionManager;
    use chrono::Utc;

    #[tokio::test]
    async fn test_sweep_closes_idle_sessions() {
        let sessions = Arc::new(InMemoryChatSessionManager::new());
        let publisher = EventPublisher::new().arc();

        let mut idle = ChatSession::new(None);
        idle.last_activity = Utc::now() - chrono::Duration::seconds(7200);
        let idle_id = sessions.create(idle).unwrap();
        let fresh_id = sessions.create(ChatSession::new(None)).unwrap();
        let mut rx = publisher.register_session(&idle_id);

        let reaper = SessionReaper::new(
            SessionReaperConfig::default(),
            sessions.clone(),
            publisher.clone(),
        );
        assert_eq!(reaper.sweep(), 1);

        assert!(sessions.get(&idle_id).is_err());
        assert!(sessions.get(&fresh_id).is_ok());
        assert!(matches!(
            rx.recv().await.unwrap(),
            TurnEvent::SessionClosed { reason, .. } if reason == "expired"
        ));
        assert!(publisher.subscribe(&idle_id).is_none());
        assert_eq!(reaper.sweep(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let reaper = SessionReaper::new(
            SessionReaperConfig::default(),
            Arc::new(InMemoryChatSessionManager::new()),
            EventPublisher::new().arc(),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(reaper.run(shutdown.clone()));
        shutdown.cancel();
        handle.await.unwrap();
    }
}
