//! Event Publisher Implementation
//!
//! 回合事件推送实现：每个会话一个 broadcast 通道，WebSocket 连接订阅自己会话的通道。
//! 命令执行结果另外发布到全局通道，供实体列表等界面刷新。

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::ports::{TurnEvent, TurnEventSink};

/// 事件发布器
pub struct EventPublisher {
    /// session_id -> broadcast sender (for session-specific events)
    session_channels: DashMap<String, broadcast::Sender<TurnEvent>>,
    /// Global broadcast channel for command outcomes
    global_channel: broadcast::Sender<TurnEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(100);
        Self {
            session_channels: DashMap::new(),
            global_channel: global_tx,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅全局事件（CommandSucceeded / CommandFailed）
    pub fn subscribe_global(&self) -> broadcast::Receiver<TurnEvent> {
        self.global_channel.subscribe()
    }

    /// 注册会话的事件通道
    pub fn register_session(&self, session_id: &str) -> broadcast::Receiver<TurnEvent> {
        if let Some(sender) = self.session_channels.get(session_id) {
            return sender.subscribe();
        }

        let (tx, rx) = broadcast::channel(256);
        self.session_channels.insert(session_id.to_string(), tx);
        rx
    }

    /// 取消注册会话
    pub fn unregister_session(&self, session_id: &str) {
        self.session_channels.remove(session_id);
    }

    /// 获取会话的事件接收器
    pub fn subscribe(&self, session_id: &str) -> Option<broadcast::Receiver<TurnEvent>> {
        self.session_channels.get(session_id).map(|s| s.subscribe())
    }

    /// 发布事件到指定会话
    fn publish_to_session(&self, session_id: &str, event: TurnEvent) {
        if let Some(sender) = self.session_channels.get(session_id) {
            if let Err(e) = sender.send(event) {
                tracing::debug!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to publish event (no receivers)"
                );
            }
        }
    }
}

impl TurnEventSink for EventPublisher {
    fn publish(&self, event: TurnEvent) {
        if matches!(
            event,
            TurnEvent::CommandSucceeded { .. } | TurnEvent::CommandFailed { .. }
        ) {
            // 没有订阅者时发送失败是正常情况
            let _ = self.global_channel.send(event.clone());
        }

        let session_id = event.session_id().to_string();
        self.publish_to_session(&session_id, event);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
