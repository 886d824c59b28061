//! WebSocket Handler - 回合事件推送
//!
//! 客户端发送 `{"message": "..."}` 开始一个回合，`{"cancel": true}` 取消当前回合；
//! 服务端把该会话的 TurnEvent 以 JSON 文本帧推送给客户端。

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::application::{CancelTurn, SendMessage};
use crate::infrastructure::http::state::AppState;

/// 客户端消息
#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    cancel: bool,
}

/// 对话 WebSocket 连接处理
pub async fn chat_websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, session_id, state))
}

async fn handle_chat_socket(socket: WebSocket, session_id: String, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // 验证会话存在
    if state.sessions.get(&session_id).is_err() {
        tracing::warn!(session_id = %session_id, "WebSocket connection rejected: invalid session");
        let _ = sender.close().await;
        return;
    }

    // 注册事件接收器
    let mut event_rx = state.event_publisher.register_session(&session_id);

    tracing::info!(session_id = %session_id, "WebSocket connected");

    let session_id_for_forward = session_id.clone();
    let session_id_for_receive = session_id.clone();

    // 事件转发任务
    let forward_task = tokio::spawn(async move {
        loop {
            let event = match event_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        session_id = %session_id_for_forward,
                        skipped = skipped,
                        "WebSocket consumer lagged, events dropped"
                    );
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let msg = match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };

            if let Err(e) = sender.send(msg).await {
                tracing::debug!(
                    session_id = %session_id_for_forward,
                    error = %e,
                    "Failed to send WebSocket message"
                );
                break;
            }
        }
    });

    // 接收客户端消息
    let state_for_receive = state.clone();
    let receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    handle_client_text(&state_for_receive, &session_id_for_receive, &text);
                }
                Ok(Message::Close(_)) => {
                    tracing::info!(session_id = %session_id_for_receive, "WebSocket closed by client");
                    break;
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id_for_receive, error = %e, "WebSocket error");
                    break;
                }
                _ => {
                    // Ping / Binary 仅刷新活跃时间
                    state_for_receive.sessions.touch(&session_id_for_receive);
                }
            }
        }
    });

    // 等待任一任务完成
    tokio::select! {
        _ = forward_task => {}
        _ = receive_task => {}
    }

    // 清理
    state.event_publisher.unregister_session(&session_id);
    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

/// 处理一条客户端文本消息
///
/// 回合在独立任务中运行，结果通过事件通道推回；接收循环不被阻塞，
/// 因此取消请求可以在回合运行期间到达。
fn handle_client_text(state: &Arc<AppState>, session_id: &str, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "Ignoring malformed client message");
            return;
        }
    };

    if msg.cancel {
        let cmd = CancelTurn {
            session_id: session_id.to_string(),
        };
        if let Err(e) = state.cancel_turn_handler.handle(cmd) {
            tracing::warn!(session_id = %session_id, error = %e, "Cancel request failed");
        }
    }

    if let Some(message) = msg.message {
        let state = state.clone();
        let cmd = SendMessage {
            session_id: session_id.to_string(),
            message,
        };
        tokio::spawn(async move {
            let session_id = cmd.session_id.clone();
            match state.send_message_handler.handle(cmd).await {
                Ok(response) => tracing::debug!(
                    session_id = %session_id,
                    outcome = %response.report.outcome,
                    "WebSocket turn finished"
                ),
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "WebSocket turn failed")
                }
            }
        });
    }
}
