//! WS /admin/stream — ライブトランザクションイベント
//!
//! 各購読者は自分専用の有界キューを持つ。キューを溢れさせた遅い
//! 購読者、および 1 秒以内に送信できない購読者は切断する。

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::broadcast::TransactionEvent;
use crate::engine::Engine;

/// 購読者への送信を待つ上限
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// GET /admin/stream (WebSocket アップグレード)
pub async fn ws(State(engine): State<Arc<Engine>>, ws: WebSocketUpgrade) -> Response {
    let receiver = engine.broadcaster.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, receiver))
}

async fn stream_events(
    socket: WebSocket,
    mut receiver: broadcast::Receiver<TransactionEvent>,
) {
    debug!("📡 Stream subscriber connected");
    let (mut sink, mut inbound) = socket.split();

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(event) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("Failed to serialize stream event: {}", e);
                            continue;
                        }
                    };

                    match tokio::time::timeout(SEND_TIMEOUT, sink.send(Message::Text(payload)))
                        .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => break,
                        Err(_) => {
                            warn!("📡 Stream subscriber too slow to receive; disconnecting");
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        "📡 Stream subscriber lagged behind by {} event(s); disconnecting",
                        missed
                    );
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = inbound.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // ping/pong は axum が処理する。テキストは無視。
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sink.close().await;
    debug!("📡 Stream subscriber disconnected");
}
