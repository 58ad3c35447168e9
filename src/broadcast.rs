//! Live Broadcaster
//!
//! 統合済みトランザクションのイベントを購読者へファンアウトする。
//! 配信はベストエフォート: キューが溢れた遅い購読者は切断される。
//! 統合処理が購読者を待つことはない。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// 購読者あたりの送信キュー上限
pub const SUBSCRIBER_QUEUE_LIMIT: usize = 32;

/// トランザクションイベント
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub endpoint: String,
    pub method: String,
    pub status: u16,
    pub latency_ms: f64,
    pub mocked: bool,
    pub chaos: bool,
    pub health_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// イベントファンアウト
pub struct Broadcaster {
    sender: broadcast::Sender<TransactionEvent>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_QUEUE_LIMIT);
        Self { sender }
    }

    /// 新しい購読者を登録する
    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.sender.subscribe()
    }

    /// イベントを発行する (購読者ゼロでも失敗しない)
    pub fn publish(&self, event: TransactionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: u16) -> TransactionEvent {
        TransactionEvent {
            endpoint: "/users/{id}".to_string(),
            method: "GET".to_string(),
            status,
            latency_ms: 12.0,
            mocked: false,
            chaos: false,
            health_score: 100.0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(event(200));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(event(201));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.status, 201);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();

        // キュー上限を超えて発行すると Lagged になる
        for i in 0..(SUBSCRIBER_QUEUE_LIMIT as u16 + 8) {
            broadcaster.publish(event(200 + i));
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert!(missed > 0),
            other => panic!("expected lagged receiver, got {:?}", other),
        }
    }
}
