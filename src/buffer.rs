//! Learning Buffer
//!
//! リクエストホットパスから学習ワーカーへの有界キュー。
//! エンキューは O(1) でブロックしない。満杯時は最古のエントリを捨てて
//! ドロップ数を数える。コンシューマは単一のバックグラウンドワーカー。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::{watch, Notify};

/// 既定のバッファ容量
pub const BUFFER_CAPACITY: usize = 1024;

/// 観測されたリクエスト/レスポンスの生トランザクション
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub method: String,
    pub path: String,
    /// 正規化済みパターンキー
    pub pattern: String,
    pub status: u16,
    pub latency_ms: f64,
    pub request_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    pub response_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
    pub response_size: usize,
    pub timestamp: DateTime<Utc>,
    /// 合成レスポンスだったか
    pub mocked: bool,
    /// 障害注入の影響下にあったか (スキーマ学習を抑止する)
    pub chaos: bool,
    /// アップストリーム障害によるフェイルオーバーだったか
    pub failover: bool,
}

/// バッファの統計 (管理 API で公開)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferStats {
    pub queued: usize,
    pub capacity: usize,
    pub enqueued_total: u64,
    pub dropped_total: u64,
}

/// 有界の学習バッファ
pub struct LearningBuffer {
    queue: Mutex<VecDeque<Transaction>>,
    capacity: usize,
    notify: Notify,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl LearningBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// ノンブロッキングのエンキュー
    ///
    /// 満杯なら最古を捨てる。コンシューマの進行を待つことはない。
    pub fn push(&self, txn: Transaction) {
        {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(txn);
        }
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<Transaction> {
        self.queue.lock().unwrap().pop_front()
    }

    /// ブロッキングのデキュー
    ///
    /// シャットダウン通知後は残りを吐き切ってから None を返す。
    pub async fn pop(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Transaction> {
        loop {
            if let Some(txn) = self.try_pop() {
                return Some(txn);
            }
            if *shutdown.borrow() {
                return None;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            queued: self.len(),
            capacity: self.capacity,
            enqueued_total: self.enqueued.load(Ordering::Relaxed),
            dropped_total: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for LearningBuffer {
    fn default() -> Self {
        Self::new(BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(path: &str) -> Transaction {
        Transaction {
            method: "GET".to_string(),
            path: path.to_string(),
            pattern: path.to_string(),
            status: 200,
            latency_ms: 10.0,
            request_headers: HashMap::new(),
            request_body: None,
            response_headers: HashMap::new(),
            response_body: None,
            response_size: 0,
            timestamp: Utc::now(),
            mocked: false,
            chaos: false,
            failover: false,
        }
    }

    #[test]
    fn test_push_pop_fifo() {
        let buffer = LearningBuffer::new(4);
        buffer.push(txn("/a"));
        buffer.push(txn("/b"));

        assert_eq!(buffer.try_pop().unwrap().path, "/a");
        assert_eq!(buffer.try_pop().unwrap().path, "/b");
        assert!(buffer.try_pop().is_none());
    }

    #[test]
    fn test_drop_oldest_on_overflow() {
        let buffer = LearningBuffer::new(2);
        buffer.push(txn("/a"));
        buffer.push(txn("/b"));
        buffer.push(txn("/c"));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped_count(), 1);
        assert_eq!(buffer.try_pop().unwrap().path, "/b");
        assert_eq!(buffer.try_pop().unwrap().path, "/c");
    }

    #[tokio::test]
    async fn test_pop_drains_after_shutdown() {
        let buffer = LearningBuffer::new(4);
        buffer.push(txn("/a"));

        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        // シャットダウン後も残りは取り出せる
        assert!(buffer.pop(&mut rx).await.is_some());
        assert!(buffer.pop(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let buffer = std::sync::Arc::new(LearningBuffer::new(4));
        let (_tx, mut rx) = watch::channel(false);

        let consumer = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.pop(&mut rx).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        buffer.push(txn("/woken"));

        let popped = consumer.await.unwrap();
        assert_eq!(popped.unwrap().path, "/woken");
    }

    #[test]
    fn test_stats() {
        let buffer = LearningBuffer::new(2);
        buffer.push(txn("/a"));
        buffer.push(txn("/b"));
        buffer.push(txn("/c"));

        let stats = buffer.stats();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.enqueued_total, 3);
        assert_eq!(stats.dropped_total, 1);
    }
}
