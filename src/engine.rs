//! Platform Engine
//!
//! 全サブシステムを束ねる中核。ディスパッチ・統合ワーカー・管理 API が
//! 共有する状態はすべてここに集約される。

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::behavior::BehaviorStore;
use crate::broadcast::Broadcaster;
use crate::buffer::LearningBuffer;
use crate::chaos::ChaosRegistry;
use crate::config::{AmpConfig, Mode};
use crate::consolidator;
use crate::drift::DriftDetector;
use crate::error::Result;
use crate::health::HealthMonitor;
use crate::normalize::PathNormalizer;
use crate::proxy::Forwarder;
use crate::schema::MockGenerator;
use crate::storage::EngineStorage;

/// 直近トランザクションリングの長さ
pub const RECENT_LOG_LIMIT: usize = 50;

/// 実行時に切り替わるフラグ (アトミックにスワップされる)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeFlags {
    pub mode: Mode,
    pub failover: bool,
    pub learning_enabled: bool,
}

/// 直近トランザクションのログエントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub pattern: String,
    pub status: u16,
    pub latency_ms: u64,
    /// "proxy" | "mock" | "chaos"
    pub kind: String,
    pub drift: bool,
    pub health_score: f64,
}

/// エンジンカウンター
#[derive(Debug, Default)]
pub struct EngineCounters {
    /// 学習前のエンドポイントへのモック応答数
    pub cold_mocks: AtomicU64,
    /// シャットダウン時に破棄したトランザクション数
    pub discarded_on_shutdown: AtomicU64,
}

/// プラットフォームエンジン
pub struct Engine {
    pub config: AmpConfig,
    pub flags: ArcSwap<RuntimeFlags>,
    pub chaos: ChaosRegistry,
    pub store: BehaviorStore,
    pub buffer: LearningBuffer,
    pub broadcaster: Broadcaster,
    pub storage: Arc<dyn EngineStorage>,
    pub forwarder: Option<Forwarder>,
    pub normalizer: PathNormalizer,
    pub generator: MockGenerator,
    pub detector: DriftDetector,
    pub monitor: HealthMonitor,
    pub counters: EngineCounters,
    recent: Mutex<VecDeque<LogEntry>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    /// ストレージから状態を復元してエンジンを組み立てる
    pub async fn bootstrap(
        config: AmpConfig,
        storage: Arc<dyn EngineStorage>,
    ) -> Result<Arc<Self>> {
        let state = storage.load().await?;

        let store = BehaviorStore::new();
        store.hydrate(state.endpoints).await;

        // 未解決ドリフトのフラグをパーティションへ反映
        for alert in state.drift_alerts.iter().filter(|a| !a.resolved) {
            if let Some(entry) = store.find_by_id(alert.endpoint_id).await {
                entry.lock().await.active_drift = true;
            }
        }

        let forwarder = match &config.target_url {
            Some(url) => Some(Forwarder::new(url)?),
            None => None,
        };

        let flags = RuntimeFlags {
            mode: config.mode,
            failover: config.failover,
            learning_enabled: true,
        };

        let (shutdown_tx, _) = watch::channel(false);

        let engine = Arc::new(Self {
            flags: ArcSwap::from_pointee(flags),
            chaos: ChaosRegistry::new(),
            store,
            buffer: LearningBuffer::default(),
            broadcaster: Broadcaster::new(),
            storage,
            forwarder,
            normalizer: PathNormalizer::new(),
            generator: MockGenerator::new(),
            detector: DriftDetector::new(),
            monitor: HealthMonitor::new(),
            counters: EngineCounters::default(),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_LOG_LIMIT)),
            shutdown_tx,
            config,
        });

        info!(
            "🧠 Engine ready: mode={}, failover={}, {} endpoint(s) restored",
            engine.flags().mode,
            engine.flags().failover,
            engine.store.len().await
        );

        Ok(engine)
    }

    /// 統合ワーカーを起動する
    pub fn spawn_consolidator(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            consolidator::run(engine).await;
        })
    }

    pub fn flags(&self) -> Arc<RuntimeFlags> {
        self.flags.load_full()
    }

    pub fn set_mode(&self, mode: Mode) {
        let mut next = (*self.flags.load_full()).clone();
        next.mode = mode;
        self.flags.store(Arc::new(next));
        info!("🔀 Mode switched to {}", mode);
    }

    pub fn set_learning_enabled(&self, enabled: bool) {
        let mut next = (*self.flags.load_full()).clone();
        next.learning_enabled = enabled;
        self.flags.store(Arc::new(next));
        info!("📚 Learning {}", if enabled { "enabled" } else { "paused" });
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// 直近リングへ追記する
    pub async fn push_recent(&self, entry: LogEntry) {
        let mut recent = self.recent.lock().await;
        if recent.len() >= RECENT_LOG_LIMIT {
            recent.pop_back();
        }
        recent.push_front(entry);
    }

    pub async fn recent_logs(&self) -> Vec<LogEntry> {
        self.recent.lock().await.iter().cloned().collect()
    }

    /// シャットダウン: バッファを猶予付きでドレインする
    ///
    /// 猶予を超えたら残りを破棄し、破棄数を警告として記録する。
    pub async fn shutdown(&self, consolidator: JoinHandle<()>, grace: Duration) {
        let _ = self.shutdown_tx.send(true);

        if tokio::time::timeout(grace, consolidator).await.is_err() {
            let remaining = self.buffer.len() as u64;
            self.counters
                .discarded_on_shutdown
                .store(remaining, Ordering::Relaxed);
            warn!(
                "⏱️ Consolidator did not drain within {:?}; {} transaction(s) discarded",
                grace, remaining
            );
        }

        if let Err(e) = self.storage.flush().await {
            warn!("Failed to flush storage on shutdown: {}", e);
        }
        info!("💾 Shutdown complete");
    }
}
