use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::types::{EndpointKey, EndpointRecord, EndpointSummary};
use crate::health::{global_score, HealthAssessment, HealthWindow};

/// パーティションの中身: 永続レコード + メモリ上のヘルス状態
///
/// ウィンドウと評価キャッシュはレコードと同じロック配下に置く。
#[derive(Debug)]
pub struct EndpointEntry {
    pub record: EndpointRecord,
    pub window: HealthWindow,
    pub active_drift: bool,
    pub assessment: Option<HealthAssessment>,
}

impl EndpointEntry {
    fn new(key: &EndpointKey) -> Self {
        Self {
            record: EndpointRecord::new(key),
            window: HealthWindow::default(),
            active_drift: false,
            assessment: None,
        }
    }

    fn from_record(record: EndpointRecord) -> Self {
        Self {
            record,
            window: HealthWindow::default(),
            active_drift: false,
            assessment: None,
        }
    }

    pub fn health_score(&self) -> f64 {
        self.assessment.as_ref().map(|a| a.score).unwrap_or(100.0)
    }
}

/// エンドポイントキーでパーティションした挙動ストア
///
/// 外側の RwLock はパーティションの探索にのみ使い、
/// 変更は各パーティション自身の Mutex の下で行う。
pub struct BehaviorStore {
    partitions: RwLock<HashMap<EndpointKey, Arc<Mutex<EndpointEntry>>>>,
}

impl BehaviorStore {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// 永続化済みレコードからストアを再構築する (起動時)
    pub async fn hydrate(&self, records: Vec<EndpointRecord>) {
        let mut partitions = self.partitions.write().await;
        for record in records {
            let key = record.key();
            partitions.insert(key, Arc::new(Mutex::new(EndpointEntry::from_record(record))));
        }
    }

    /// パーティションを取得、無ければ作成する
    ///
    /// 返り値の bool は新規作成されたかどうか。
    pub async fn entry(&self, key: &EndpointKey) -> (Arc<Mutex<EndpointEntry>>, bool) {
        {
            let partitions = self.partitions.read().await;
            if let Some(entry) = partitions.get(key) {
                return (entry.clone(), false);
            }
        }

        let mut partitions = self.partitions.write().await;
        // 書きロック獲得までの間に他タスクが作成していることがある
        if let Some(entry) = partitions.get(key) {
            return (entry.clone(), false);
        }
        let entry = Arc::new(Mutex::new(EndpointEntry::new(key)));
        partitions.insert(key.clone(), entry.clone());
        (entry, true)
    }

    pub async fn get(&self, key: &EndpointKey) -> Option<Arc<Mutex<EndpointEntry>>> {
        let partitions = self.partitions.read().await;
        partitions.get(key).cloned()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<Arc<Mutex<EndpointEntry>>> {
        let partitions = self.partitions.read().await;
        for entry in partitions.values() {
            if entry.lock().await.record.id == id {
                return Some(entry.clone());
            }
        }
        None
    }

    pub async fn len(&self) -> usize {
        self.partitions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.partitions.read().await.is_empty()
    }

    /// 管理 API 向けの要約一覧
    pub async fn summaries(&self) -> Vec<EndpointSummary> {
        let entries: Vec<Arc<Mutex<EndpointEntry>>> = {
            let partitions = self.partitions.read().await;
            partitions.values().cloned().collect()
        };

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            let guard = entry.lock().await;
            summaries.push(EndpointSummary {
                id: guard.record.id,
                method: guard.record.method.clone(),
                pattern: guard.record.pattern.clone(),
                sample_count: guard.record.sample_count,
                first_seen: guard.record.first_seen,
                last_seen: guard.record.last_seen,
                latency_mean_ms: guard.record.latency.mean,
                latency_std_ms: guard.record.latency.std_dev(),
                error_rate: guard.record.error_rate,
                health_score: guard.health_score(),
            });
        }
        summaries.sort_by(|a, b| a.pattern.cmp(&b.pattern).then(a.method.cmp(&b.method)));
        summaries
    }

    /// 全エンドポイントのヘルス評価 (キー, スコア, 評価)
    pub async fn health_snapshot(&self) -> Vec<(EndpointKey, Uuid, HealthAssessment)> {
        let entries: Vec<(EndpointKey, Arc<Mutex<EndpointEntry>>)> = {
            let partitions = self.partitions.read().await;
            partitions
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        let mut snapshot = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            let guard = entry.lock().await;
            let assessment = guard
                .assessment
                .clone()
                .unwrap_or_else(HealthAssessment::baseline);
            snapshot.push((key, guard.record.id, assessment));
        }
        snapshot
    }

    /// グローバルヘルススコア
    pub async fn global_health_score(&self) -> f64 {
        let snapshot = self.health_snapshot().await;
        let scores: Vec<f64> = snapshot.iter().map(|(_, _, a)| a.score).collect();
        global_score(&scores)
    }
}

impl Default for BehaviorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entry_created_once() {
        let store = BehaviorStore::new();
        let key = EndpointKey::new("GET", "/users/{id}");

        let (_, created) = store.entry(&key).await;
        assert!(created);
        let (_, created) = store.entry(&key).await;
        assert!(!created);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let store = BehaviorStore::new();
        let key = EndpointKey::new("GET", "/items");
        let (entry, _) = store.entry(&key).await;
        let id = entry.lock().await.record.id;

        assert!(store.find_by_id(id).await.is_some());
        assert!(store.find_by_id(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_hydrate_restores_records() {
        let store = BehaviorStore::new();
        let key = EndpointKey::new("POST", "/login");
        let mut record = EndpointRecord::new(&key);
        record.sample_count = 7;
        store.hydrate(vec![record]).await;

        let entry = store.get(&key).await.unwrap();
        assert_eq!(entry.lock().await.record.sample_count, 7);
    }

    #[tokio::test]
    async fn test_global_health_empty() {
        let store = BehaviorStore::new();
        assert_eq!(store.global_health_score().await, 100.0);
    }
}
