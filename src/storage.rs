//! Engine Storage
//!
//! 学習済みエンドポイントとドリフト警告の永続化シーム。
//! コアはこのトレイトにのみ依存し、実装は差し替え可能。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::behavior::EndpointRecord;
use crate::drift::DriftAlert;
use crate::error::{Error, Result};

/// 永続化されるプラットフォーム状態
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub endpoints: Vec<EndpointRecord>,
    #[serde(default)]
    pub drift_alerts: Vec<DriftAlert>,
}

/// 永続化シーム
#[async_trait]
pub trait EngineStorage: Send + Sync {
    /// 起動時の全状態読み込み
    async fn load(&self) -> Result<PersistedState>;

    /// エンドポイントレコードの upsert (id で置換)
    async fn upsert_endpoint(&self, record: &EndpointRecord) -> Result<()>;

    /// ドリフト警告の追加または更新 (id で置換)
    async fn put_drift_alert(&self, alert: &DriftAlert) -> Result<()>;

    async fn list_drift_alerts(&self, unresolved_only: bool) -> Result<Vec<DriftAlert>>;

    /// 指定エンドポイントの未解決警告 (新しい順)
    async fn unresolved_for_endpoint(&self, endpoint_id: Uuid) -> Result<Vec<DriftAlert>>;

    /// 警告を解決済みにする。存在しなければ None。
    async fn resolve_drift_alert(&self, alert_id: Uuid) -> Result<Option<DriftAlert>>;

    /// 終了時のフラッシュ
    async fn flush(&self) -> Result<()>;
}

fn upsert_record(state: &mut PersistedState, record: &EndpointRecord) {
    match state.endpoints.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record.clone(),
        None => state.endpoints.push(record.clone()),
    }
}

fn upsert_alert(state: &mut PersistedState, alert: &DriftAlert) {
    match state.drift_alerts.iter_mut().find(|a| a.id == alert.id) {
        Some(existing) => *existing = alert.clone(),
        None => state.drift_alerts.push(alert.clone()),
    }
}

fn filter_alerts(state: &PersistedState, unresolved_only: bool) -> Vec<DriftAlert> {
    let mut alerts: Vec<DriftAlert> = state
        .drift_alerts
        .iter()
        .filter(|a| !unresolved_only || !a.resolved)
        .cloned()
        .collect();
    alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
    alerts
}

/// インメモリ実装 (テスト・揮発運用)
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<PersistedState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EngineStorage for MemoryStorage {
    async fn load(&self) -> Result<PersistedState> {
        Ok(self.state.lock().await.clone())
    }

    async fn upsert_endpoint(&self, record: &EndpointRecord) -> Result<()> {
        upsert_record(&mut *self.state.lock().await, record);
        Ok(())
    }

    async fn put_drift_alert(&self, alert: &DriftAlert) -> Result<()> {
        upsert_alert(&mut *self.state.lock().await, alert);
        Ok(())
    }

    async fn list_drift_alerts(&self, unresolved_only: bool) -> Result<Vec<DriftAlert>> {
        Ok(filter_alerts(&*self.state.lock().await, unresolved_only))
    }

    async fn unresolved_for_endpoint(&self, endpoint_id: Uuid) -> Result<Vec<DriftAlert>> {
        let state = self.state.lock().await;
        let mut alerts: Vec<DriftAlert> = state
            .drift_alerts
            .iter()
            .filter(|a| a.endpoint_id == endpoint_id && !a.resolved)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(alerts)
    }

    async fn resolve_drift_alert(&self, alert_id: Uuid) -> Result<Option<DriftAlert>> {
        let mut state = self.state.lock().await;
        if let Some(alert) = state.drift_alerts.iter_mut().find(|a| a.id == alert_id) {
            alert.resolve();
            return Ok(Some(alert.clone()));
        }
        Ok(None)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// JSON ファイル実装
///
/// `DB_PATH` の単一ファイルに全状態を書く。書き込みは一時ファイル経由の
/// リネームで行い、中途半端な状態を残さない。
pub struct JsonFileStorage {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl JsonFileStorage {
    /// ファイルを開く (無ければ初期化する)
    ///
    /// 壊れたファイル・作成できないディレクトリは致命的エラー。
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::Storage(format!(
                        "cannot create data directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<PersistedState>(&bytes).map_err(|e| {
                Error::Storage(format!("corrupt state file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "cannot read state file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if !state.endpoints.is_empty() {
            info!(
                "📂 Loaded {} endpoint(s) and {} drift alert(s) from {}",
                state.endpoints.len(),
                state.drift_alerts.len(),
                path.display()
            );
        }

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    async fn persist(&self, state: &PersistedState) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &serialized).await.map_err(|e| {
            Error::Storage(format!("cannot write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            Error::Storage(format!("cannot replace {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl EngineStorage for JsonFileStorage {
    async fn load(&self) -> Result<PersistedState> {
        Ok(self.state.lock().await.clone())
    }

    async fn upsert_endpoint(&self, record: &EndpointRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        upsert_record(&mut state, record);
        self.persist(&state).await
    }

    async fn put_drift_alert(&self, alert: &DriftAlert) -> Result<()> {
        let mut state = self.state.lock().await;
        upsert_alert(&mut state, alert);
        self.persist(&state).await
    }

    async fn list_drift_alerts(&self, unresolved_only: bool) -> Result<Vec<DriftAlert>> {
        Ok(filter_alerts(&*self.state.lock().await, unresolved_only))
    }

    async fn unresolved_for_endpoint(&self, endpoint_id: Uuid) -> Result<Vec<DriftAlert>> {
        let state = self.state.lock().await;
        let mut alerts: Vec<DriftAlert> = state
            .drift_alerts
            .iter()
            .filter(|a| a.endpoint_id == endpoint_id && !a.resolved)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(alerts)
    }

    async fn resolve_drift_alert(&self, alert_id: Uuid) -> Result<Option<DriftAlert>> {
        let mut state = self.state.lock().await;
        let resolved = match state.drift_alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.resolve();
                Some(alert.clone())
            }
            None => None,
        };
        if resolved.is_some() {
            self.persist(&state).await?;
        }
        Ok(resolved)
    }

    async fn flush(&self) -> Result<()> {
        let state = self.state.lock().await;
        self.persist(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::EndpointKey;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        let record = EndpointRecord::new(&EndpointKey::new("GET", "/users/{id}"));
        storage.upsert_endpoint(&record).await.unwrap();

        let state = storage.load().await.unwrap();
        assert_eq!(state.endpoints.len(), 1);
        assert_eq!(state.endpoints[0].id, record.id);

        // 同じ id は置換される
        storage.upsert_endpoint(&record).await.unwrap();
        assert_eq!(storage.load().await.unwrap().endpoints.len(), 1);
    }

    #[tokio::test]
    async fn test_file_storage_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("amp.json");

        {
            let storage = JsonFileStorage::open(&path).await.unwrap();
            let record = EndpointRecord::new(&EndpointKey::new("GET", "/items"));
            storage.upsert_endpoint(&record).await.unwrap();
        }

        let reopened = JsonFileStorage::open(&path).await.unwrap();
        let state = reopened.load().await.unwrap();
        assert_eq!(state.endpoints.len(), 1);
        assert_eq!(state.endpoints[0].pattern, "/items");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("amp.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        assert!(JsonFileStorage::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_alert_resolution() {
        let storage = MemoryStorage::new();
        let alert = DriftAlert::new(Uuid::new_v4(), "GET /x".into(), 40.0, "s".into(), vec![]);
        storage.put_drift_alert(&alert).await.unwrap();

        assert_eq!(storage.list_drift_alerts(true).await.unwrap().len(), 1);
        let resolved = storage.resolve_drift_alert(alert.id).await.unwrap();
        assert!(resolved.unwrap().resolved);
        assert!(storage.list_drift_alerts(true).await.unwrap().is_empty());
        assert_eq!(storage.list_drift_alerts(false).await.unwrap().len(), 1);

        assert!(storage
            .resolve_drift_alert(Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }
}
