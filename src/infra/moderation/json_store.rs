use crate::core::moderation::{
    already_reported, attach_review, remove_expired, transition_status, ManualAction,
    ModerationError, ModerationLogEntry, Report, ReportStatus, ReportStore, Review,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// JSON-based moderation store. Everything lives in one file:
/// { "reports": [Report] | null, "moderation_log": [...], "manual_actions": [...] }
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct JsonStoreData {
    #[serde(default)]
    pub reports: Option<Vec<Report>>,
    #[serde(default)]
    pub moderation_log: Vec<ModerationLogEntry>,
    #[serde(default)]
    pub manual_actions: Vec<ManualAction>,
}

pub struct JsonModerationStore {
    path: PathBuf,
    cache: RwLock<JsonStoreData>,
}

impl JsonModerationStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// An unreadable or malformed file is logged and treated as empty; the
    /// next write replaces it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = if path.exists() {
            Self::read_file(&path).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable moderation store {:?}: {}", path, e);
                JsonStoreData::default()
            })
        } else {
            JsonStoreData::default()
        };

        Self {
            path,
            cache: RwLock::new(cache),
        }
    }

    fn read_file(path: &Path) -> Result<JsonStoreData, ModerationError> {
        let file = File::open(path).map_err(|e| ModerationError::StorageError(e.to_string()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| ModerationError::StorageError(e.to_string()))
    }

    /// Write to a sibling temp file, then rename over the real one.
    fn persist(&self, data: &JsonStoreData) -> Result<(), ModerationError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ModerationError::StorageError(e.to_string()))?;
            }
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let file =
            File::create(&tmp_path).map_err(|e| ModerationError::StorageError(e.to_string()))?;
        serde_json::to_writer_pretty(file, data)
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        Ok(())
    }

    /// Apply `change` to a copy of the data and persist it. The cache only
    /// takes the new state once the file write succeeded.
    async fn mutate<R>(
        &self,
        change: impl FnOnce(&mut JsonStoreData) -> R,
    ) -> Result<R, ModerationError> {
        // Hold the write lock across the file write so saves can't interleave
        let mut cache = self.cache.write().await;
        let mut next = cache.clone();
        let result = change(&mut next);
        self.persist(&next)?;
        *cache = next;
        Ok(result)
    }
}

#[async_trait]
impl ReportStore for JsonModerationStore {
    async fn load_reports(&self) -> Result<Option<Vec<Report>>, ModerationError> {
        let cache = self.cache.read().await;
        Ok(cache.reports.clone())
    }

    async fn find_report(&self, report_id: &str) -> Result<Option<Report>, ModerationError> {
        let cache = self.cache.read().await;
        Ok(cache
            .reports
            .as_ref()
            .and_then(|all| all.iter().find(|r| r.id == report_id).cloned()))
    }

    async fn insert_report(&self, report: &Report) -> Result<bool, ModerationError> {
        {
            let cache = self.cache.read().await;
            if let Some(reports) = &cache.reports {
                if already_reported(reports, report) {
                    return Ok(false);
                }
            }
        }

        self.mutate(|data| {
            let reports = data.reports.get_or_insert_with(Vec::new);
            // Re-checked under the write lock
            if already_reported(reports, report) {
                return false;
            }
            reports.push(report.clone());
            true
        })
        .await
    }

    async fn update_status(
        &self,
        report_ids: &[String],
        from: ReportStatus,
        to: ReportStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<usize, ModerationError> {
        self.mutate(|data| {
            data.reports.as_mut().map_or(0, |reports| {
                transition_status(reports, report_ids, from, to, resolved_at)
            })
        })
        .await
    }

    async fn record_review(
        &self,
        report_id: &str,
        from: ReportStatus,
        to: ReportStatus,
        resolved_at: Option<DateTime<Utc>>,
        review: &Review,
    ) -> Result<bool, ModerationError> {
        self.mutate(|data| {
            data.reports.as_mut().is_some_and(|reports| {
                attach_review(reports, report_id, from, to, resolved_at, review)
            })
        })
        .await
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, ModerationError> {
        self.mutate(|data| {
            data.reports
                .as_mut()
                .map_or(0, |reports| remove_expired(reports, cutoff))
        })
        .await
    }

    async fn append_log_entry(&self, entry: &ModerationLogEntry) -> Result<(), ModerationError> {
        self.mutate(|data| data.moderation_log.push(entry.clone()))
            .await
    }

    async fn load_log_entries(&self) -> Result<Vec<ModerationLogEntry>, ModerationError> {
        let cache = self.cache.read().await;
        Ok(cache.moderation_log.clone())
    }

    async fn append_manual_action(&self, action: &ManualAction) -> Result<(), ModerationError> {
        self.mutate(|data| data.manual_actions.push(action.clone()))
            .await
    }

    async fn load_manual_actions(&self) -> Result<Vec<ManualAction>, ModerationError> {
        let cache = self.cache.read().await;
        Ok(cache.manual_actions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{
        ModerationConfig, ModerationEngine, ReportStatus, TargetType,
    };
    use crate::infra::moderation::InMemoryContentStore;
    use chrono::{Duration, Utc};
    use tempfile::{tempdir, NamedTempFile};

    fn report(id: &str, target_type: &str, target_id: &str, age: Duration) -> Report {
        Report {
            id: id.to_string(),
            target_type: TargetType::from(target_type),
            target_id: target_id.to_string(),
            reporter_id: format!("user-{}", id),
            reason: "spam".to_string(),
            description: Some("posted the same link everywhere".to_string()),
            status: ReportStatus::Pending,
            created_at: Utc::now() - age,
            resolved_at: None,
            review: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file_means_nothing_persisted() {
        let dir = tempdir().unwrap();
        let store = JsonModerationStore::new(dir.path().join("moderation.json"));

        assert!(store.load_reports().await.unwrap().is_none());
        assert!(store.load_log_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_persistence_roundtrip() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_owned();
        drop(tmp);

        let store = JsonModerationStore::new(path.clone());
        let reports = vec![
            report("1", "comment", "c1", Duration::hours(1)),
            report("2", "room", "r9", Duration::hours(2)),
        ];
        for r in &reports {
            assert!(store.insert_report(r).await.unwrap());
        }

        // Reload from file
        let store2 = JsonModerationStore::new(path.clone());
        let loaded = store2.load_reports().await.unwrap().unwrap();
        assert_eq!(loaded, reports);
        assert_eq!(loaded[1].target_type, TargetType::Other("room".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_file_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("moderation.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let store = JsonModerationStore::new(path.clone());
        assert!(store.load_reports().await.unwrap().is_none());

        store
            .insert_report(&report("1", "project", "p1", Duration::hours(1)))
            .await
            .unwrap();
        let reloaded = JsonModerationStore::new(path);
        assert_eq!(reloaded.load_reports().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_run_persists_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("moderation.json");

        let store = JsonModerationStore::new(path.clone());
        for r in [
            report("1", "comment", "c1", Duration::minutes(10)),
            report("2", "comment", "c1", Duration::minutes(20)),
            report("3", "comment", "c1", Duration::minutes(30)),
            report("4", "project", "p1", Duration::days(31)),
        ] {
            store.insert_report(&r).await.unwrap();
        }

        let content = InMemoryContentStore::new();
        content.add_comment("c1");
        let engine = ModerationEngine::new(store, content, ModerationConfig::default());
        engine.process_reports(Utc::now()).await;

        let reloaded = JsonModerationStore::new(path);
        let reports = reloaded.load_reports().await.unwrap().unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.status == ReportStatus::AutoDeleted));

        let log = reloaded.load_log_entries().await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].report_count, 3);
        assert!(!engine.content().has_comment("c1"));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        let dir = tempdir().unwrap();
        // A regular file where the store's directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = JsonModerationStore::new(blocker.join("moderation.json"));

        let result = store
            .insert_report(&report("1", "comment", "c1", Duration::hours(1)))
            .await;

        assert!(result.is_err());
        assert!(store.load_reports().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manual_actions_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("moderation.json");
        let store = JsonModerationStore::new(path.clone());

        store
            .append_manual_action(&ManualAction {
                id: "action-1".to_string(),
                report_id: "1".to_string(),
                decision: crate::core::moderation::ReviewDecision::Hold,
                actor_id: "admin".to_string(),
                notes: Some("waiting on the author".to_string()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let reloaded = JsonModerationStore::new(path);
        let actions = reloaded.load_manual_actions().await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].actor_id, "admin");
    }
}
