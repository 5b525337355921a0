// In-memory implementations of the moderation ports.
//
// Nothing survives a restart. Used by tests and by the daemon when
// MODERATION_STORE=memory.

use crate::core::moderation::{
    already_reported, attach_review, remove_expired, transition_status, ContentStore,
    ManualAction, ModerationError, ModerationLogEntry, Report, ReportStatus, ReportStore, Review,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::RwLock;

/// Reports, moderation log and manual action history held in process memory.
#[derive(Default)]
pub struct InMemoryModerationStore {
    /// `None` until the first report arrives, mirroring an empty blob store
    reports: RwLock<Option<Vec<Report>>>,
    log: RwLock<Vec<ModerationLogEntry>>,
    actions: RwLock<Vec<ManualAction>>,
}

impl InMemoryModerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn with_reports(reports: Vec<Report>) -> Self {
        Self {
            reports: RwLock::new(Some(reports)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ReportStore for InMemoryModerationStore {
    async fn load_reports(&self) -> Result<Option<Vec<Report>>, ModerationError> {
        Ok(self.reports.read().await.clone())
    }

    async fn find_report(&self, report_id: &str) -> Result<Option<Report>, ModerationError> {
        let reports = self.reports.read().await;
        Ok(reports
            .as_ref()
            .and_then(|all| all.iter().find(|r| r.id == report_id).cloned()))
    }

    async fn insert_report(&self, report: &Report) -> Result<bool, ModerationError> {
        let mut guard = self.reports.write().await;
        let reports = guard.get_or_insert_with(Vec::new);
        if already_reported(reports, report) {
            return Ok(false);
        }
        reports.push(report.clone());
        Ok(true)
    }

    async fn update_status(
        &self,
        report_ids: &[String],
        from: ReportStatus,
        to: ReportStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<usize, ModerationError> {
        let mut guard = self.reports.write().await;
        Ok(guard.as_mut().map_or(0, |reports| {
            transition_status(reports, report_ids, from, to, resolved_at)
        }))
    }

    async fn record_review(
        &self,
        report_id: &str,
        from: ReportStatus,
        to: ReportStatus,
        resolved_at: Option<DateTime<Utc>>,
        review: &Review,
    ) -> Result<bool, ModerationError> {
        let mut guard = self.reports.write().await;
        Ok(guard.as_mut().is_some_and(|reports| {
            attach_review(reports, report_id, from, to, resolved_at, review)
        }))
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, ModerationError> {
        let mut guard = self.reports.write().await;
        Ok(guard
            .as_mut()
            .map_or(0, |reports| remove_expired(reports, cutoff)))
    }

    async fn append_log_entry(&self, entry: &ModerationLogEntry) -> Result<(), ModerationError> {
        self.log.write().await.push(entry.clone());
        Ok(())
    }

    async fn load_log_entries(&self) -> Result<Vec<ModerationLogEntry>, ModerationError> {
        Ok(self.log.read().await.clone())
    }

    async fn append_manual_action(&self, action: &ManualAction) -> Result<(), ModerationError> {
        self.actions.write().await.push(action.clone());
        Ok(())
    }

    async fn load_manual_actions(&self) -> Result<Vec<ManualAction>, ModerationError> {
        Ok(self.actions.read().await.clone())
    }
}

/// Projects, comments and admin flags keyed by id.
///
/// **DashSet/DashMap:** the engine and the review path may touch content
/// from different tasks, so these are concurrent without an outer lock.
#[derive(Default)]
pub struct InMemoryContentStore {
    projects: DashSet<String>,
    comments: DashSet<String>,
    /// user id -> is_admin
    profiles: DashMap<String, bool>,
}

#[allow(dead_code)]
impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project(&self, id: &str) {
        self.projects.insert(id.to_string());
    }

    pub fn add_comment(&self, id: &str) {
        self.comments.insert(id.to_string());
    }

    pub fn add_admin(&self, user_id: &str) {
        self.profiles.insert(user_id.to_string(), true);
    }

    pub fn has_project(&self, id: &str) -> bool {
        self.projects.contains(id)
    }

    pub fn has_comment(&self, id: &str) -> bool {
        self.comments.contains(id)
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn delete_project(&self, project_id: &str) -> Result<(), ModerationError> {
        self.projects.remove(project_id);
        Ok(())
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<(), ModerationError> {
        self.comments.remove(comment_id);
        Ok(())
    }

    async fn revoke_admin(&self, user_id: &str) -> Result<(), ModerationError> {
        // Only existing profiles are touched; unknown users stay unknown
        if let Some(mut is_admin) = self.profiles.get_mut(user_id) {
            *is_admin = false;
        }
        Ok(())
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, ModerationError> {
        Ok(self.profiles.get(user_id).map(|v| *v).unwrap_or(false))
    }
}
