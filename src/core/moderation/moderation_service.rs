// Auto-moderation engine - core business logic for report thresholds.
//
// This service handles:
// - Grouping reports by the content they target
// - Severity classification (volume + recency)
// - Threshold-based auto-delete / auto-warning
// - Expiry sweep of old reports
//
// NO storage or transport dependencies here - just pure domain logic behind ports.

use super::moderation_models::{
    ManualAction, ModerationAction, ModerationConfig, ModerationLogEntry, Report, ReportStatus,
    Review, RunSummary, Severity, TargetKey, TargetType,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Reports created within this many days count as "recent" for severity.
const RECENT_WINDOW_DAYS: i64 = 7;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

/// Persistence for reports, the automatic moderation log and the manual
/// action history.
///
/// Reads may be snapshots, but every write touches only the rows it names.
/// Status changes are conditional on the status the caller last saw, so the
/// engine and the review path never overwrite each other's work.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Load every report. `None` means nothing has ever been persisted.
    async fn load_reports(&self) -> Result<Option<Vec<Report>>, ModerationError>;

    async fn find_report(&self, report_id: &str) -> Result<Option<Report>, ModerationError>;

    /// Add a report unless the same reporter already reported the same target.
    /// Returns `false` for a duplicate. The check and the insert are atomic.
    async fn insert_report(&self, report: &Report) -> Result<bool, ModerationError>;

    /// Move the listed reports that are still in `from` to `to`.
    /// Returns how many reports changed.
    async fn update_status(
        &self,
        report_ids: &[String],
        from: ReportStatus,
        to: ReportStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<usize, ModerationError>;

    /// Attach a review if the report is still in `from`. `resolved_at` is only
    /// written when given. Returns `false` when the report moved on or is gone.
    async fn record_review(
        &self,
        report_id: &str,
        from: ReportStatus,
        to: ReportStatus,
        resolved_at: Option<DateTime<Utc>>,
        review: &Review,
    ) -> Result<bool, ModerationError>;

    /// Delete every report created at or before `cutoff`. Returns how many went.
    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, ModerationError>;

    /// Append one entry to the moderation log.
    async fn append_log_entry(&self, entry: &ModerationLogEntry) -> Result<(), ModerationError>;

    /// Load the moderation log, oldest first.
    async fn load_log_entries(&self) -> Result<Vec<ModerationLogEntry>, ModerationError>;

    async fn append_manual_action(&self, action: &ManualAction) -> Result<(), ModerationError>;

    /// Manual decisions, oldest first.
    async fn load_manual_actions(&self) -> Result<Vec<ManualAction>, ModerationError>;
}

/// The content tables the engine is allowed to touch.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn delete_project(&self, project_id: &str) -> Result<(), ModerationError>;

    async fn delete_comment(&self, comment_id: &str) -> Result<(), ModerationError>;

    /// Strip the administrative flag from a user. The account itself stays.
    async fn revoke_admin(&self, user_id: &str) -> Result<(), ModerationError>;

    async fn is_admin(&self, user_id: &str) -> Result<bool, ModerationError>;
}

// Shared stores: the engine and the report service hold clones of one Arc.
#[async_trait]
impl<T: ReportStore + ?Sized> ReportStore for Arc<T> {
    async fn load_reports(&self) -> Result<Option<Vec<Report>>, ModerationError> {
        (**self).load_reports().await
    }

    async fn find_report(&self, report_id: &str) -> Result<Option<Report>, ModerationError> {
        (**self).find_report(report_id).await
    }

    async fn insert_report(&self, report: &Report) -> Result<bool, ModerationError> {
        (**self).insert_report(report).await
    }

    async fn update_status(
        &self,
        report_ids: &[String],
        from: ReportStatus,
        to: ReportStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<usize, ModerationError> {
        (**self)
            .update_status(report_ids, from, to, resolved_at)
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
        (**self)
            .record_review(report_id, from, to, resolved_at, review)
            .await
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, ModerationError> {
        (**self).delete_expired(cutoff).await
    }

    async fn append_log_entry(&self, entry: &ModerationLogEntry) -> Result<(), ModerationError> {
        (**self).append_log_entry(entry).await
    }

    async fn load_log_entries(&self) -> Result<Vec<ModerationLogEntry>, ModerationError> {
        (**self).load_log_entries().await
    }

    async fn append_manual_action(&self, action: &ManualAction) -> Result<(), ModerationError> {
        (**self).append_manual_action(action).await
    }

    async fn load_manual_actions(&self) -> Result<Vec<ManualAction>, ModerationError> {
        (**self).load_manual_actions().await
    }
}

#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn delete_project(&self, project_id: &str) -> Result<(), ModerationError> {
        (**self).delete_project(project_id).await
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<(), ModerationError> {
        (**self).delete_comment(comment_id).await
    }

    async fn revoke_admin(&self, user_id: &str) -> Result<(), ModerationError> {
        (**self).revoke_admin(user_id).await
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, ModerationError> {
        (**self).is_admin(user_id).await
    }
}

// ============================================================================
// SNAPSHOT HELPERS
// ============================================================================
// Write semantics for stores that keep the whole collection in memory.
// Callers hold their store's write lock around these.

/// True if the candidate's reporter already reported the same target.
/// Reports without a reporter never count as duplicates.
pub fn already_reported(reports: &[Report], candidate: &Report) -> bool {
    !candidate.reporter_id.is_empty()
        && reports.iter().any(|r| {
            r.reporter_id == candidate.reporter_id
                && r.target_type == candidate.target_type
                && r.target_id == candidate.target_id
        })
}

pub fn transition_status(
    reports: &mut [Report],
    report_ids: &[String],
    from: ReportStatus,
    to: ReportStatus,
    resolved_at: DateTime<Utc>,
) -> usize {
    let mut changed = 0;
    for report in reports
        .iter_mut()
        .filter(|r| r.status == from && report_ids.contains(&r.id))
    {
        report.status = to;
        report.resolved_at = Some(resolved_at);
        changed += 1;
    }
    changed
}

pub fn attach_review(
    reports: &mut [Report],
    report_id: &str,
    from: ReportStatus,
    to: ReportStatus,
    resolved_at: Option<DateTime<Utc>>,
    review: &Review,
) -> bool {
    match reports
        .iter_mut()
        .find(|r| r.id == report_id && r.status == from)
    {
        Some(report) => {
            report.status = to;
            if resolved_at.is_some() {
                report.resolved_at = resolved_at;
            }
            report.review = Some(review.clone());
            true
        }
        None => false,
    }
}

pub fn remove_expired(reports: &mut Vec<Report>, cutoff: DateTime<Utc>) -> usize {
    let before = reports.len();
    reports.retain(|r| r.created_at > cutoff);
    before - reports.len()
}

// ============================================================================
// PURE HELPERS
// ============================================================================

/// `now - days`, or `None` when that is not a representable instant.
pub fn days_before(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|window| now.checked_sub_signed(window))
}

/// Classify how severe the reports against one target are.
///
/// First matching rule wins, most severe first.
pub fn classify_severity(reports: &[Report], now: DateTime<Utc>) -> Severity {
    let total = reports.len();
    let recent = match days_before(now, RECENT_WINDOW_DAYS) {
        Some(cutoff) => reports.iter().filter(|r| r.created_at >= cutoff).count(),
        // Nothing predates the earliest instant
        None => total,
    };

    if total >= 10 || recent >= 5 {
        Severity::Critical
    } else if total >= 5 || recent >= 3 {
        Severity::High
    } else if total >= 3 || recent >= 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Time-based id with a random suffix so two ids minted in the same
/// millisecond don't collide.
pub(crate) fn new_id(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-{}-{:08x}", prefix, now.timestamp_millis(), suffix)
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Threshold-driven auto-moderation over a snapshot of all reports.
pub struct ModerationEngine<S: ReportStore, C: ContentStore> {
    store: S,
    content: C,
    config: ModerationConfig,
    // Serializes overlapping runs (timer tick vs. manual trigger)
    run_lock: Mutex<()>,
}

impl<S: ReportStore, C: ContentStore> ModerationEngine<S, C> {
    pub fn new(store: S, content: C, config: ModerationConfig) -> Self {
        Self {
            store,
            content,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    #[allow(dead_code)]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[allow(dead_code)]
    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn should_auto_delete(&self, target_type: &TargetType, report_count: u32) -> bool {
        self.config.should_auto_delete(target_type, report_count)
    }

    pub fn should_auto_warn(&self, target_type: &TargetType, report_count: u32) -> bool {
        self.config.should_auto_warn(target_type, report_count)
    }

    /// Run one moderation pass.
    ///
    /// Never fails: storage problems are logged and the pass degrades to
    /// doing less (or nothing). The returned summary says what happened.
    pub async fn process_reports(&self, now: DateTime<Utc>) -> RunSummary {
        let _guard = self.run_lock.lock().await;

        let summary = self.run(now).await;
        if summary.loaded {
            tracing::info!(
                groups = summary.groups_evaluated,
                deleted = summary.deleted.len(),
                warned = summary.warned.len(),
                skipped = summary.skipped_unchanged.len(),
                expired = summary.expired_removed,
                "Moderation run finished"
            );
        }
        summary
    }

    async fn run(&self, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::default();

        let reports = match self.store.load_reports().await {
            Ok(Some(reports)) => reports,
            Ok(None) => {
                tracing::debug!("No reports persisted yet, nothing to moderate");
                return summary;
            }
            Err(e) => {
                tracing::warn!("Failed to load reports, skipping this run: {}", e);
                return summary;
            }
        };
        summary.loaded = true;

        let last_actions = if self.config.skip_unchanged_targets {
            self.latest_actions().await
        } else {
            HashMap::new()
        };

        let groups = self.group_reports(&reports);
        summary.groups_evaluated = groups.len();

        for (key, group) in groups {
            let report_count = group.len() as u32;
            let severity = classify_severity(&group, now);

            let action = if self.should_auto_delete(&key.target_type, report_count) {
                ModerationAction::AutoDelete
            } else if self.should_auto_warn(&key.target_type, report_count) {
                ModerationAction::AutoWarning
            } else {
                continue;
            };

            if last_actions.get(&key) == Some(&(action, report_count)) {
                tracing::debug!(
                    target_key = %key,
                    report_count,
                    action = action.as_str(),
                    "Target already actioned at this report count, skipping"
                );
                summary.skipped_unchanged.push(key);
                continue;
            }

            self.apply_action(&key, action, report_count, severity, now)
                .await;
            self.mark_group(&key, &group, action.report_status(), now)
                .await;

            match action {
                ModerationAction::AutoDelete => summary.deleted.push(key),
                ModerationAction::AutoWarning => summary.warned.push(key),
            }
        }

        summary.expired_removed = self.sweep_expired(now).await;
        summary
    }

    /// Group reports by target, in first-seen order.
    fn group_reports(&self, reports: &[Report]) -> Vec<(TargetKey, Vec<Report>)> {
        let mut positions: HashMap<TargetKey, usize> = HashMap::new();
        let mut groups: Vec<(TargetKey, Vec<Report>)> = Vec::new();

        for report in reports {
            if !self.config.count_resolved_reports && report.status != ReportStatus::Pending {
                continue;
            }

            let key = report.target_key();
            match positions.get(&key) {
                Some(&pos) => groups[pos].1.push(report.clone()),
                None => {
                    positions.insert(key.clone(), groups.len());
                    groups.push((key, vec![report.clone()]));
                }
            }
        }

        groups
    }

    /// Latest (action, count) recorded per target in the moderation log.
    async fn latest_actions(&self) -> HashMap<TargetKey, (ModerationAction, u32)> {
        match self.store.load_log_entries().await {
            Ok(entries) => entries
                .into_iter()
                .map(|e| (e.target_key(), (e.action, e.report_count)))
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to load moderation log, duplicate guard disabled: {}", e);
                HashMap::new()
            }
        }
    }

    async fn apply_action(
        &self,
        key: &TargetKey,
        action: ModerationAction,
        report_count: u32,
        severity: Severity,
        now: DateTime<Utc>,
    ) {
        let (prefix, reason) = match action {
            ModerationAction::AutoDelete => (
                "deletion",
                format!("Automatically deleted after {} reports", report_count),
            ),
            ModerationAction::AutoWarning => (
                "warning",
                format!("Automatically warned after {} reports", report_count),
            ),
        };

        tracing::info!(
            target_type = %key.target_type,
            target_id = %key.target_id,
            report_count,
            severity = %severity,
            action = action.as_str(),
            "Auto-moderation threshold reached"
        );

        let entry = ModerationLogEntry {
            id: new_id(prefix, now),
            target_type: key.target_type.clone(),
            target_id: key.target_id.clone(),
            report_count,
            severity,
            action,
            reason,
            created_at: now,
        };

        // Log first; a failing side effect below is not rolled back.
        if let Err(e) = self.store.append_log_entry(&entry).await {
            tracing::warn!("Failed to append moderation log entry for {}: {}", key, e);
        }

        if action == ModerationAction::AutoDelete {
            self.remove_target(key).await;
        }
    }

    async fn remove_target(&self, key: &TargetKey) {
        let result = match &key.target_type {
            TargetType::Project => self.content.delete_project(&key.target_id).await,
            TargetType::Comment => self.content.delete_comment(&key.target_id).await,
            TargetType::User => self.content.revoke_admin(&key.target_id).await,
            TargetType::Other(kind) => {
                tracing::warn!(
                    kind = %kind,
                    target_id = %key.target_id,
                    "No removal handler for target type, ignoring"
                );
                return;
            }
        };

        if let Err(e) = result {
            tracing::warn!("Failed to remove {}: {}", key, e);
        }
    }

    /// Move the group's reports to `to`, one conditional update per status
    /// seen in the snapshot. Reports changed elsewhere since the load keep
    /// their newer status.
    async fn mark_group(
        &self,
        key: &TargetKey,
        group: &[Report],
        to: ReportStatus,
        now: DateTime<Utc>,
    ) {
        let mut by_status: Vec<(ReportStatus, Vec<String>)> = Vec::new();
        for report in group {
            match by_status.iter_mut().find(|(status, _)| *status == report.status) {
                Some((_, ids)) => ids.push(report.id.clone()),
                None => by_status.push((report.status, vec![report.id.clone()])),
            }
        }

        for (from, ids) in by_status {
            match self.store.update_status(&ids, from, to, now).await {
                Ok(changed) if changed < ids.len() => tracing::debug!(
                    target_key = %key,
                    expected = ids.len(),
                    changed,
                    "Some reports changed during the run and kept their status"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to mark reports for {}: {}", key, e),
            }
        }
    }

    /// Drop reports older than the expiry window. Returns how many were removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = days_before(now, self.config.report_expiry_days) else {
            tracing::warn!(
                expiry_days = self.config.report_expiry_days,
                "Expiry window reaches past the earliest instant, nothing to sweep"
            );
            return 0;
        };

        match self.store.delete_expired(cutoff).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("Failed to sweep expired reports: {}", e);
                0
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
