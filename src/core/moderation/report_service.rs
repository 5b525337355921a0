// Report intake and manual review.
//
// Users file reports here; administrators keep, hold or delete them.
// Every write is row-level and conditional, so this path can run alongside
// the engine without either one losing the other's changes.

use super::moderation_models::{
    ManualAction, ModerationLogEntry, Report, ReportStatus, Review, ReviewDecision, TargetType,
};
use super::moderation_service::{new_id, ContentStore, ModerationError, ReportStore};
use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("This content has already been reported by this user")]
    Duplicate,

    #[error("Report not found: {0}")]
    NotFound(String),

    #[error("Report {0} changed while it was being reviewed")]
    Conflict(String),

    #[error("Administrator permission required")]
    Forbidden,

    #[error("Unsupported content type: {0}")]
    UnsupportedTarget(String),

    #[error(transparent)]
    Moderation(#[from] ModerationError),
}

/// Payload of a report submission.
#[derive(Debug, Clone, Default)]
pub struct NewReport {
    pub target_id: String,
    pub target_type: String,
    pub reason: String,
    pub description: Option<String>,
}

pub struct ReportService<S: ReportStore, C: ContentStore> {
    store: S,
    content: C,
}

impl<S: ReportStore, C: ContentStore> ReportService<S, C> {
    pub fn new(store: S, content: C) -> Self {
        Self { store, content }
    }

    /// File a new pending report.
    ///
    /// One reporter can only report a given piece of content once.
    #[allow(dead_code)]
    pub async fn submit_report(
        &self,
        reporter_id: &str,
        new_report: NewReport,
    ) -> Result<Report, ReportError> {
        let reporter_id = required(reporter_id, "reporter_id")?;
        let target_id = required(&new_report.target_id, "target_id")?;
        let target_type = TargetType::from(required(&new_report.target_type, "target_type")?);
        let reason = required(&new_report.reason, "reason")?;

        let now = Utc::now();
        let report = Report {
            id: new_id("report", now),
            target_type,
            target_id,
            reporter_id,
            reason,
            description: new_report
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            status: ReportStatus::Pending,
            created_at: now,
            resolved_at: None,
            review: None,
        };

        if !self.store.insert_report(&report).await? {
            return Err(ReportError::Duplicate);
        }

        tracing::info!(
            report_id = %report.id,
            target_type = %report.target_type,
            target_id = %report.target_id,
            "Report submitted"
        );

        Ok(report)
    }

    /// Record an administrator's decision. `Delete` removes the content first.
    ///
    /// Fails with `Conflict` when the report's status changed between the
    /// read and the write (for example an engine run resolved it).
    #[allow(dead_code)]
    pub async fn review_report(
        &self,
        reviewer_id: &str,
        report_id: &str,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<Report, ReportError> {
        if !self.content.is_admin(reviewer_id).await? {
            return Err(ReportError::Forbidden);
        }

        let mut report = self
            .store
            .find_report(report_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(report_id.to_string()))?;

        if decision == ReviewDecision::Delete {
            self.remove_content(&report.target_type, &report.target_id)
                .await?;
        }

        let now = Utc::now();
        let notes = notes.filter(|n| !n.trim().is_empty());
        let to = decision.resulting_status();
        let resolved_at = (to == ReportStatus::ManuallyResolved).then_some(now);
        let review = Review {
            decision,
            reviewer_id: reviewer_id.to_string(),
            notes: notes.clone(),
            reviewed_at: now,
        };

        let recorded = self
            .store
            .record_review(&report.id, report.status, to, resolved_at, &review)
            .await?;
        if !recorded {
            return Err(ReportError::Conflict(report.id));
        }

        let action = ManualAction {
            id: new_id("action", now),
            report_id: report.id.clone(),
            decision,
            actor_id: reviewer_id.to_string(),
            notes,
            created_at: now,
        };
        // The review itself already stuck; a missing history row is not fatal
        if let Err(e) = self.store.append_manual_action(&action).await {
            tracing::warn!(report_id = %report.id, "Failed to record manual action: {}", e);
        }

        report.status = to;
        if resolved_at.is_some() {
            report.resolved_at = resolved_at;
        }
        report.review = Some(review);

        tracing::info!(
            report_id = %report.id,
            reviewer_id,
            decision = decision.as_str(),
            "Report reviewed"
        );

        Ok(report)
    }

    /// Reports for the admin view, newest first.
    pub async fn list_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<Report>, ReportError> {
        let mut reports: Vec<Report> = self
            .store
            .load_reports()
            .await?
            .unwrap_or_default()
            .into_iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    /// Automatic actions, newest first.
    #[allow(dead_code)]
    pub async fn moderation_log(&self) -> Result<Vec<ModerationLogEntry>, ReportError> {
        let mut entries = self.store.load_log_entries().await?;
        entries.reverse();
        Ok(entries)
    }

    /// Every manual decision taken on one report, oldest first.
    #[allow(dead_code)]
    pub async fn review_history(&self, report_id: &str) -> Result<Vec<ManualAction>, ReportError> {
        Ok(self
            .store
            .load_manual_actions()
            .await?
            .into_iter()
            .filter(|a| a.report_id == report_id)
            .collect())
    }

    async fn remove_content(
        &self,
        target_type: &TargetType,
        target_id: &str,
    ) -> Result<(), ReportError> {
        match target_type {
            TargetType::Project => self.content.delete_project(target_id).await?,
            TargetType::Comment => self.content.delete_comment(target_id).await?,
            TargetType::User => self.content.revoke_admin(target_id).await?,
            TargetType::Other(kind) => return Err(ReportError::UnsupportedTarget(kind.clone())),
        }
        Ok(())
    }
}

fn required(value: &str, field: &'static str) -> Result<String, ReportError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ReportError::MissingField(field))
    } else {
        Ok(trimmed.to_string())
    }
}
