// Moderation domain models - reports, audit log entries and engine config.
//
// These are pure domain types with no storage dependencies.
// The infra layer decides how they are persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::moderation_service::ModerationError;

/// What kind of content a report points at.
///
/// Unknown strings read back from storage are kept as `Other` so they
/// survive a load/save cycle. `Other` never has a threshold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetType {
    Project,
    Comment,
    User,
    Other(String),
}

impl TargetType {
    pub fn as_str(&self) -> &str {
        match self {
            TargetType::Project => "project",
            TargetType::Comment => "comment",
            TargetType::User => "user",
            TargetType::Other(other) => other,
        }
    }
}

impl From<String> for TargetType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "project" => TargetType::Project,
            "comment" => TargetType::Comment,
            "user" => TargetType::User,
            _ => TargetType::Other(value),
        }
    }
}

impl From<&str> for TargetType {
    fn from(value: &str) -> Self {
        TargetType::from(value.to_string())
    }
}

impl From<TargetType> for String {
    fn from(value: TargetType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    ManuallyResolved,
    AutoDeleted,
    AutoWarned,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::ManuallyResolved => "manually_resolved",
            ReportStatus::AutoDeleted => "auto_deleted",
            ReportStatus::AutoWarned => "auto_warned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ReportStatus::Pending),
            "manually_resolved" => Some(ReportStatus::ManuallyResolved),
            "auto_deleted" => Some(ReportStatus::AutoDeleted),
            "auto_warned" => Some(ReportStatus::AutoWarned),
            _ => None,
        }
    }
}

/// A human reviewer's verdict on a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Content stays up, report closed
    Keep,
    /// Parked for later; report stays pending
    Hold,
    /// Content removed, report closed
    Delete,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Keep => "keep",
            ReviewDecision::Hold => "hold",
            ReviewDecision::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "keep" => Some(ReviewDecision::Keep),
            "hold" => Some(ReviewDecision::Hold),
            "delete" => Some(ReviewDecision::Delete),
            _ => None,
        }
    }

    /// Status a report moves to once this decision is recorded.
    pub fn resulting_status(&self) -> ReportStatus {
        match self {
            ReviewDecision::Keep | ReviewDecision::Delete => ReportStatus::ManuallyResolved,
            ReviewDecision::Hold => ReportStatus::Pending,
        }
    }
}

/// Record of a manual review attached to a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub decision: ReviewDecision,
    pub reviewer_id: String,
    pub notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

/// One human decision on a report. Every review appends one of these; the
/// report itself only carries the latest `Review`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualAction {
    pub id: String,
    pub report_id: String,
    pub decision: ReviewDecision,
    pub actor_id: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One user's complaint about one piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub target_type: TargetType,
    pub target_id: String,
    #[serde(default)]
    pub reporter_id: String,
    pub reason: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review: Option<Review>,
}

impl Report {
    pub fn target_key(&self) -> TargetKey {
        TargetKey {
            target_type: self.target_type.clone(),
            target_id: self.target_id.clone(),
        }
    }
}

/// Grouping key: every report about the same piece of content shares one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub target_type: TargetType,
    pub target_id: String,
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.target_id)
    }
}

/// Derived from report volume and recency. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Automatic remediation taken by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    AutoDelete,
    AutoWarning,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::AutoDelete => "auto_delete",
            ModerationAction::AutoWarning => "auto_warning",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto_delete" => Some(ModerationAction::AutoDelete),
            "auto_warning" => Some(ModerationAction::AutoWarning),
            _ => None,
        }
    }

    /// Status every report of the actioned group is moved to.
    pub fn report_status(&self) -> ReportStatus {
        match self {
            ModerationAction::AutoDelete => ReportStatus::AutoDeleted,
            ModerationAction::AutoWarning => ReportStatus::AutoWarned,
        }
    }
}

/// Append-only audit record, one per automatic action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationLogEntry {
    pub id: String,
    pub target_type: TargetType,
    pub target_id: String,
    pub report_count: u32,
    pub severity: Severity,
    pub action: ModerationAction,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl ModerationLogEntry {
    pub fn target_key(&self) -> TargetKey {
        TargetKey {
            target_type: self.target_type.clone(),
            target_id: self.target_id.clone(),
        }
    }
}

/// Upper bound for `report_expiry_days` (roughly a century).
pub const MAX_REPORT_EXPIRY_DAYS: i64 = 36_500;

/// Upper bound for `auto_process_interval_minutes` (one year).
pub const MAX_PROCESS_INTERVAL_MINUTES: u64 = 525_600;

/// Per-target-type report counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub project: u32,
    pub comment: u32,
    pub user: u32,
}

impl Thresholds {
    /// `None` for target types without a configured threshold.
    pub fn for_target(&self, target_type: &TargetType) -> Option<u32> {
        match target_type {
            TargetType::Project => Some(self.project),
            TargetType::Comment => Some(self.comment),
            TargetType::User => Some(self.user),
            TargetType::Other(_) => None,
        }
    }
}

/// Configuration for the auto-moderation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    pub auto_delete_thresholds: Thresholds,
    pub auto_warning_thresholds: Thresholds,
    /// Reports older than this are swept regardless of status
    pub report_expiry_days: i64,
    /// Minutes between scheduled runs
    pub auto_process_interval_minutes: u64,
    /// Skip a target whose latest log entry already records the same action and count
    pub skip_unchanged_targets: bool,
    /// Count already resolved reports toward a target's total
    pub count_resolved_reports: bool,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            auto_delete_thresholds: Thresholds {
                project: 5,  // 5 reports remove a project
                comment: 3,  // 3 reports remove a comment
                user: 10,    // 10 reports revoke a user's privileges
            },
            auto_warning_thresholds: Thresholds {
                project: 3,
                comment: 2,
                user: 5,
            },
            report_expiry_days: 30,
            auto_process_interval_minutes: 60,
            skip_unchanged_targets: true,
            count_resolved_reports: true,
        }
    }
}

impl ModerationConfig {
    /// True iff a delete threshold exists for the type and the count reaches it.
    pub fn should_auto_delete(&self, target_type: &TargetType, report_count: u32) -> bool {
        self.auto_delete_thresholds
            .for_target(target_type)
            .is_some_and(|threshold| report_count >= threshold)
    }

    /// True iff a warning threshold exists for the type and the count reaches it.
    pub fn should_auto_warn(&self, target_type: &TargetType, report_count: u32) -> bool {
        self.auto_warning_thresholds
            .for_target(target_type)
            .is_some_and(|threshold| report_count >= threshold)
    }

    pub fn validate(&self) -> Result<(), ModerationError> {
        let pairs = [
            (
                "project",
                self.auto_warning_thresholds.project,
                self.auto_delete_thresholds.project,
            ),
            (
                "comment",
                self.auto_warning_thresholds.comment,
                self.auto_delete_thresholds.comment,
            ),
            (
                "user",
                self.auto_warning_thresholds.user,
                self.auto_delete_thresholds.user,
            ),
        ];

        for (name, warn, delete) in pairs {
            if warn == 0 || delete == 0 {
                return Err(ModerationError::ConfigError(format!(
                    "{name} thresholds must be at least 1"
                )));
            }
            if warn >= delete {
                return Err(ModerationError::ConfigError(format!(
                    "{name} warning threshold ({warn}) must be lower than its delete threshold ({delete})"
                )));
            }
        }

        if !(0..=MAX_REPORT_EXPIRY_DAYS).contains(&self.report_expiry_days) {
            return Err(ModerationError::ConfigError(format!(
                "report expiry must be between 0 and {} days",
                MAX_REPORT_EXPIRY_DAYS
            )));
        }

        if !(1..=MAX_PROCESS_INTERVAL_MINUTES).contains(&self.auto_process_interval_minutes) {
            return Err(ModerationError::ConfigError(format!(
                "auto-process interval must be between 1 and {} minutes",
                MAX_PROCESS_INTERVAL_MINUTES
            )));
        }

        Ok(())
    }
}

/// Outcome of one engine run, mostly for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// False when no report collection was persisted at all
    pub loaded: bool,
    pub groups_evaluated: usize,
    pub deleted: Vec<TargetKey>,
    pub warned: Vec<TargetKey>,
    pub skipped_unchanged: Vec<TargetKey>,
    pub expired_removed: usize,
}

impl RunSummary {
    pub fn actions_taken(&self) -> usize {
        self.deleted.len() + self.warned.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_type_roundtrips_unknown_values() {
        let json = serde_json::to_string(&TargetType::from("room")).unwrap();
        assert_eq!(json, "\"room\"");

        let parsed: TargetType = serde_json::from_str("\"comment\"").unwrap();
        assert_eq!(parsed, TargetType::Comment);

        let parsed: TargetType = serde_json::from_str("\"room\"").unwrap();
        assert_eq!(parsed, TargetType::Other("room".to_string()));
    }

    #[test]
    fn test_unknown_target_has_no_threshold() {
        let config = ModerationConfig::default();
        let other = TargetType::from("room");

        assert_eq!(config.auto_delete_thresholds.for_target(&other), None);
        assert!(!config.should_auto_delete(&other, 1_000));
        assert!(!config.should_auto_warn(&other, 1_000));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ModerationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_warning_threshold_must_be_below_delete() {
        let mut config = ModerationConfig::default();
        config.auto_warning_thresholds.comment = 3;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ModerationError::ConfigError(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = ModerationConfig {
            auto_process_interval_minutes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_expiry_and_interval_rejected() {
        for days in [-1, MAX_REPORT_EXPIRY_DAYS + 1, 100_000_000, i64::MAX] {
            let config = ModerationConfig {
                report_expiry_days: days,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "expiry {} accepted", days);
        }

        let config = ModerationConfig {
            auto_process_interval_minutes: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ModerationConfig {
            report_expiry_days: MAX_REPORT_EXPIRY_DAYS,
            auto_process_interval_minutes: MAX_PROCESS_INTERVAL_MINUTES,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_report_status_wire_names() {
        let json = serde_json::to_string(&ReportStatus::ManuallyResolved).unwrap();
        assert_eq!(json, "\"manually_resolved\"");
        assert_eq!(ReportStatus::parse("auto_warned"), Some(ReportStatus::AutoWarned));
        assert_eq!(ReportStatus::parse("open"), None);
    }

    #[test]
    fn test_hold_keeps_report_pending() {
        assert_eq!(ReviewDecision::Hold.resulting_status(), ReportStatus::Pending);
        assert_eq!(
            ReviewDecision::Delete.resulting_status(),
            ReportStatus::ManuallyResolved
        );
    }
}
