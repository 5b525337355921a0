// SQLite-backed moderation stores.
//
// Tables:
// - reports: One row per report, including the manual review columns
// - moderation_log: Append-only audit trail of automatic actions
// - moderation_actions: Append-only history of manual review decisions
// - moderation_state: Small key/value table ("reports ever saved" marker)
// - projects / comments / profiles: The content the engine may remove

use crate::core::moderation::{
    ContentStore, ManualAction, ModerationAction, ModerationError, ModerationLogEntry, Report,
    ReportStatus, ReportStore, Review, ReviewDecision, Severity, TargetType,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

const REPORTS_SAVED_KEY: &str = "reports_saved";

fn storage(e: impl ToString) -> ModerationError {
    ModerationError::StorageError(e.to_string())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, ModerationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage(format!("bad timestamp {:?}: {}", value, e)))
}

/// Fixed-width UTC form, so text comparison in SQL orders like time.
fn fmt_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_optional_time(value: Option<String>) -> Result<Option<DateTime<Utc>>, ModerationError> {
    value.as_deref().map(parse_time).transpose()
}

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                target_type TEXT NOT NULL,
                target_id TEXT NOT NULL,
                reporter_id TEXT NOT NULL DEFAULT '',
                reason TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                review_decision TEXT,
                reviewed_by TEXT,
                reviewed_at TEXT,
                review_notes TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reports_target ON reports(target_type, target_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        // One report per reporter and target; legacy rows without a reporter are exempt
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_reports_reporter_target
                ON reports(reporter_id, target_type, target_id)
                WHERE reporter_id <> ''
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                target_type TEXT NOT NULL,
                target_id TEXT NOT NULL,
                report_count INTEGER NOT NULL,
                severity TEXT NOT NULL,
                action TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_actions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                report_id TEXT NOT NULL,
                decision TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    fn report_from_row(row: &SqliteRow) -> Result<Report, ModerationError> {
        let status_str: String = row.try_get("status").map_err(storage)?;
        let status = ReportStatus::parse(&status_str)
            .ok_or_else(|| storage(format!("unknown report status {:?}", status_str)))?;

        let created_at: String = row.try_get("created_at").map_err(storage)?;
        let resolved_at: Option<String> = row.try_get("resolved_at").map_err(storage)?;

        let review = match row
            .try_get::<Option<String>, _>("review_decision")
            .map_err(storage)?
        {
            Some(decision_str) => {
                let decision = ReviewDecision::parse(&decision_str)
                    .ok_or_else(|| storage(format!("unknown decision {:?}", decision_str)))?;
                let reviewed_at: Option<String> = row.try_get("reviewed_at").map_err(storage)?;
                let reviewed_at = parse_optional_time(reviewed_at)?
                    .ok_or_else(|| storage("review recorded without reviewed_at"))?;
                Some(Review {
                    decision,
                    reviewer_id: row
                        .try_get::<Option<String>, _>("reviewed_by")
                        .map_err(storage)?
                        .unwrap_or_default(),
                    notes: row.try_get("review_notes").map_err(storage)?,
                    reviewed_at,
                })
            }
            None => None,
        };

        Ok(Report {
            id: row.try_get("id").map_err(storage)?,
            target_type: TargetType::from(row.try_get::<String, _>("target_type").map_err(storage)?),
            target_id: row.try_get("target_id").map_err(storage)?,
            reporter_id: row.try_get("reporter_id").map_err(storage)?,
            reason: row.try_get("reason").map_err(storage)?,
            description: row.try_get("description").map_err(storage)?,
            status,
            created_at: parse_time(&created_at)?,
            resolved_at: parse_optional_time(resolved_at)?,
            review,
        })
    }

    fn manual_action_from_row(row: &SqliteRow) -> Result<ManualAction, ModerationError> {
        let decision_str: String = row.try_get("decision").map_err(storage)?;
        let created_at: String = row.try_get("created_at").map_err(storage)?;

        Ok(ManualAction {
            id: row.try_get("id").map_err(storage)?,
            report_id: row.try_get("report_id").map_err(storage)?,
            decision: ReviewDecision::parse(&decision_str)
                .ok_or_else(|| storage(format!("unknown decision {:?}", decision_str)))?,
            actor_id: row.try_get("actor_id").map_err(storage)?,
            notes: row.try_get("notes").map_err(storage)?,
            created_at: parse_time(&created_at)?,
        })
    }

    fn log_entry_from_row(row: &SqliteRow) -> Result<ModerationLogEntry, ModerationError> {
        let severity_str: String = row.try_get("severity").map_err(storage)?;
        let action_str: String = row.try_get("action").map_err(storage)?;
        let created_at: String = row.try_get("created_at").map_err(storage)?;

        Ok(ModerationLogEntry {
            id: row.try_get("id").map_err(storage)?,
            target_type: TargetType::from(row.try_get::<String, _>("target_type").map_err(storage)?),
            target_id: row.try_get("target_id").map_err(storage)?,
            report_count: row.try_get::<i64, _>("report_count").map_err(storage)? as u32,
            severity: Severity::parse(&severity_str)
                .ok_or_else(|| storage(format!("unknown severity {:?}", severity_str)))?,
            action: ModerationAction::parse(&action_str)
                .ok_or_else(|| storage(format!("unknown action {:?}", action_str)))?,
            reason: row.try_get("reason").map_err(storage)?,
            created_at: parse_time(&created_at)?,
        })
    }
}

#[async_trait]
impl ReportStore for SqliteModerationStore {
    async fn load_reports(&self) -> Result<Option<Vec<Report>>, ModerationError> {
        let rows = sqlx::query("SELECT * FROM reports ORDER BY created_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        if rows.is_empty() {
            let saved = sqlx::query("SELECT value FROM moderation_state WHERE key = ?")
                .bind(REPORTS_SAVED_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
            if saved.is_none() {
                return Ok(None);
            }
        }

        rows.iter()
            .map(Self::report_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    async fn find_report(&self, report_id: &str) -> Result<Option<Report>, ModerationError> {
        let row = sqlx::query("SELECT * FROM reports WHERE id = ?")
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        row.as_ref().map(Self::report_from_row).transpose()
    }

    async fn insert_report(&self, report: &Report) -> Result<bool, ModerationError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let review = report.review.as_ref();
        // The unique reporter/target index turns a duplicate into a no-op
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO reports (
                id, target_type, target_id, reporter_id, reason, description, status,
                created_at, resolved_at, review_decision, reviewed_by, reviewed_at, review_notes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(report.target_type.as_str())
        .bind(&report.target_id)
        .bind(&report.reporter_id)
        .bind(&report.reason)
        .bind(report.description.as_deref())
        .bind(report.status.as_str())
        .bind(fmt_time(report.created_at))
        .bind(report.resolved_at.map(fmt_time))
        .bind(review.map(|r| r.decision.as_str()))
        .bind(review.map(|r| r.reviewer_id.as_str()))
        .bind(review.map(|r| fmt_time(r.reviewed_at)))
        .bind(review.and_then(|r| r.notes.as_deref()))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        let inserted = result.rows_affected() == 1;

        sqlx::query(
            r#"
            INSERT INTO moderation_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(REPORTS_SAVED_KEY)
        .bind(fmt_time(Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(inserted)
    }

    async fn update_status(
        &self,
        report_ids: &[String],
        from: ReportStatus,
        to: ReportStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<usize, ModerationError> {
        if report_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; report_ids.len()].join(", ");
        let sql = format!(
            "UPDATE reports SET status = ?, resolved_at = ? WHERE status = ? AND id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(fmt_time(resolved_at))
            .bind(from.as_str());
        for id in report_ids {
            query = query.bind(id.as_str());
        }

        let result = query.execute(&self.pool).await.map_err(storage)?;
        Ok(result.rows_affected() as usize)
    }

    async fn record_review(
        &self,
        report_id: &str,
        from: ReportStatus,
        to: ReportStatus,
        resolved_at: Option<DateTime<Utc>>,
        review: &Review,
    ) -> Result<bool, ModerationError> {
        let result = sqlx::query(
            r#"
            UPDATE reports SET
                status = ?,
                resolved_at = COALESCE(?, resolved_at),
                review_decision = ?,
                reviewed_by = ?,
                reviewed_at = ?,
                review_notes = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(resolved_at.map(fmt_time))
        .bind(review.decision.as_str())
        .bind(&review.reviewer_id)
        .bind(fmt_time(review.reviewed_at))
        .bind(review.notes.as_deref())
        .bind(report_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, ModerationError> {
        let result = sqlx::query("DELETE FROM reports WHERE created_at <= ?")
            .bind(fmt_time(cutoff))
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() as usize)
    }

    async fn append_log_entry(&self, entry: &ModerationLogEntry) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_log (
                id, target_type, target_id, report_count, severity, action, reason, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.target_type.as_str())
        .bind(&entry.target_id)
        .bind(entry.report_count as i64)
        .bind(entry.severity.as_str())
        .bind(entry.action.as_str())
        .bind(&entry.reason)
        .bind(fmt_time(entry.created_at))
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn load_log_entries(&self) -> Result<Vec<ModerationLogEntry>, ModerationError> {
        let rows = sqlx::query("SELECT * FROM moderation_log ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        rows.iter().map(Self::log_entry_from_row).collect()
    }

    async fn append_manual_action(&self, action: &ManualAction) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO moderation_actions (id, report_id, decision, actor_id, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&action.id)
        .bind(&action.report_id)
        .bind(action.decision.as_str())
        .bind(&action.actor_id)
        .bind(action.notes.as_deref())
        .bind(fmt_time(action.created_at))
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn load_manual_actions(&self) -> Result<Vec<ManualAction>, ModerationError> {
        let rows = sqlx::query("SELECT * FROM moderation_actions ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        rows.iter().map(Self::manual_action_from_row).collect()
    }
}

/// Content tables living in the same database.
pub struct SqliteContentStore {
    pool: Pool<Sqlite>,
}

impl SqliteContentStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), ModerationError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS projects (id TEXT PRIMARY KEY)",
            "CREATE TABLE IF NOT EXISTS comments (id TEXT PRIMARY KEY)",
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                is_admin BOOLEAN NOT NULL DEFAULT 0
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn delete_project(&self, project_id: &str) -> Result<(), ModerationError> {
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<(), ModerationError> {
        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(comment_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn revoke_admin(&self, user_id: &str) -> Result<(), ModerationError> {
        sqlx::query("UPDATE profiles SET is_admin = 0 WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, ModerationError> {
        let row = sqlx::query("SELECT is_admin FROM profiles WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match row {
            Some(r) => r.try_get::<bool, _>("is_admin").map_err(storage),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{ModerationConfig, ModerationEngine};
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> Pool<Sqlite> {
        // One connection: every new connection to :memory: is a fresh database
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn stores() -> (SqliteModerationStore, SqliteContentStore, Pool<Sqlite>) {
        let pool = pool().await;
        let store = SqliteModerationStore::new(pool.clone());
        store.migrate().await.unwrap();
        let content = SqliteContentStore::new(pool.clone());
        content.migrate().await.unwrap();
        (store, content, pool)
    }

    fn report(id: &str, target_type: TargetType, target_id: &str, age: Duration) -> Report {
        Report {
            id: id.to_string(),
            target_type,
            target_id: target_id.to_string(),
            reporter_id: format!("user-{}", id),
            reason: "harassment".to_string(),
            description: None,
            status: ReportStatus::Pending,
            created_at: Utc::now() - age,
            resolved_at: None,
            review: None,
        }
    }

    #[tokio::test]
    async fn test_fresh_database_has_nothing_persisted() {
        let (store, _, _) = stores().await;

        assert!(store.load_reports().await.unwrap().is_none());

        store.delete_expired(Utc::now()).await.unwrap();
        assert!(store.load_reports().await.unwrap().is_none());

        let first = report("r1", TargetType::Comment, "c1", Duration::hours(1));
        assert!(store.insert_report(&first).await.unwrap());
        store.delete_expired(Utc::now()).await.unwrap();
        assert_eq!(store.load_reports().await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_reports_roundtrip_with_review() {
        let (store, _, _) = stores().await;

        let mut reviewed = report("r1", TargetType::Project, "p1", Duration::hours(3));
        reviewed.status = ReportStatus::ManuallyResolved;
        reviewed.resolved_at = Some(Utc::now());
        reviewed.review = Some(Review {
            decision: ReviewDecision::Keep,
            reviewer_id: "admin".to_string(),
            notes: Some("satire, not abuse".to_string()),
            reviewed_at: Utc::now(),
        });
        let plain = report("r2", TargetType::from("room"), "room-7", Duration::hours(1));

        assert!(store.insert_report(&reviewed).await.unwrap());
        assert!(store.insert_report(&plain).await.unwrap());
        let loaded = store.load_reports().await.unwrap().unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "r1");
        assert_eq!(loaded[0].status, ReportStatus::ManuallyResolved);
        let review = loaded[0].review.as_ref().unwrap();
        assert_eq!(review.decision, ReviewDecision::Keep);
        assert_eq!(review.notes.as_deref(), Some("satire, not abuse"));
        assert_eq!(loaded[1].target_type, TargetType::Other("room".to_string()));
        assert!(loaded[1].review.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_reporter_and_target_is_ignored() {
        let (store, _, _) = stores().await;

        let first = report("a", TargetType::Comment, "c1", Duration::hours(1));
        let mut again = report("b", TargetType::Comment, "c1", Duration::hours(1));
        again.reporter_id = first.reporter_id.clone();
        let mut anonymous = report("c", TargetType::Comment, "c1", Duration::hours(1));
        anonymous.reporter_id = String::new();
        let mut anonymous_too = report("d", TargetType::Comment, "c1", Duration::hours(1));
        anonymous_too.reporter_id = String::new();

        assert!(store.insert_report(&first).await.unwrap());
        assert!(!store.insert_report(&again).await.unwrap());
        assert!(store.insert_report(&anonymous).await.unwrap());
        assert!(store.insert_report(&anonymous_too).await.unwrap());

        let ids: Vec<String> = store
            .load_reports()
            .await
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn test_status_updates_are_conditional() {
        let (store, _, _) = stores().await;
        for id in ["a", "b", "c"] {
            store
                .insert_report(&report(id, TargetType::Project, "p1", Duration::hours(1)))
                .await
                .unwrap();
        }
        let review = Review {
            decision: ReviewDecision::Keep,
            reviewer_id: "admin".to_string(),
            notes: None,
            reviewed_at: Utc::now(),
        };
        assert!(store
            .record_review(
                "a",
                ReportStatus::Pending,
                ReportStatus::ManuallyResolved,
                Some(Utc::now()),
                &review,
            )
            .await
            .unwrap());

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let changed = store
            .update_status(&ids, ReportStatus::Pending, ReportStatus::AutoWarned, Utc::now())
            .await
            .unwrap();
        assert_eq!(changed, 2);

        let a = store.find_report("a").await.unwrap().unwrap();
        assert_eq!(a.status, ReportStatus::ManuallyResolved);
        assert_eq!(a.review.unwrap().decision, ReviewDecision::Keep);

        // The stale review no longer applies
        assert!(!store
            .record_review(
                "b",
                ReportStatus::Pending,
                ReportStatus::ManuallyResolved,
                Some(Utc::now()),
                &review,
            )
            .await
            .unwrap());
        let b = store.find_report("b").await.unwrap().unwrap();
        assert_eq!(b.status, ReportStatus::AutoWarned);
        assert!(store.find_report("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_boundary() {
        let (store, _, _) = stores().await;
        let now = Utc::now();
        let mut at_cutoff = report("edge", TargetType::Comment, "c1", Duration::zero());
        at_cutoff.created_at = now - Duration::days(30);
        store.insert_report(&at_cutoff).await.unwrap();
        store
            .insert_report(&report("old", TargetType::Comment, "c2", Duration::days(31)))
            .await
            .unwrap();
        store
            .insert_report(&report("fresh", TargetType::Comment, "c3", Duration::days(29)))
            .await
            .unwrap();

        let removed = store.delete_expired(now - Duration::days(30)).await.unwrap();

        assert_eq!(removed, 2);
        let left = store.load_reports().await.unwrap().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "fresh");
    }

    #[tokio::test]
    async fn test_review_without_timestamp_is_rejected() {
        let (store, _, pool) = stores().await;
        sqlx::query(
            r#"
            INSERT INTO reports (id, target_type, target_id, reporter_id, reason, status,
                                 created_at, review_decision, reviewed_by)
            VALUES ('r1', 'comment', 'c1', 'u1', 'spam', 'manually_resolved',
                    '2024-01-01T00:00:00.000000Z', 'keep', 'admin')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(matches!(
            store.find_report("r1").await,
            Err(ModerationError::StorageError(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_actions_in_order() {
        let (store, _, _) = stores().await;

        for (i, decision) in [ReviewDecision::Hold, ReviewDecision::Delete]
            .into_iter()
            .enumerate()
        {
            store
                .append_manual_action(&ManualAction {
                    id: format!("action-{}", i),
                    report_id: "r1".to_string(),
                    decision,
                    actor_id: "admin".to_string(),
                    notes: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let actions = store.load_manual_actions().await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].decision, ReviewDecision::Hold);
        assert_eq!(actions[1].decision, ReviewDecision::Delete);
    }

    #[tokio::test]
    async fn test_log_is_append_only_and_ordered() {
        let (store, _, _) = stores().await;

        for (i, action) in [ModerationAction::AutoWarning, ModerationAction::AutoDelete]
            .into_iter()
            .enumerate()
        {
            store
                .append_log_entry(&ModerationLogEntry {
                    id: format!("entry-{}", i),
                    target_type: TargetType::Project,
                    target_id: "p1".to_string(),
                    report_count: 3 + i as u32 * 2,
                    severity: Severity::High,
                    action,
                    reason: "threshold".to_string(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let log = store.load_log_entries().await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, ModerationAction::AutoWarning);
        assert_eq!(log[1].action, ModerationAction::AutoDelete);
        assert_eq!(log[1].report_count, 5);
    }

    #[tokio::test]
    async fn test_content_removal() {
        let (_, content, pool) = stores().await;
        sqlx::query("INSERT INTO projects (id) VALUES ('p1'), ('p2')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO profiles (id, is_admin) VALUES ('u1', 1)")
            .execute(&pool)
            .await
            .unwrap();

        assert!(content.is_admin("u1").await.unwrap());
        content.revoke_admin("u1").await.unwrap();
        assert!(!content.is_admin("u1").await.unwrap());
        assert!(!content.is_admin("nobody").await.unwrap());

        content.delete_project("p1").await.unwrap();
        let remaining: Vec<String> = sqlx::query("SELECT id FROM projects")
            .fetch_all(&pool)
            .await
            .unwrap()
            .iter()
            .map(|r| r.get("id"))
            .collect();
        assert_eq!(remaining, vec!["p2".to_string()]);
    }

    #[tokio::test]
    async fn test_engine_over_sqlite() {
        let (store, content, pool) = stores().await;
        sqlx::query("INSERT INTO comments (id) VALUES ('c1')")
            .execute(&pool)
            .await
            .unwrap();
        for (id, minutes) in [("1", 5), ("2", 15), ("3", 25)] {
            store
                .insert_report(&report(id, TargetType::Comment, "c1", Duration::minutes(minutes)))
                .await
                .unwrap();
        }

        let engine = ModerationEngine::new(store, content, ModerationConfig::default());
        let first = engine.process_reports(Utc::now()).await;
        let second = engine.process_reports(Utc::now()).await;

        assert_eq!(first.deleted.len(), 1);
        assert_eq!(second.skipped_unchanged.len(), 1);

        let comments: i64 = sqlx::query("SELECT COUNT(*) AS n FROM comments")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(comments, 0);

        let reports = engine.store().load_reports().await.unwrap().unwrap();
        assert!(reports.iter().all(|r| r.status == ReportStatus::AutoDeleted));
        assert_eq!(engine.store().load_log_entries().await.unwrap().len(), 1);
    }
}
