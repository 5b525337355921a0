// This is the entry point of the auto-moderation daemon.
//
// **Architecture Overview:**
// - `core/` = Business logic (storage-agnostic)
// - `infra/` = Implementations of core traits (SQLite, JSON file, memory)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize stores and services (dependency injection)
// 3. Run one moderation pass, or start the scheduler and wait for Ctrl-C

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::{
    AutoModerator, ContentStore, ModerationConfig, ModerationEngine, ReportService, ReportStatus,
    ReportStore, Thresholds,
};
use crate::infra::moderation::{
    InMemoryContentStore, InMemoryModerationStore, JsonModerationStore, SqliteContentStore,
    SqliteModerationStore,
};
use anyhow::Context;
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::Arc;

/// Read an env var, falling back to `default` when it is unset or unparseable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparseable {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn config_from_env() -> ModerationConfig {
    let defaults = ModerationConfig::default();
    let delete = &defaults.auto_delete_thresholds;
    let warn = &defaults.auto_warning_thresholds;

    ModerationConfig {
        auto_delete_thresholds: Thresholds {
            project: env_or("AUTO_DELETE_THRESHOLD_PROJECT", delete.project),
            comment: env_or("AUTO_DELETE_THRESHOLD_COMMENT", delete.comment),
            user: env_or("AUTO_DELETE_THRESHOLD_USER", delete.user),
        },
        auto_warning_thresholds: Thresholds {
            project: env_or("AUTO_WARNING_THRESHOLD_PROJECT", warn.project),
            comment: env_or("AUTO_WARNING_THRESHOLD_COMMENT", warn.comment),
            user: env_or("AUTO_WARNING_THRESHOLD_USER", warn.user),
        },
        report_expiry_days: env_or("REPORT_EXPIRY_DAYS", defaults.report_expiry_days),
        auto_process_interval_minutes: env_or(
            "AUTO_PROCESS_INTERVAL_MINUTES",
            defaults.auto_process_interval_minutes,
        ),
        skip_unchanged_targets: env_or("MODERATION_SKIP_UNCHANGED", defaults.skip_unchanged_targets),
        count_resolved_reports: env_or("MODERATION_COUNT_RESOLVED", defaults.count_resolved_reports),
    }
}

/// Wire the engine and report service over one report store, then run.
async fn run<S, C>(
    store: Arc<S>,
    content: Arc<C>,
    config: ModerationConfig,
    run_once: bool,
) -> anyhow::Result<()>
where
    S: ReportStore + 'static,
    C: ContentStore + 'static,
{
    // Both services share the same stores
    let reports = ReportService::new(Arc::clone(&store), Arc::clone(&content));
    let engine = Arc::new(ModerationEngine::new(store, content, config));

    let pending = reports
        .list_reports(Some(ReportStatus::Pending))
        .await
        .context("Failed to read reports at startup")?;
    tracing::info!(pending = pending.len(), "Moderation store ready");

    if run_once {
        let summary = engine.process_reports(Utc::now()).await;
        tracing::info!(
            groups = summary.groups_evaluated,
            deleted = summary.deleted.len(),
            warned = summary.warned.len(),
            skipped = summary.skipped_unchanged.len(),
            expired = summary.expired_removed,
            "Single moderation pass finished"
        );
        return Ok(());
    }

    let handle = AutoModerator::new(Arc::clone(&engine)).start();
    println!("🚀 Auto-moderation is running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutdown requested");
    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = config_from_env();
    config.validate().context("Invalid moderation configuration")?;

    let store_kind = std::env::var("MODERATION_STORE").unwrap_or_else(|_| "sqlite".to_string());
    let run_once = env_or("MODERATION_RUN_ONCE", false);

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    let data_dir = std::env::var("MODERATION_DATA_DIR").unwrap_or_else(|_| "data".to_string());

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Content lives in SQLite unless everything is in memory; reports and the
    // logs follow MODERATION_STORE.

    match store_kind.trim().to_ascii_lowercase().as_str() {
        "memory" => {
            tracing::warn!("Using in-memory stores, nothing survives a restart");
            let store = Arc::new(InMemoryModerationStore::new());
            let content = Arc::new(InMemoryContentStore::new());
            run(store, content, config, run_once).await
        }
        "json" => {
            let (pool, _) = open_database(&data_dir).await?;
            let content = Arc::new(migrated_content(pool).await?);
            let path = format!("{}/moderation.json", data_dir);
            tracing::info!(path = %path, "Using JSON report store");
            let store = Arc::new(JsonModerationStore::new(path));
            run(store, content, config, run_once).await
        }
        "sqlite" => {
            let (pool, db_path) = open_database(&data_dir).await?;
            let content = Arc::new(migrated_content(pool.clone()).await?);
            tracing::info!(path = %db_path, "Using SQLite report store");
            let store = SqliteModerationStore::new(pool);
            store
                .migrate()
                .await
                .context("Failed to migrate moderation tables")?;
            run(Arc::new(store), content, config, run_once).await
        }
        other => anyhow::bail!(
            "Unknown MODERATION_STORE {:?} (expected sqlite, json or memory)",
            other
        ),
    }
}

/// Open (creating if needed) `<data_dir>/moderation.db`.
async fn open_database(data_dir: &str) -> anyhow::Result<(Pool<Sqlite>, String)> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir))?;
    let db_path = format!("{}/moderation.db", data_dir);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", db_path))
        .await
        .with_context(|| format!("Failed to connect to {}", db_path))?;
    Ok((pool, db_path))
}

async fn migrated_content(pool: Pool<Sqlite>) -> anyhow::Result<SqliteContentStore> {
    let content = SqliteContentStore::new(pool);
    content
        .migrate()
        .await
        .context("Failed to migrate content tables")?;
    Ok(content)
}
