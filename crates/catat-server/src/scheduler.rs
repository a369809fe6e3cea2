//! Background task scheduler for store cleanup
//!
//! Periodically removes expired conversation states and old dedup rows.
//! Configured via environment variables:
//!
//! - `CATAT_CLEANUP_INTERVAL_MINUTES`: minutes between runs (default: 60, "0" disables)
//! - `CATAT_DEDUP_RETENTION_DAYS`: how long processed message ids are kept (default: 7)

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tracing::{error, info, warn};

use catat_core::{CancellationToken, Database};

/// Configuration for scheduled cleanup
#[derive(Debug, Clone)]
pub struct CleanupScheduleConfig {
    /// Interval between runs in minutes
    pub interval_minutes: u64,
    /// Age after which dedup rows are deleted
    pub dedup_retention: chrono::Duration,
}

impl Default for CleanupScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            dedup_retention: chrono::Duration::days(7),
        }
    }
}

impl CleanupScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if cleanup is disabled (CATAT_CLEANUP_INTERVAL_MINUTES=0)
    pub fn from_env() -> Option<Self> {
        let mut config = Self::default();

        if let Some(minutes) = std::env::var("CATAT_CLEANUP_INTERVAL_MINUTES")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            if minutes == 0 {
                warn!("CATAT_CLEANUP_INTERVAL_MINUTES is 0, automatic cleanup disabled");
                return None;
            }
            config.interval_minutes = minutes;
        }

        if let Some(days) = std::env::var("CATAT_DEDUP_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
        {
            config.dedup_retention = chrono::Duration::days(days.max(1));
        }

        Some(config)
    }
}

/// Rows removed by one cleanup run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired_states: usize,
    pub dedup_rows: usize,
}

/// Delete expired states and dedup rows processed before `dedup_before`
pub fn run_cleanup(
    db: &Database,
    dedup_before: DateTime<Utc>,
) -> catat_core::Result<CleanupReport> {
    let expired_states = db.cleanup_expired_states()?;
    let dedup_rows = db.cleanup_dedup(dedup_before)?;
    Ok(CleanupReport {
        expired_states,
        dedup_rows,
    })
}

/// Start the cleanup scheduler as a background task
///
/// Runs until `shutdown` is cancelled.
pub fn start_cleanup_scheduler(
    db: Database,
    config: CleanupScheduleConfig,
    shutdown: CancellationToken,
) {
    info!(
        "Starting cleanup scheduler: every {} minutes, keeping dedup rows for {} days",
        config.interval_minutes,
        config.dedup_retention.num_days()
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_minutes * 60));

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match run_cleanup(&db, Utc::now() - config.dedup_retention) {
                Ok(report) => {
                    if report.expired_states > 0 || report.dedup_rows > 0 {
                        info!(
                            expired_states = report.expired_states,
                            dedup_rows = report.dedup_rows,
                            "Scheduled cleanup completed"
                        );
                    }
                }
                Err(e) => {
                    error!("Scheduled cleanup failed: {}", e);
                }
            }
        }

        info!("Cleanup scheduler stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use catat_core::ConversationState;

    #[test]
    fn test_config_from_env() {
        std::env::remove_var("CATAT_CLEANUP_INTERVAL_MINUTES");
        let config = CleanupScheduleConfig::from_env().unwrap();
        assert_eq!(config.interval_minutes, 60);

        std::env::set_var("CATAT_CLEANUP_INTERVAL_MINUTES", "0");
        assert!(CleanupScheduleConfig::from_env().is_none());
        std::env::remove_var("CATAT_CLEANUP_INTERVAL_MINUTES");
    }

    #[test]
    fn test_run_cleanup_removes_old_rows() {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("628111").unwrap();
        db.set_state_at(
            user.id,
            &ConversationState::OnboardingSelectPlan,
            chrono::Duration::minutes(30),
            Utc::now() - chrono::Duration::hours(1),
        )
        .unwrap();
        assert!(db.mark_processed("wamid.1").unwrap());

        let report = run_cleanup(&db, Utc::now() + chrono::Duration::minutes(1)).unwrap();
        assert_eq!(
            report,
            CleanupReport {
                expired_states: 1,
                dedup_rows: 1
            }
        );

        // Nothing left to remove
        let report = run_cleanup(&db, Utc::now() + chrono::Duration::minutes(1)).unwrap();
        assert_eq!(report, CleanupReport::default());
    }
}
