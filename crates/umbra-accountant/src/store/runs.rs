use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::model::{Period, format_iso_date};
use crate::state::{map_sqlite_error, now_rfc3339, now_unix_secs, open_connection};
use crate::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

pub struct NewRun<'a> {
    pub run_id: &'a str,
    pub user_id: &'a str,
    pub period: &'a Period,
    pub auto_match_threshold: f64,
    pub review_floor: f64,
    pub policy_version: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub auto_matched: usize,
    pub queued: usize,
    pub excluded_missing_fx: usize,
    pub conflicts: usize,
}

pub fn insert_run(connection: &Connection, db_path: &Path, run: &NewRun<'_>) -> ClientResult<()> {
    connection
        .execute(
            "INSERT INTO internal_reconcile_runs (
                run_id,
                user_id,
                period_start,
                period_end,
                auto_match_threshold,
                review_floor,
                policy_version,
                started_at,
                finished_at,
                status
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)",
            params![
                run.run_id,
                run.user_id,
                format_iso_date(&run.period.start),
                format_iso_date(&run.period.end),
                run.auto_match_threshold,
                run.review_floor,
                run.policy_version,
                now_rfc3339(),
                RunStatus::Running.as_str()
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(())
}

pub fn finish_run(
    connection: &Connection,
    db_path: &Path,
    run_id: &str,
    status: RunStatus,
    totals: RunTotals,
) -> ClientResult<String> {
    let finished_at = now_rfc3339();
    connection
        .execute(
            "UPDATE internal_reconcile_runs
             SET status = ?2,
                 finished_at = ?3,
                 auto_matched = ?4,
                 queued = ?5,
                 excluded_missing_fx = ?6,
                 conflicts = ?7
             WHERE run_id = ?1",
            params![
                run_id,
                status.as_str(),
                &finished_at,
                to_i64(totals.auto_matched),
                to_i64(totals.queued),
                to_i64(totals.excluded_missing_fx),
                to_i64(totals.conflicts)
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(finished_at)
}

/// Per-user exclusive section for reconciliation runs.
///
/// Released explicitly with [`ReconcileLock::release`]; if dropped without
/// release, a fresh connection deletes the row on a best-effort basis.
#[derive(Debug)]
pub struct ReconcileLock {
    db_path: PathBuf,
    user_id: String,
    run_id: String,
    released: bool,
}

impl ReconcileLock {
    pub fn acquire(
        connection: &Connection,
        db_path: &Path,
        user_id: &str,
        run_id: &str,
        stale_after_secs: i64,
    ) -> ClientResult<Self> {
        let now = now_unix_secs();
        let stale_cutoff = now.saturating_sub(stale_after_secs);
        let previous = lock_holder(connection, db_path, user_id)?;

        let changed = connection
            .execute(
                "INSERT INTO internal_reconcile_locks (user_id, run_id, acquired_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id) DO UPDATE SET
                     run_id = excluded.run_id,
                     acquired_at = excluded.acquired_at
                 WHERE internal_reconcile_locks.acquired_at <= ?4",
                params![user_id, run_id, now, stale_cutoff],
            )
            .map_err(|error| map_sqlite_error(db_path, &error))?;

        if changed == 0 {
            let holder = lock_holder(connection, db_path, user_id)?
                .map(|(holder_run_id, _)| holder_run_id)
                .unwrap_or_default();
            return Err(ClientError::reconcile_in_progress(user_id, &holder));
        }

        if let Some((stale_run_id, acquired_at)) = previous
            && stale_run_id != run_id
        {
            warn!(
                user_id,
                stale_run_id = stale_run_id.as_str(),
                acquired_at,
                "taking over stale reconcile lock"
            );
            connection
                .execute(
                    "UPDATE internal_reconcile_runs
                     SET status = 'cancelled', finished_at = ?2
                     WHERE run_id = ?1 AND status = 'running'",
                    params![&stale_run_id, now_rfc3339()],
                )
                .map_err(|error| map_sqlite_error(db_path, &error))?;
        }

        debug!(user_id, run_id, "reconcile lock acquired");
        Ok(Self {
            db_path: db_path.to_path_buf(),
            user_id: user_id.to_string(),
            run_id: run_id.to_string(),
            released: false,
        })
    }

    /// On failure the guard is still armed, so `Drop` retries the delete on
    /// a fresh connection.
    pub fn release(mut self, connection: &Connection) -> ClientResult<()> {
        delete_lock(connection, &self.db_path, &self.user_id, &self.run_id)?;
        self.released = true;
        Ok(())
    }
}

impl Drop for ReconcileLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let outcome = open_connection(&self.db_path).and_then(|connection| {
            delete_lock(&connection, &self.db_path, &self.user_id, &self.run_id)
        });
        if let Err(error) = outcome {
            warn!(
                user_id = self.user_id.as_str(),
                run_id = self.run_id.as_str(),
                code = error.code.as_str(),
                "failed to release reconcile lock; it will go stale"
            );
        }
    }
}

fn lock_holder(
    connection: &Connection,
    db_path: &Path,
    user_id: &str,
) -> ClientResult<Option<(String, i64)>> {
    connection
        .query_row(
            "SELECT run_id, acquired_at FROM internal_reconcile_locks WHERE user_id = ?1",
            [user_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))
}

fn delete_lock(
    connection: &Connection,
    db_path: &Path,
    user_id: &str,
    run_id: &str,
) -> ClientResult<()> {
    connection
        .execute(
            "DELETE FROM internal_reconcile_locks WHERE user_id = ?1 AND run_id = ?2",
            params![user_id, run_id],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(())
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
