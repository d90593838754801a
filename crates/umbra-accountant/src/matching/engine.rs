//! One reconciliation run: retrieve, score, assign, commit.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::ledger::{NewLink, create_link, rejected_pairs};
use crate::matching::assign::{AssignmentPlan, assign};
use crate::matching::fx::{FxCache, FxKey, FxRateSource};
use crate::matching::policy::{MATCH_POLICY_VERSION, MatchPolicy};
use crate::matching::score::{PreparedExpense, PreparedTransaction, fx_key, score_all};
use crate::model::{Actor, LinkStatus, Period, ReconciliationLink, format_iso_date};
use crate::review::{QueueOutcome, queue_proposal};
use crate::state::map_sqlite_error;
use crate::store::accounts::user_is_known;
use crate::store::aliases::load_merchant_aliases;
use crate::store::expenses::unlinked_expenses;
use crate::store::runs::{NewRun, ReconcileLock, RunStatus, RunTotals, finish_run, insert_run};
use crate::store::transactions::unreconciled_transactions;
use crate::{ClientError, ClientResult};

pub struct ReconcileRequest<'a> {
    pub user_id: &'a str,
    pub period: Period,
    pub policy: MatchPolicy,
    /// Checked between pair evaluations and between commits.
    pub cancel: Option<&'a AtomicBool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub expenses_considered: usize,
    pub transactions_considered: usize,
    pub candidate_pairs: usize,
    pub auto_matched: usize,
    pub queued: usize,
    pub unmatched_expenses: usize,
    pub unmatched_transactions: usize,
    pub excluded_missing_fx: usize,
    pub conflicts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationRunResult {
    pub run_id: String,
    pub user_id: String,
    pub period_start: String,
    pub period_end: String,
    pub auto_match_threshold: f64,
    pub review_floor: f64,
    pub policy_version: String,
    pub status: String,
    pub cancelled: bool,
    pub counts: RunCounts,
    pub links: Vec<ReconciliationLink>,
    pub review_entry_ids: Vec<String>,
    pub finished_at: String,
}

struct Snapshot {
    expenses: Vec<PreparedExpense>,
    transactions: Vec<PreparedTransaction>,
}

impl Snapshot {
    fn load(
        connection: &Connection,
        db_path: &Path,
        user_id: &str,
        period: &Period,
        policy: &MatchPolicy,
    ) -> ClientResult<Self> {
        let aliases = load_merchant_aliases(connection, db_path)?;
        let expenses = unlinked_expenses(connection, db_path, user_id, period)?
            .into_iter()
            .map(|expense| PreparedExpense::new(expense, &aliases))
            .collect();
        let transaction_range = period.widened(policy.date_window_days);
        let transactions = unreconciled_transactions(connection, db_path, user_id, &transaction_range)?
            .into_iter()
            .map(|transaction| PreparedTransaction::new(transaction, &aliases))
            .collect();
        Ok(Self {
            expenses,
            transactions,
        })
    }

    fn fx_keys(&self, policy: &MatchPolicy) -> BTreeSet<FxKey> {
        let mut keys = BTreeSet::new();
        for expense in &self.expenses {
            for transaction in &self.transactions {
                if let Some(key) = fx_key(expense, transaction, policy) {
                    keys.insert(key);
                }
            }
        }
        keys
    }
}

struct CommitResult {
    links: Vec<ReconciliationLink>,
    review_entry_ids: Vec<String>,
    matched_expenses: BTreeSet<String>,
    matched_transactions: BTreeSet<String>,
    conflicts: usize,
    cancelled: bool,
}

/// Runs reconciliation for one user and period.
pub fn reconcile(
    connection: &mut Connection,
    db_path: &Path,
    fx_source: &dyn FxRateSource,
    request: &ReconcileRequest<'_>,
) -> ClientResult<ReconciliationRunResult> {
    request.policy.validate()?;
    let user_id = request.user_id;
    if !user_is_known(connection, db_path, user_id)? {
        return Err(ClientError::unknown_user(user_id));
    }

    // Resolve rates before taking the user lock so slow lookups do not
    // extend the exclusive section.
    let mut fx_cache = FxCache::default();
    let prefetch = Snapshot::load(connection, db_path, user_id, &request.period, &request.policy)?;
    let prefetched = fx_cache.resolve_missing(fx_source, &prefetch.fx_keys(&request.policy));
    drop(prefetch);

    let run_id = format!("run_{}", Ulid::new());
    let lock = ReconcileLock::acquire(
        connection,
        db_path,
        user_id,
        &run_id,
        request.policy.lock_stale_after_secs,
    )?;
    insert_run(
        connection,
        db_path,
        &NewRun {
            run_id: &run_id,
            user_id,
            period: &request.period,
            auto_match_threshold: request.policy.auto_match_threshold,
            review_floor: request.policy.review_floor,
            policy_version: MATCH_POLICY_VERSION,
        },
    )?;
    info!(
        user_id,
        run_id = run_id.as_str(),
        period_start = %request.period.start,
        period_end = %request.period.end,
        threshold = request.policy.auto_match_threshold,
        prefetched_fx = prefetched,
        "reconcile run started"
    );

    let outcome = run_locked(connection, db_path, fx_source, request, &run_id, &mut fx_cache);
    match outcome {
        Ok((counts, commit)) => {
            let status = if commit.cancelled {
                RunStatus::Cancelled
            } else {
                RunStatus::Completed
            };
            let finished_at = finish_run(
                connection,
                db_path,
                &run_id,
                status,
                RunTotals {
                    auto_matched: counts.auto_matched,
                    queued: counts.queued,
                    excluded_missing_fx: counts.excluded_missing_fx,
                    conflicts: counts.conflicts,
                },
            )?;
            lock.release(connection)?;
            info!(
                user_id,
                run_id = run_id.as_str(),
                status = status.as_str(),
                auto_matched = counts.auto_matched,
                queued = counts.queued,
                excluded_missing_fx = counts.excluded_missing_fx,
                conflicts = counts.conflicts,
                "reconcile run finished"
            );

            Ok(ReconciliationRunResult {
                run_id,
                user_id: user_id.to_string(),
                period_start: format_iso_date(&request.period.start),
                period_end: format_iso_date(&request.period.end),
                auto_match_threshold: request.policy.auto_match_threshold,
                review_floor: request.policy.review_floor,
                policy_version: MATCH_POLICY_VERSION.to_string(),
                status: status.as_str().to_string(),
                cancelled: commit.cancelled,
                counts,
                links: commit.links,
                review_entry_ids: commit.review_entry_ids,
                finished_at,
            })
        }
        Err(error) => {
            warn!(
                user_id,
                run_id = run_id.as_str(),
                code = error.code.as_str(),
                "reconcile run aborted"
            );
            if let Err(finish_error) = finish_run(
                connection,
                db_path,
                &run_id,
                RunStatus::Cancelled,
                RunTotals::default(),
            ) {
                warn!(
                    run_id = run_id.as_str(),
                    code = finish_error.code.as_str(),
                    "could not mark aborted run as cancelled"
                );
            }
            if let Err(release_error) = lock.release(connection) {
                warn!(
                    user_id,
                    run_id = run_id.as_str(),
                    code = release_error.code.as_str(),
                    "could not release reconcile lock after abort"
                );
            }
            Err(error)
        }
    }
}

fn run_locked(
    connection: &mut Connection,
    db_path: &Path,
    fx_source: &dyn FxRateSource,
    request: &ReconcileRequest<'_>,
    run_id: &str,
    fx_cache: &mut FxCache,
) -> ClientResult<(RunCounts, CommitResult)> {
    let user_id = request.user_id;
    let policy = &request.policy;
    let never_cancelled = AtomicBool::new(false);
    let cancel = request.cancel.unwrap_or(&never_cancelled);

    let snapshot = Snapshot::load(connection, db_path, user_id, &request.period, policy)?;
    let late_lookups = fx_cache.resolve_missing(fx_source, &snapshot.fx_keys(policy));
    if late_lookups > 0 {
        debug!(run_id, late_lookups, "resolved fx rates first seen under the lock");
    }
    let suppressed = rejected_pairs(connection, db_path, user_id)?;

    let batch = score_all(
        &snapshot.expenses,
        &snapshot.transactions,
        &suppressed,
        fx_cache,
        policy,
        cancel,
    );
    if batch.excluded_missing_fx > 0 {
        debug!(
            run_id,
            excluded = batch.excluded_missing_fx,
            "pairs excluded for missing fx rates"
        );
    }

    let candidate_pairs = batch.candidate_pairs;
    let excluded_missing_fx = batch.excluded_missing_fx;
    let commit = if batch.cancelled {
        CommitResult {
            links: Vec::new(),
            review_entry_ids: Vec::new(),
            matched_expenses: BTreeSet::new(),
            matched_transactions: BTreeSet::new(),
            conflicts: 0,
            cancelled: true,
        }
    } else {
        let plan = assign(batch.candidates, policy);
        commit_plan(connection, db_path, request, run_id, plan, cancel)?
    };

    let expenses_considered = snapshot.expenses.len();
    let transactions_considered = snapshot.transactions.len();
    let counts = RunCounts {
        expenses_considered,
        transactions_considered,
        candidate_pairs,
        auto_matched: commit.links.len(),
        queued: commit.review_entry_ids.len(),
        unmatched_expenses: expenses_considered.saturating_sub(commit.matched_expenses.len()),
        unmatched_transactions: transactions_considered
            .saturating_sub(commit.matched_transactions.len()),
        excluded_missing_fx,
        conflicts: commit.conflicts,
    };
    Ok((counts, commit))
}

fn commit_plan(
    connection: &mut Connection,
    db_path: &Path,
    request: &ReconcileRequest<'_>,
    run_id: &str,
    plan: AssignmentPlan,
    cancel: &AtomicBool,
) -> ClientResult<CommitResult> {
    let mut result = CommitResult {
        links: Vec::new(),
        review_entry_ids: Vec::new(),
        matched_expenses: BTreeSet::new(),
        matched_transactions: BTreeSet::new(),
        conflicts: 0,
        cancelled: false,
    };

    for candidate in &plan.auto_commits {
        if cancel.load(Ordering::Relaxed) {
            result.cancelled = true;
            return Ok(result);
        }
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|error| map_sqlite_error(db_path, &error))?;
        let created = create_link(
            &transaction,
            db_path,
            &NewLink {
                expense_id: &candidate.expense_id,
                transaction_id: &candidate.transaction_id,
                status: LinkStatus::AutoConfirmed,
                confidence: candidate.confidence,
                actor: &Actor::System,
                run_id: Some(run_id),
            },
        );
        match created {
            Ok(link) => {
                transaction
                    .commit()
                    .map_err(|error| map_sqlite_error(db_path, &error))?;
                result.matched_expenses.insert(link.expense_id.clone());
                result.matched_transactions.insert(link.transaction_id.clone());
                result.links.push(link);
            }
            Err(error) if error.code == "already_linked" => {
                warn!(
                    run_id,
                    expense_id = candidate.expense_id.as_str(),
                    transaction_id = candidate.transaction_id.as_str(),
                    "auto commit conflicted with an existing link"
                );
                result.conflicts += 1;
            }
            Err(error) => return Err(error),
        }
    }

    for proposal in &plan.reviews {
        if cancel.load(Ordering::Relaxed) {
            result.cancelled = true;
            return Ok(result);
        }
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|error| map_sqlite_error(db_path, &error))?;
        match queue_proposal(
            &transaction,
            db_path,
            run_id,
            request.user_id,
            &request.period,
            proposal,
        )? {
            QueueOutcome::Queued(entry_id) => {
                transaction
                    .commit()
                    .map_err(|error| map_sqlite_error(db_path, &error))?;
                if let Some(selected) = proposal.selected() {
                    result.matched_expenses.insert(selected.expense_id.clone());
                    result
                        .matched_transactions
                        .insert(selected.transaction_id.clone());
                }
                result.review_entry_ids.push(entry_id);
            }
            QueueOutcome::Conflict => {
                warn!(
                    run_id,
                    expense_id = proposal.expense_id.as_str(),
                    "review entry conflicted with a pending entry"
                );
                result.conflicts += 1;
            }
        }
    }

    Ok(result)
}
