//! Review queue: mid-confidence pairs waiting for a human decision.
//!
//! Entries are never deleted. A decision flips `decided` and records who made
//! it; a confirmation links the chosen pair, a rejection writes one `rejected`
//! ledger row per candidate so the pairs are not proposed again.

use std::path::Path;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use ulid::Ulid;

use crate::ledger::{NewLink, create_link, get_link_for_expense, get_link_for_transaction};
use crate::matching::assign::ReviewProposal;
use crate::matching::score::{MatchCandidate, MatchReason};
use crate::model::{Actor, LinkStatus, Period, ReconciliationLink, format_iso_date};
use crate::state::{is_constraint_violation, map_sqlite_error, now_rfc3339};
use crate::store::stored_date;
use crate::store::transactions::is_transaction_voided;
use crate::{ClientError, ClientResult};

const ENTRY_COLUMNS: &str = "entry_id, run_id, user_id, period_start, period_end, expense_id,
     transaction_id, best_confidence, created_at, decided, decision, decided_at, decided_by,
     link_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Confirmed,
    Rejected,
    /// Closed by the system because a candidate line was voided.
    Superseded,
}

impl ReviewDecision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Superseded => "superseded",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "confirmed" => Some(Self::Confirmed),
            "rejected" => Some(Self::Rejected),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }
}

/// What the reviewer asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    /// Link the top candidate, or the candidate for the given transaction.
    Confirm { transaction_id: Option<String> },
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewEntry {
    pub entry_id: String,
    pub run_id: String,
    pub user_id: String,
    pub period: Period,
    pub expense_id: String,
    pub transaction_id: String,
    pub best_confidence: f64,
    pub created_at: String,
    pub decided: bool,
    pub decision: Option<ReviewDecision>,
    pub decided_at: Option<String>,
    pub decided_by: Option<Actor>,
    pub link_id: Option<String>,
    pub candidates: Vec<MatchCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionOutcome {
    pub entry: ReviewEntry,
    /// The `manually_confirmed` link on confirm; `None` on reject.
    pub link: Option<ReconciliationLink>,
    pub rejected_links: Vec<ReconciliationLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    Queued(String),
    /// One side is already held by another pending entry.
    Conflict,
}

/// Stores a review proposal. Call inside a transaction so a conflict leaves
/// no partial rows behind.
pub fn queue_proposal(
    connection: &Connection,
    db_path: &Path,
    run_id: &str,
    user_id: &str,
    period: &Period,
    proposal: &ReviewProposal,
) -> ClientResult<QueueOutcome> {
    let Some(selected) = proposal.selected() else {
        return Ok(QueueOutcome::Conflict);
    };
    let entry_id = format!("rev_{}", Ulid::new());

    let inserted = connection.execute(
        "INSERT INTO internal_review_entries (
            entry_id,
            run_id,
            user_id,
            period_start,
            period_end,
            expense_id,
            transaction_id,
            best_confidence,
            created_at,
            decided
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
        params![
            &entry_id,
            run_id,
            user_id,
            format_iso_date(&period.start),
            format_iso_date(&period.end),
            &selected.expense_id,
            &selected.transaction_id,
            selected.confidence,
            now_rfc3339()
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(error) if is_constraint_violation(&error) => return Ok(QueueOutcome::Conflict),
        Err(error) => return Err(map_sqlite_error(db_path, &error)),
    }

    for (rank, candidate) in proposal.candidates.iter().enumerate() {
        insert_candidate(connection, db_path, &entry_id, rank, candidate)?;
    }

    Ok(QueueOutcome::Queued(entry_id))
}

/// Closes undecided entries with a candidate line from `statement_id`, which
/// must already be voided. Runs inside the caller's import transaction.
pub fn supersede_entries_for_statement(
    connection: &Connection,
    db_path: &Path,
    statement_id: &str,
    decided_at: &str,
) -> ClientResult<usize> {
    connection
        .execute(
            "UPDATE internal_review_entries
             SET decided = 1, decision = ?3, decided_at = ?2, decided_by = ?4
             WHERE decided = 0
               AND entry_id IN (
                   SELECT c.entry_id
                   FROM internal_review_candidates c
                   JOIN internal_transactions t ON t.transaction_id = c.transaction_id
                   WHERE t.statement_id = ?1
               )",
            params![
                statement_id,
                decided_at,
                ReviewDecision::Superseded.as_str(),
                Actor::System.as_str()
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))
}

/// Undecided entries of `user_id`, best confidence first.
pub fn list_pending(
    connection: &Connection,
    db_path: &Path,
    user_id: &str,
) -> ClientResult<Vec<ReviewEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM internal_review_entries
         WHERE user_id = ?1 AND decided = 0
         ORDER BY best_confidence DESC, entry_id ASC"
    );
    let mut statement = connection
        .prepare(&sql)
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map([user_id], EntryRow::from_row)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut entry_rows = Vec::new();
    for row in rows {
        entry_rows.push(row.map_err(|error| map_sqlite_error(db_path, &error))?);
    }

    let mut entries = Vec::with_capacity(entry_rows.len());
    for entry_row in entry_rows {
        let candidates = load_candidates(connection, db_path, &entry_row.entry_id)?;
        entries.push(entry_row.into_entry(db_path, candidates)?);
    }
    Ok(entries)
}

pub fn get_entry(
    connection: &Connection,
    db_path: &Path,
    entry_id: &str,
) -> ClientResult<Option<ReviewEntry>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM internal_review_entries WHERE entry_id = ?1");
    let row = connection
        .query_row(&sql, [entry_id], EntryRow::from_row)
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let Some(entry_row) = row else {
        return Ok(None);
    };
    let candidates = load_candidates(connection, db_path, entry_id)?;
    entry_row.into_entry(db_path, candidates).map(Some)
}

/// Applies a reviewer decision atomically.
///
/// A `ConflictingLink` rolls back and leaves the entry pending.
pub fn decide(
    connection: &mut Connection,
    db_path: &Path,
    entry_id: &str,
    action: &ReviewAction,
    actor: &Actor,
) -> ClientResult<DecisionOutcome> {
    let transaction = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let entry = get_entry(&transaction, db_path, entry_id)?
        .ok_or_else(|| ClientError::review_entry_not_found(entry_id))?;
    if entry.decided {
        return Err(ClientError::already_decided(entry_id));
    }

    let (decision, link, rejected_links) = match action {
        ReviewAction::Confirm { transaction_id } => {
            let chosen = match transaction_id {
                Some(wanted) => entry
                    .candidates
                    .iter()
                    .find(|candidate| &candidate.transaction_id == wanted)
                    .ok_or_else(|| ClientError::candidate_not_found(entry_id, wanted))?,
                None => entry
                    .candidates
                    .first()
                    .ok_or_else(|| ClientError::ledger_corrupt(db_path))?,
            };

            if is_transaction_voided(&transaction, db_path, &chosen.transaction_id)? {
                return Err(ClientError::transaction_voided(entry_id, &chosen.transaction_id));
            }
            if get_link_for_expense(&transaction, db_path, &chosen.expense_id)?.is_some()
                || get_link_for_transaction(&transaction, db_path, &chosen.transaction_id)?
                    .is_some()
            {
                return Err(ClientError::conflicting_link(
                    entry_id,
                    &chosen.expense_id,
                    &chosen.transaction_id,
                ));
            }

            let link = create_link(
                &transaction,
                db_path,
                &NewLink {
                    expense_id: &chosen.expense_id,
                    transaction_id: &chosen.transaction_id,
                    status: LinkStatus::ManuallyConfirmed,
                    confidence: chosen.confidence,
                    actor,
                    run_id: Some(entry_id),
                },
            )
            .map_err(|error| {
                if error.code == "already_linked" {
                    ClientError::conflicting_link(
                        entry_id,
                        &chosen.expense_id,
                        &chosen.transaction_id,
                    )
                } else {
                    error
                }
            })?;
            (ReviewDecision::Confirmed, Some(link), Vec::new())
        }
        ReviewAction::Reject => {
            let mut rejected = Vec::with_capacity(entry.candidates.len());
            for candidate in &entry.candidates {
                rejected.push(create_link(
                    &transaction,
                    db_path,
                    &NewLink {
                        expense_id: &candidate.expense_id,
                        transaction_id: &candidate.transaction_id,
                        status: LinkStatus::Rejected,
                        confidence: candidate.confidence,
                        actor,
                        run_id: Some(entry_id),
                    },
                )?);
            }
            (ReviewDecision::Rejected, None, rejected)
        }
    };

    let decided_at = now_rfc3339();
    let changed = transaction
        .execute(
            "UPDATE internal_review_entries
             SET decided = 1, decision = ?2, decided_at = ?3, decided_by = ?4, link_id = ?5
             WHERE entry_id = ?1 AND decided = 0",
            params![
                entry_id,
                decision.as_str(),
                &decided_at,
                actor.as_str(),
                link.as_ref().map(|value| value.link_id.as_str())
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    if changed == 0 {
        return Err(ClientError::already_decided(entry_id));
    }

    transaction
        .commit()
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    info!(
        entry_id,
        decision = decision.as_str(),
        actor = actor.as_str(),
        "review entry decided"
    );

    let entry = ReviewEntry {
        decided: true,
        decision: Some(decision),
        decided_at: Some(decided_at),
        decided_by: Some(actor.clone()),
        link_id: link.as_ref().map(|value| value.link_id.clone()),
        ..entry
    };
    Ok(DecisionOutcome {
        entry,
        link,
        rejected_links,
    })
}

fn insert_candidate(
    connection: &Connection,
    db_path: &Path,
    entry_id: &str,
    rank: usize,
    candidate: &MatchCandidate,
) -> ClientResult<()> {
    let reasons_json = serde_json::to_string(&candidate.reasons)
        .map_err(|error| ClientError::internal_serialization(&error.to_string()))?;
    connection
        .execute(
            "INSERT INTO internal_review_candidates (
                entry_id,
                rank,
                expense_id,
                transaction_id,
                confidence,
                amount_score,
                date_score,
                text_score,
                date_delta_days,
                converted_amount,
                fx_rate,
                reasons_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry_id,
                i64::try_from(rank).unwrap_or(i64::MAX),
                &candidate.expense_id,
                &candidate.transaction_id,
                candidate.confidence,
                candidate.amount_score,
                candidate.date_score,
                candidate.text_score,
                candidate.date_delta_days,
                candidate.converted_amount,
                candidate.fx_rate.map(|rate| rate.to_string()),
                reasons_json
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(())
}

fn load_candidates(
    connection: &Connection,
    db_path: &Path,
    entry_id: &str,
) -> ClientResult<Vec<MatchCandidate>> {
    let mut statement = connection
        .prepare(
            "SELECT expense_id, transaction_id, confidence, amount_score, date_score, text_score,
                    date_delta_days, converted_amount, fx_rate, reasons_json
             FROM internal_review_candidates
             WHERE entry_id = ?1
             ORDER BY rank ASC",
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map([entry_id], |row| {
            Ok((
                MatchCandidate {
                    expense_id: row.get(0)?,
                    transaction_id: row.get(1)?,
                    confidence: row.get(2)?,
                    amount_score: row.get(3)?,
                    date_score: row.get(4)?,
                    text_score: row.get(5)?,
                    date_delta_days: row.get(6)?,
                    converted_amount: row.get(7)?,
                    fx_rate: None,
                    reasons: Vec::new(),
                },
                row.get::<_, Option<String>>(8)?,
                row.get::<_, String>(9)?,
            ))
        })
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut candidates = Vec::new();
    for row in rows {
        let (mut candidate, fx_rate, reasons_json) =
            row.map_err(|error| map_sqlite_error(db_path, &error))?;
        candidate.fx_rate = fx_rate
            .map(|value| Decimal::from_str(&value))
            .transpose()
            .map_err(|_| ClientError::ledger_corrupt(db_path))?;
        candidate.reasons = serde_json::from_str::<Vec<MatchReason>>(&reasons_json)
            .map_err(|_| ClientError::ledger_corrupt(db_path))?;
        candidates.push(candidate);
    }
    Ok(candidates)
}

struct EntryRow {
    entry_id: String,
    run_id: String,
    user_id: String,
    period_start: String,
    period_end: String,
    expense_id: String,
    transaction_id: String,
    best_confidence: f64,
    created_at: String,
    decided: bool,
    decision: Option<String>,
    decided_at: Option<String>,
    decided_by: Option<String>,
    link_id: Option<String>,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entry_id: row.get(0)?,
            run_id: row.get(1)?,
            user_id: row.get(2)?,
            period_start: row.get(3)?,
            period_end: row.get(4)?,
            expense_id: row.get(5)?,
            transaction_id: row.get(6)?,
            best_confidence: row.get(7)?,
            created_at: row.get(8)?,
            decided: row.get(9)?,
            decision: row.get(10)?,
            decided_at: row.get(11)?,
            decided_by: row.get(12)?,
            link_id: row.get(13)?,
        })
    }

    fn into_entry(
        self,
        db_path: &Path,
        candidates: Vec<MatchCandidate>,
    ) -> ClientResult<ReviewEntry> {
        let decision = match self.decision {
            Some(value) => Some(
                ReviewDecision::parse(&value).ok_or_else(|| ClientError::ledger_corrupt(db_path))?,
            ),
            None => None,
        };
        Ok(ReviewEntry {
            entry_id: self.entry_id,
            run_id: self.run_id,
            user_id: self.user_id,
            period: Period {
                start: stored_date(db_path, &self.period_start)?,
                end: stored_date(db_path, &self.period_end)?,
            },
            expense_id: self.expense_id,
            transaction_id: self.transaction_id,
            best_confidence: self.best_confidence,
            created_at: self.created_at,
            decided: self.decided,
            decision,
            decided_at: self.decided_at,
            decided_by: self.decided_by.as_deref().map(Actor::from_stored),
            link_id: self.link_id,
            candidates,
        })
    }
}
