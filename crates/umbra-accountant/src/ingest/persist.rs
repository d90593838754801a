use std::path::Path;

use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::ClientResult;
use crate::model::Expense;
use crate::review::supersede_entries_for_statement;
use crate::state::{map_sqlite_error, now_rfc3339};
use crate::store::accounts::ensure_account_owner;
use crate::store::expenses::{NewExpense, insert_expense};
use crate::store::transactions::{
    NewStatement, NewTransaction, insert_statement, insert_transaction, live_statements_for_ref,
    void_statement,
};

pub(crate) struct StatementBatch<'a> {
    pub(crate) statement: NewStatement<'a>,
    pub(crate) rows: &'a [NewTransaction],
}

#[derive(Debug, Clone)]
pub(crate) struct PersistedStatement {
    pub(crate) statement_id: String,
    pub(crate) inserted: i64,
    pub(crate) voided_statement_ids: Vec<String>,
    pub(crate) voided_transactions: i64,
    pub(crate) superseded_review_entries: i64,
}

/// Writes one statement and its lines atomically. A live statement with the
/// same account and `statement_ref` is voided first, and pending review
/// entries proposing its lines are superseded.
pub(crate) fn persist_statement(
    connection: &mut Connection,
    db_path: &Path,
    batch: StatementBatch<'_>,
) -> ClientResult<PersistedStatement> {
    let statement = &batch.statement;
    let transaction = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    ensure_account_owner(&transaction, db_path, statement.account_ref, statement.user_id)?;

    let mut voided_statement_ids = Vec::new();
    let mut voided_transactions = 0_usize;
    let mut superseded_review_entries = 0_usize;
    if let Some(statement_ref) = statement.statement_ref {
        let voided_at = now_rfc3339();
        for previous in
            live_statements_for_ref(&transaction, db_path, statement.account_ref, statement_ref)?
        {
            voided_transactions += void_statement(&transaction, db_path, &previous, &voided_at)?;
            superseded_review_entries +=
                supersede_entries_for_statement(&transaction, db_path, &previous, &voided_at)?;
            voided_statement_ids.push(previous);
        }
    }

    let inserted = i64::try_from(batch.rows.len()).unwrap_or(i64::MAX);
    let statement_id = insert_statement(&transaction, db_path, statement, inserted)?;
    for row in batch.rows {
        insert_transaction(&transaction, db_path, &statement_id, statement.account_ref, row)?;
    }

    transaction
        .commit()
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    info!(
        statement_id = statement_id.as_str(),
        user_id = statement.user_id,
        account_ref = statement.account_ref,
        inserted,
        voided_statements = voided_statement_ids.len(),
        voided_transactions,
        superseded_review_entries,
        "statement imported"
    );

    Ok(PersistedStatement {
        statement_id,
        inserted,
        voided_statement_ids,
        voided_transactions: i64::try_from(voided_transactions).unwrap_or(i64::MAX),
        superseded_review_entries: i64::try_from(superseded_review_entries).unwrap_or(i64::MAX),
    })
}

/// Inserts every expense or none.
pub(crate) fn persist_expenses(
    connection: &mut Connection,
    db_path: &Path,
    rows: &[NewExpense],
) -> ClientResult<Vec<Expense>> {
    let transaction = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut expenses = Vec::with_capacity(rows.len());
    for row in rows {
        expenses.push(insert_expense(&transaction, db_path, row)?);
    }

    transaction
        .commit()
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    info!(inserted = expenses.len(), "expenses recorded");
    Ok(expenses)
}
