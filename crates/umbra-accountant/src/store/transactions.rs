use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use ulid::Ulid;

use crate::model::{Period, Transaction, format_iso_date};
use crate::state::{map_sqlite_error, now_rfc3339};
use crate::store::stored_date;
use crate::ClientResult;

const TRANSACTION_COLUMNS: &str = "t.transaction_id, t.account_ref, t.posted_date, t.amount,
     t.currency, t.counterparty_text, t.mcc, t.statement_id";

/// Validated statement line waiting for an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub posted_date: NaiveDate,
    pub amount: i64,
    pub currency: String,
    pub counterparty_text: String,
    pub mcc: Option<String>,
    pub external_ref: Option<String>,
}

pub struct NewStatement<'a> {
    pub user_id: &'a str,
    pub account_ref: &'a str,
    pub statement_ref: Option<&'a str>,
    pub source_kind: &'a str,
    pub source_ref: Option<&'a str>,
    pub rows_read: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementSummary {
    pub statement_id: String,
    pub account_ref: String,
    pub statement_ref: Option<String>,
    pub source_kind: String,
    pub source_ref: Option<String>,
    pub imported_at: String,
    pub voided_at: Option<String>,
    pub rows_read: i64,
    pub inserted: i64,
}

struct TransactionRow {
    transaction_id: String,
    account_ref: String,
    posted_date: String,
    amount: i64,
    currency: String,
    counterparty_text: String,
    mcc: Option<String>,
    statement_id: String,
}

impl TransactionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            transaction_id: row.get(0)?,
            account_ref: row.get(1)?,
            posted_date: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            counterparty_text: row.get(5)?,
            mcc: row.get(6)?,
            statement_id: row.get(7)?,
        })
    }

    fn into_transaction(self, db_path: &Path) -> ClientResult<Transaction> {
        Ok(Transaction {
            transaction_id: self.transaction_id,
            account_ref: self.account_ref,
            posted_date: stored_date(db_path, &self.posted_date)?,
            amount: self.amount,
            currency: self.currency,
            counterparty_text: self.counterparty_text,
            mcc: self.mcc,
            statement_id: self.statement_id,
        })
    }
}

/// Statements of the same account and `statement_ref` that are still live.
pub fn live_statements_for_ref(
    connection: &Connection,
    db_path: &Path,
    account_ref: &str,
    statement_ref: &str,
) -> ClientResult<Vec<String>> {
    let mut statement = connection
        .prepare(
            "SELECT statement_id FROM internal_statements
             WHERE account_ref = ?1 AND statement_ref = ?2 AND voided_at IS NULL
             ORDER BY imported_at ASC, statement_id ASC",
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map(params![account_ref, statement_ref], |row| {
            row.get::<_, String>(0)
        })
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row.map_err(|error| map_sqlite_error(db_path, &error))?);
    }
    Ok(ids)
}

/// Soft-voids a statement and its transactions; links are left as they are.
pub fn void_statement(
    connection: &Connection,
    db_path: &Path,
    statement_id: &str,
    voided_at: &str,
) -> ClientResult<usize> {
    connection
        .execute(
            "UPDATE internal_statements SET voided_at = ?2
             WHERE statement_id = ?1 AND voided_at IS NULL",
            params![statement_id, voided_at],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    connection
        .execute(
            "UPDATE internal_transactions SET voided_at = ?2
             WHERE statement_id = ?1 AND voided_at IS NULL",
            params![statement_id, voided_at],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))
}

pub fn is_transaction_voided(
    connection: &Connection,
    db_path: &Path,
    transaction_id: &str,
) -> ClientResult<bool> {
    connection
        .query_row(
            "SELECT voided_at IS NOT NULL FROM internal_transactions WHERE transaction_id = ?1",
            [transaction_id],
            |row| row.get::<_, bool>(0),
        )
        .optional()
        .map(|voided| voided.unwrap_or(false))
        .map_err(|error| map_sqlite_error(db_path, &error))
}

pub fn insert_statement(
    connection: &Connection,
    db_path: &Path,
    statement: &NewStatement<'_>,
    inserted: i64,
) -> ClientResult<String> {
    let statement_id = format!("stm_{}", Ulid::new());
    connection
        .execute(
            "INSERT INTO internal_statements (
                statement_id,
                user_id,
                account_ref,
                statement_ref,
                source_kind,
                source_ref,
                imported_at,
                voided_at,
                rows_read,
                inserted
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)",
            params![
                &statement_id,
                statement.user_id,
                statement.account_ref,
                statement.statement_ref,
                statement.source_kind,
                statement.source_ref,
                now_rfc3339(),
                statement.rows_read,
                inserted
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(statement_id)
}

pub fn insert_transaction(
    connection: &Connection,
    db_path: &Path,
    statement_id: &str,
    account_ref: &str,
    row: &NewTransaction,
) -> ClientResult<String> {
    let transaction_id = format!("txn_{}", Ulid::new());
    connection
        .execute(
            "INSERT INTO internal_transactions (
                transaction_id,
                statement_id,
                account_ref,
                posted_date,
                amount,
                currency,
                counterparty_text,
                mcc,
                external_ref,
                voided_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
            params![
                &transaction_id,
                statement_id,
                account_ref,
                format_iso_date(&row.posted_date),
                row.amount,
                &row.currency,
                &row.counterparty_text,
                &row.mcc,
                &row.external_ref
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    Ok(transaction_id)
}

pub fn get_transaction(
    connection: &Connection,
    db_path: &Path,
    transaction_id: &str,
) -> ClientResult<Option<Transaction>> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM internal_transactions t WHERE t.transaction_id = ?1"
    );
    let row = connection
        .query_row(&sql, [transaction_id], TransactionRow::from_row)
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    row.map(|value| value.into_transaction(db_path)).transpose()
}

/// Non-voided transactions on accounts owned by `user_id`, posted inside
/// `range`, holding neither an active link nor a pending review entry.
pub fn unreconciled_transactions(
    connection: &Connection,
    db_path: &Path,
    user_id: &str,
    range: &Period,
) -> ClientResult<Vec<Transaction>> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS}
         FROM internal_transactions t
         JOIN internal_accounts a ON a.account_ref = t.account_ref
         WHERE a.user_id = ?1
           AND t.voided_at IS NULL
           AND t.posted_date >= ?2
           AND t.posted_date <= ?3
           AND NOT EXISTS (
               SELECT 1 FROM internal_reconciliation_links l
               WHERE l.transaction_id = t.transaction_id
                 AND l.status IN ('auto_confirmed', 'manually_confirmed')
           )
           AND NOT EXISTS (
               SELECT 1 FROM internal_review_entries r
               WHERE r.transaction_id = t.transaction_id AND r.decided = 0
           )
         ORDER BY t.posted_date ASC, t.transaction_id ASC"
    );
    let mut statement = connection
        .prepare(&sql)
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map(
            params![
                user_id,
                format_iso_date(&range.start),
                format_iso_date(&range.end)
            ],
            TransactionRow::from_row,
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut transactions = Vec::new();
    for row in rows {
        let transaction_row = row.map_err(|error| map_sqlite_error(db_path, &error))?;
        transactions.push(transaction_row.into_transaction(db_path)?);
    }
    Ok(transactions)
}

pub fn list_statements(
    connection: &Connection,
    db_path: &Path,
    user_id: &str,
) -> ClientResult<Vec<StatementSummary>> {
    let mut statement = connection
        .prepare(
            "SELECT statement_id, account_ref, statement_ref, source_kind, source_ref,
                    imported_at, voided_at, rows_read, inserted
             FROM internal_statements
             WHERE user_id = ?1
             ORDER BY imported_at ASC, statement_id ASC",
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map([user_id], |row| {
            Ok(StatementSummary {
                statement_id: row.get(0)?,
                account_ref: row.get(1)?,
                statement_ref: row.get(2)?,
                source_kind: row.get(3)?,
                source_ref: row.get(4)?,
                imported_at: row.get(5)?,
                voided_at: row.get(6)?,
                rows_read: row.get(7)?,
                inserted: row.get(8)?,
            })
        })
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut statements = Vec::new();
    for row in rows {
        statements.push(row.map_err(|error| map_sqlite_error(db_path, &error))?);
    }
    Ok(statements)
}
