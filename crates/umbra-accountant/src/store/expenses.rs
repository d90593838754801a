use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use ulid::Ulid;

use crate::model::{Direction, Expense, ExpenseSource, Period, format_iso_date};
use crate::state::{map_sqlite_error, now_rfc3339};
use crate::store::stored_date;
use crate::{ClientError, ClientResult};

const EXPENSE_COLUMNS: &str = "e.expense_id, e.user_id, e.date_local, e.amount_cents, e.direction,
     e.currency, e.merchant_text, e.category_code, e.source, e.vat_breakdown_json";

/// Validated expense waiting for an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub user_id: String,
    pub date_local: chrono::NaiveDate,
    pub amount_cents: u64,
    pub direction: Direction,
    pub currency: String,
    pub merchant_text: String,
    pub category_code: Option<String>,
    pub source: ExpenseSource,
    pub vat_breakdown: Option<Value>,
}

/// Raw column values; converted to [`Expense`] outside the row closure so
/// parse failures map to ledger errors.
struct ExpenseRow {
    expense_id: String,
    user_id: String,
    date_local: String,
    amount_cents: i64,
    direction: String,
    currency: String,
    merchant_text: String,
    category_code: Option<String>,
    source: String,
    vat_breakdown_json: Option<String>,
}

impl ExpenseRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            expense_id: row.get(0)?,
            user_id: row.get(1)?,
            date_local: row.get(2)?,
            amount_cents: row.get(3)?,
            direction: row.get(4)?,
            currency: row.get(5)?,
            merchant_text: row.get(6)?,
            category_code: row.get(7)?,
            source: row.get(8)?,
            vat_breakdown_json: row.get(9)?,
        })
    }

    fn into_expense(self, db_path: &Path) -> ClientResult<Expense> {
        let corrupt = || ClientError::ledger_corrupt(db_path);
        let vat_breakdown = match self.vat_breakdown_json {
            Some(raw) => Some(serde_json::from_str::<Value>(&raw).map_err(|_| corrupt())?),
            None => None,
        };
        Ok(Expense {
            expense_id: self.expense_id,
            user_id: self.user_id,
            date_local: stored_date(db_path, &self.date_local)?,
            amount_cents: u64::try_from(self.amount_cents).map_err(|_| corrupt())?,
            direction: Direction::parse(&self.direction).ok_or_else(corrupt)?,
            currency: self.currency,
            merchant_text: self.merchant_text,
            category_code: self.category_code,
            source: ExpenseSource::parse(&self.source).ok_or_else(corrupt)?,
            vat_breakdown,
        })
    }
}

pub fn insert_expense(
    connection: &Connection,
    db_path: &Path,
    expense: &NewExpense,
) -> ClientResult<Expense> {
    let expense_id = format!("exp_{}", Ulid::new());
    let amount_cents = i64::try_from(expense.amount_cents).map_err(|_| {
        ClientError::invalid_argument("Expense amount exceeds the supported range.")
    })?;
    let vat_breakdown_json = match &expense.vat_breakdown {
        Some(value) => Some(
            serde_json::to_string(value)
                .map_err(|error| ClientError::internal_serialization(&error.to_string()))?,
        ),
        None => None,
    };

    connection
        .execute(
            "INSERT INTO internal_expenses (
                expense_id,
                user_id,
                date_local,
                amount_cents,
                direction,
                currency,
                merchant_text,
                category_code,
                source,
                vat_breakdown_json,
                created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &expense_id,
                &expense.user_id,
                format_iso_date(&expense.date_local),
                amount_cents,
                expense.direction.as_str(),
                &expense.currency,
                &expense.merchant_text,
                &expense.category_code,
                expense.source.as_str(),
                vat_breakdown_json,
                now_rfc3339()
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    Ok(Expense {
        expense_id,
        user_id: expense.user_id.clone(),
        date_local: expense.date_local,
        amount_cents: expense.amount_cents,
        direction: expense.direction,
        currency: expense.currency.clone(),
        merchant_text: expense.merchant_text.clone(),
        category_code: expense.category_code.clone(),
        source: expense.source,
        vat_breakdown: expense.vat_breakdown.clone(),
    })
}

pub fn get_expense(
    connection: &Connection,
    db_path: &Path,
    expense_id: &str,
) -> ClientResult<Option<Expense>> {
    let sql = format!("SELECT {EXPENSE_COLUMNS} FROM internal_expenses e WHERE e.expense_id = ?1");
    let row = connection
        .query_row(&sql, [expense_id], ExpenseRow::from_row)
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    row.map(|value| value.into_expense(db_path)).transpose()
}

/// Expenses of `user_id` dated inside `period` that hold neither an active
/// link nor a pending review entry.
pub fn unlinked_expenses(
    connection: &Connection,
    db_path: &Path,
    user_id: &str,
    period: &Period,
) -> ClientResult<Vec<Expense>> {
    let sql = format!(
        "SELECT {EXPENSE_COLUMNS}
         FROM internal_expenses e
         WHERE e.user_id = ?1
           AND e.date_local >= ?2
           AND e.date_local <= ?3
           AND NOT EXISTS (
               SELECT 1 FROM internal_reconciliation_links l
               WHERE l.expense_id = e.expense_id
                 AND l.status IN ('auto_confirmed', 'manually_confirmed')
           )
           AND NOT EXISTS (
               SELECT 1 FROM internal_review_entries r
               WHERE r.expense_id = e.expense_id AND r.decided = 0
           )
         ORDER BY e.date_local ASC, e.expense_id ASC"
    );
    query_expenses(
        connection,
        db_path,
        &sql,
        params![
            user_id,
            format_iso_date(&period.start),
            format_iso_date(&period.end)
        ],
    )
}

/// Expense plus the id of its active link, for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseWithLink {
    pub expense: Expense,
    pub active_link_id: Option<String>,
}

pub fn list_expenses(
    connection: &Connection,
    db_path: &Path,
    user_id: &str,
    from: Option<chrono::NaiveDate>,
    to: Option<chrono::NaiveDate>,
) -> ClientResult<Vec<ExpenseWithLink>> {
    let sql = format!(
        "SELECT {EXPENSE_COLUMNS}, (
             SELECT l.link_id FROM internal_reconciliation_links l
             WHERE l.expense_id = e.expense_id
               AND l.status IN ('auto_confirmed', 'manually_confirmed')
             LIMIT 1
         )
         FROM internal_expenses e
         WHERE e.user_id = ?1
           AND (?2 IS NULL OR e.date_local >= ?2)
           AND (?3 IS NULL OR e.date_local <= ?3)
         ORDER BY e.date_local ASC, e.expense_id ASC"
    );
    let mut statement = connection
        .prepare(&sql)
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map(
            params![
                user_id,
                from.as_ref().map(format_iso_date),
                to.as_ref().map(format_iso_date)
            ],
            |row| Ok((ExpenseRow::from_row(row)?, row.get::<_, Option<String>>(10)?)),
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut expenses = Vec::new();
    for row in rows {
        let (expense_row, active_link_id) =
            row.map_err(|error| map_sqlite_error(db_path, &error))?;
        expenses.push(ExpenseWithLink {
            expense: expense_row.into_expense(db_path)?,
            active_link_id,
        });
    }
    Ok(expenses)
}

fn query_expenses(
    connection: &Connection,
    db_path: &Path,
    sql: &str,
    params: impl rusqlite::Params,
) -> ClientResult<Vec<Expense>> {
    let mut statement = connection
        .prepare(sql)
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map(params, ExpenseRow::from_row)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut expenses = Vec::new();
    for row in rows {
        let expense_row = row.map_err(|error| map_sqlite_error(db_path, &error))?;
        expenses.push(expense_row.into_expense(db_path)?);
    }
    Ok(expenses)
}
