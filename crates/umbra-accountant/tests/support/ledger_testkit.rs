use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde_json::Value;
use tempfile::{Builder, TempDir};
use umbra_accountant::commands::expense::{self, ExpenseAddOptions};
use umbra_accountant::commands::fx::{self, FxSetOptions};
use umbra_accountant::commands::link::{self, LinkListOptions, LinkReleaseOptions};
use umbra_accountant::commands::reconcile::{self, ReconcileOptions};
use umbra_accountant::commands::review::{self, ReviewDecideOptions, ReviewListOptions};
use umbra_accountant::commands::statement::{self, StatementImportOptions};
use umbra_accountant::{ClientResult, SuccessEnvelope};

pub const USER: &str = "u_anna";
pub const ACCOUNT: &str = "ch93-0076-2011-6238-5295-7";

pub fn temp_home(prefix: &str) -> std::io::Result<(TempDir, PathBuf)> {
    let dir = Builder::new().prefix(prefix).tempdir()?;
    let home = dir.path().join("ledger-home");
    Ok((dir, home))
}

pub fn db_path(home: &Path) -> PathBuf {
    home.join("ledger.db")
}

pub fn payload(result: ClientResult<SuccessEnvelope>) -> Value {
    assert!(result.is_ok(), "command failed: {:?}", result.as_ref().err());
    result
        .ok()
        .and_then(|envelope| serde_json::to_value(envelope).ok())
        .unwrap_or(Value::Null)
}

pub fn error_code(result: ClientResult<SuccessEnvelope>) -> String {
    assert!(result.is_err());
    result.err().map(|error| error.code).unwrap_or_default()
}

pub fn import_statement_result(
    home: &Path,
    user_id: &str,
    account_ref: &str,
    statement_ref: Option<&str>,
    body: &str,
) -> ClientResult<SuccessEnvelope> {
    statement::import_with_options(StatementImportOptions {
        path: Some("-".to_string()),
        user_id: user_id.to_string(),
        account_ref: account_ref.to_string(),
        statement_ref: statement_ref.map(str::to_string),
        home_override: Some(home),
        stdin_override: Some(body.to_string()),
    })
}

/// Imports one statement line per `(date, amount, counterparty)`, CHF.
pub fn import_lines(home: &Path, lines: &[(&str, &str, &str)]) -> Value {
    let rows = lines
        .iter()
        .map(|(date, amount, counterparty)| {
            serde_json::json!({
                "posted_date": date,
                "amount": amount,
                "currency": "CHF",
                "counterparty_text": counterparty,
            })
        })
        .collect::<Vec<Value>>();
    payload(import_statement_result(
        home,
        USER,
        ACCOUNT,
        None,
        &Value::Array(rows).to_string(),
    ))
}

pub fn add_expense_result(
    home: &Path,
    date: &str,
    amount: &str,
    currency: &str,
    merchant: &str,
) -> ClientResult<SuccessEnvelope> {
    expense::add_with_options(ExpenseAddOptions {
        user_id: USER.to_string(),
        date: date.to_string(),
        amount: amount.to_string(),
        currency: currency.to_string(),
        merchant: merchant.to_string(),
        home_override: Some(home),
        ..ExpenseAddOptions::default()
    })
}

/// Records a debit expense and returns its id.
pub fn add_expense(home: &Path, date: &str, amount: &str, currency: &str, merchant: &str) -> String {
    let value = payload(add_expense_result(home, date, amount, currency, merchant));
    string_at(&value, &["data", "expense", "expense_id"])
}

pub fn set_fx(home: &Path, base: &str, quote: &str, as_of: &str, rate: &str) {
    let result = fx::set_with_options(FxSetOptions {
        base: base.to_string(),
        quote: quote.to_string(),
        as_of: as_of.to_string(),
        rate: rate.to_string(),
        source: None,
        home_override: Some(home),
    });
    assert!(result.is_ok());
}

pub fn reconcile_result(home: &Path, from: &str, to: &str) -> ClientResult<SuccessEnvelope> {
    reconcile::run_with_options(ReconcileOptions {
        user_id: USER.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        home_override: Some(home),
        ..ReconcileOptions::default()
    })
}

/// Runs reconciliation for September 2024 and returns the run data.
pub fn reconcile_september(home: &Path) -> Value {
    payload(reconcile_result(home, "2024-09-01", "2024-09-30"))["data"].clone()
}

pub fn pending_entries(home: &Path) -> Vec<Value> {
    let value = payload(review::pending_with_options(ReviewListOptions {
        user_id: USER.to_string(),
        home_override: Some(home),
    }));
    value["data"]["entries"].as_array().cloned().unwrap_or_default()
}

pub fn decide_result(
    home: &Path,
    entry_id: &str,
    action: &str,
    transaction_id: Option<&str>,
) -> ClientResult<SuccessEnvelope> {
    review::decide_with_options(ReviewDecideOptions {
        entry_id: entry_id.to_string(),
        action: action.to_string(),
        transaction_id: transaction_id.map(str::to_string),
        actor: USER.to_string(),
        home_override: Some(home),
    })
}

pub fn active_links(home: &Path) -> Vec<Value> {
    links(home, false)
}

pub fn links(home: &Path, include_inactive: bool) -> Vec<Value> {
    let value = payload(link::list_with_options(LinkListOptions {
        user_id: USER.to_string(),
        include_inactive,
        home_override: Some(home),
    }));
    value["data"]["links"].as_array().cloned().unwrap_or_default()
}

pub fn release_result(home: &Path, link_id: &str) -> ClientResult<SuccessEnvelope> {
    link::release_with_options(LinkReleaseOptions {
        link_id: link_id.to_string(),
        actor: USER.to_string(),
        home_override: Some(home),
    })
}

pub fn string_at(value: &Value, path: &[&str]) -> String {
    let mut current = value;
    for key in path {
        current = &current[*key];
    }
    current.as_str().unwrap_or_default().to_string()
}

pub fn query_count(home: &Path, sql: &str) -> i64 {
    let connection = Connection::open(db_path(home));
    assert!(connection.is_ok());
    if let Ok(conn) = connection {
        let value = conn.query_row(sql, [], |row| row.get::<_, i64>(0));
        assert!(value.is_ok());
        if let Ok(count) = value {
            return count;
        }
    }
    0
}

pub fn execute_sql(home: &Path, sql: &str) -> bool {
    let connection = Connection::open(db_path(home));
    assert!(connection.is_ok());
    if let Ok(conn) = connection {
        return conn.execute_batch(sql).is_ok();
    }
    false
}

pub fn write_file(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        assert!(fs::create_dir_all(parent).is_ok());
    }
    assert!(fs::write(path, body).is_ok());
}
