use std::path::Path;

use crate::{ClientError, ClientResult};
use crate::commands::common::{load_setup, optional_date_arg, require_arg};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::{ExpenseAddData, ExpenseListData, ExpenseListItem};
use crate::ingest::{self, parse::ParsedRecord};
use crate::model::format_iso_date;
use crate::store::expenses::list_expenses;

/// One expense from named fields. `amount` is in major units, e.g. `27.50`.
#[derive(Debug, Default)]
pub struct ExpenseAddOptions<'a> {
    pub user_id: String,
    pub date: String,
    pub amount: String,
    pub currency: String,
    pub merchant: String,
    pub category: Option<String>,
    pub source: Option<String>,
    /// Refund or income rather than spending.
    pub credit: bool,
    /// JSON object or array, stored untouched.
    pub vat_breakdown: Option<String>,
    pub home_override: Option<&'a Path>,
}

#[derive(Debug, Default)]
pub struct ExpenseImportOptions<'a> {
    pub path: Option<String>,
    pub home_override: Option<&'a Path>,
    pub stdin_override: Option<String>,
}

#[derive(Debug, Default)]
pub struct ExpenseListOptions<'a> {
    pub user_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub home_override: Option<&'a Path>,
}

pub fn add(
    user_id: String,
    date: String,
    amount: String,
    currency: String,
    merchant: String,
) -> ClientResult<SuccessEnvelope> {
    add_with_options(ExpenseAddOptions {
        user_id,
        date,
        amount,
        currency,
        merchant,
        ..ExpenseAddOptions::default()
    })
}

#[doc(hidden)]
pub fn add_with_options(options: ExpenseAddOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let setup = load_setup(options.home_override)?;
    let direction = if options.credit { "credit" } else { "debit" };
    let record = ParsedRecord::new(1)
        .with("user_id", Some(options.user_id))
        .with("date_local", Some(options.date))
        .with("amount", Some(options.amount))
        .with("currency", Some(options.currency))
        .with("merchant_text", Some(options.merchant))
        .with("category_code", options.category)
        .with("source", options.source)
        .with("direction", Some(direction.to_string()))
        .with("vat_breakdown", options.vat_breakdown);
    let expense = ingest::add_expense(&setup, record)?;
    success("expense add", ExpenseAddData { expense })
}

pub fn import(path: Option<String>) -> ClientResult<SuccessEnvelope> {
    import_with_options(ExpenseImportOptions {
        path,
        home_override: None,
        stdin_override: None,
    })
}

#[doc(hidden)]
pub fn import_with_options(options: ExpenseImportOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let setup = load_setup(options.home_override)?;
    let data = ingest::import_expenses(&setup, options.path.as_deref(), options.stdin_override)?;
    success("expense import", data)
}

pub fn list(user_id: String, from: Option<String>, to: Option<String>) -> ClientResult<SuccessEnvelope> {
    list_with_options(ExpenseListOptions {
        user_id,
        from,
        to,
        home_override: None,
    })
}

#[doc(hidden)]
pub fn list_with_options(options: ExpenseListOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let command = "expense list";
    let user_id = require_arg(&options.user_id, "--user", command)?;
    let from = optional_date_arg(options.from.as_deref(), "--from", command)?;
    let to = optional_date_arg(options.to.as_deref(), "--to", command)?;
    if let (Some(start), Some(end)) = (from, to)
        && start > end
    {
        return Err(ClientError::invalid_period(
            &format_iso_date(&start),
            &format_iso_date(&end),
        ));
    }

    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let rows = list_expenses(&connection, &setup.db_path, user_id, from, to)?
        .into_iter()
        .map(|row| ExpenseListItem {
            expense: row.expense,
            active_link_id: row.active_link_id,
        })
        .collect();

    success(
        command,
        ExpenseListData {
            user_id: user_id.to_string(),
            from: from.as_ref().map(format_iso_date),
            to: to.as_ref().map(format_iso_date),
            rows,
        },
    )
}
