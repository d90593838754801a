//! Statement and expense intake: resolve the source, parse JSON or CSV,
//! validate every row, then write all rows or none.

pub(crate) mod input;
pub(crate) mod parse;
pub(crate) mod persist;
pub(crate) mod validate;

use crate::contracts::types::{ExpenseImportData, NextStep, RowSummary, StatementImportData};
use crate::ingest::input::resolve_source;
use crate::ingest::parse::{EXPENSE_SCHEMA, ParsedRecord, STATEMENT_SCHEMA, parse_source};
use crate::ingest::persist::{StatementBatch, persist_expenses, persist_statement};
use crate::ingest::validate::{validate_expense_rows, validate_statement_rows};
use crate::model::Expense;
use crate::setup::SetupContext;
use crate::store::transactions::NewStatement;
use crate::{ClientError, ClientResult};

pub(crate) struct StatementImportRequest<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) account_ref: &'a str,
    pub(crate) statement_ref: Option<&'a str>,
    pub(crate) path: Option<&'a str>,
    pub(crate) stdin_override: Option<String>,
}

pub(crate) fn import_statement(
    setup: &SetupContext,
    request: StatementImportRequest<'_>,
) -> ClientResult<StatementImportData> {
    let user_id = require_non_empty(request.user_id, "--user", "statement import")?;
    let account_ref = require_non_empty(request.account_ref, "--account", "statement import")?;
    let statement_ref = request
        .statement_ref
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let source = resolve_source(request.path, request.stdin_override, "statement import")?;
    let records = parse_source(&source.content, STATEMENT_SCHEMA)?;
    let validated = validate_statement_rows(records)?;

    let mut connection = setup.connect()?;
    let persisted = persist_statement(
        &mut connection,
        &setup.db_path,
        StatementBatch {
            statement: NewStatement {
                user_id,
                account_ref,
                statement_ref,
                source_kind: source.source_kind.as_str(),
                source_ref: source.source_ref.as_deref(),
                rows_read: validated.summary.rows_read,
            },
            rows: &validated.rows,
        },
    )?;

    Ok(StatementImportData {
        statement_id: persisted.statement_id,
        user_id: user_id.to_string(),
        account_ref: account_ref.to_string(),
        statement_ref: statement_ref.map(str::to_string),
        source_kind: source.source_kind.as_str().to_string(),
        source_ref: source.source_ref,
        summary: RowSummary {
            inserted: persisted.inserted,
            ..validated.summary
        },
        voided_statement_ids: persisted.voided_statement_ids,
        voided_transactions: persisted.voided_transactions,
        superseded_review_entries: persisted.superseded_review_entries,
        next_step: NextStep {
            label: "Reconcile the statement period".to_string(),
            command: format!("umbra reconcile --user {user_id} --from <date> --to <date>"),
        },
    })
}

pub(crate) fn import_expenses(
    setup: &SetupContext,
    path: Option<&str>,
    stdin_override: Option<String>,
) -> ClientResult<ExpenseImportData> {
    let source = resolve_source(path, stdin_override, "expense import")?;
    let records = parse_source(&source.content, EXPENSE_SCHEMA)?;
    let validated = validate_expense_rows(records)?;

    let mut connection = setup.connect()?;
    let expenses = persist_expenses(&mut connection, &setup.db_path, &validated.rows)?;

    Ok(ExpenseImportData {
        source_kind: source.source_kind.as_str().to_string(),
        source_ref: source.source_ref,
        summary: RowSummary {
            inserted: i64::try_from(expenses.len()).unwrap_or(i64::MAX),
            ..validated.summary
        },
        expense_ids: expenses
            .into_iter()
            .map(|expense| expense.expense_id)
            .collect(),
    })
}

/// Validates a single expense given as named fields and records it.
pub(crate) fn add_expense(setup: &SetupContext, record: ParsedRecord) -> ClientResult<Expense> {
    let validated = validate_expense_rows(vec![record])?;
    let mut connection = setup.connect()?;
    let mut expenses = persist_expenses(&mut connection, &setup.db_path, &validated.rows)?;
    expenses
        .pop()
        .ok_or_else(|| ClientError::internal_serialization("expense insert returned no row"))
}

pub(crate) fn invalid_input_error(message: &str) -> ClientError {
    ClientError::invalid_argument_with_recovery(
        message,
        vec![
            "Provide a JSON array or CSV with a header row.".to_string(),
            "Pass a file path, or `-` to read stdin.".to_string(),
        ],
    )
}

fn require_non_empty<'a>(value: &'a str, flag: &str, command: &str) -> ClientResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::invalid_argument_for_command(
            &format!("`{flag}` must be non-empty."),
            Some(command),
        ));
    }
    Ok(trimmed)
}
