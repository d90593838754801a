use serde::Serialize;

use crate::model::{Expense, ReconciliationLink};
use crate::review::ReviewEntry;
use crate::store::aliases::AliasRecord;
use crate::store::fx_rates::FxRateRecord;
use crate::store::transactions::StatementSummary;

#[derive(Debug, Clone, Serialize)]
pub struct NextStep {
    pub label: String,
    pub command: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowSummary {
    pub rows_read: i64,
    pub rows_valid: i64,
    pub rows_invalid: i64,
    pub inserted: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub row: i64,
    pub field: String,
    pub code: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementImportData {
    pub statement_id: String,
    pub user_id: String,
    pub account_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_ref: Option<String>,
    pub source_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub summary: RowSummary,
    /// Earlier imports of the same `statement_ref` that this import replaced.
    pub voided_statement_ids: Vec<String>,
    pub voided_transactions: i64,
    /// Pending review entries closed because a candidate line was voided.
    pub superseded_review_entries: i64,
    pub next_step: NextStep,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementListData {
    pub user_id: String,
    pub statements: Vec<StatementSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseAddData {
    pub expense: Expense,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseImportData {
    pub source_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub summary: RowSummary,
    pub expense_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseListItem {
    #[serde(flatten)]
    pub expense: Expense,
    pub active_link_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseListData {
    pub user_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub rows: Vec<ExpenseListItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FxSetData {
    pub rate: FxRateRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct FxListData {
    pub rates: Vec<FxRateRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AliasSetData {
    pub alias: AliasRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct AliasListData {
    pub aliases: Vec<AliasRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewListData {
    pub user_id: String,
    pub entries: Vec<ReviewEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReleaseData {
    pub link: ReconciliationLink,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkShowData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub link: Option<ReconciliationLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkListData {
    pub user_id: String,
    pub include_inactive: bool,
    pub links: Vec<ReconciliationLink>,
}
