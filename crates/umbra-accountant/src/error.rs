use std::path::Path;

use serde_json::{Value, json};
use thiserror::Error;

use crate::contracts::types::{RowIssue, RowSummary};

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    pub code: String,
    pub message: String,
    pub recovery_steps: Vec<String>,
    pub data: Option<Value>,
}

impl ClientError {
    pub fn new(code: &str, message: &str, recovery_steps: Vec<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            recovery_steps,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_argument(message: &str) -> Self {
        Self::invalid_argument_for_command(message, None)
    }

    pub fn invalid_argument_for_command(message: &str, command: Option<&str>) -> Self {
        let help_hint = match command {
            Some(cmd) => format!("Run `umbra {cmd} --help` for usage."),
            None => "Run `umbra --help` for usage.".to_string(),
        };
        let error = Self::new("invalid_argument", message, vec![help_hint]);
        if let Some(cmd) = command {
            return error.with_data(json!({
                "command_hint": cmd,
            }));
        }
        error
    }

    pub fn invalid_argument_with_recovery(message: &str, recovery_steps: Vec<String>) -> Self {
        Self::new("invalid_argument", message, recovery_steps)
    }

    pub fn invalid_period(period_start: &str, period_end: &str) -> Self {
        Self::new(
            "invalid_period",
            &format!(
                "Invalid period: start `{period_start}` must be on or before end `{period_end}`."
            ),
            vec!["Swap the dates or pick a period whose start precedes its end.".to_string()],
        )
        .with_data(json!({
            "period_start": period_start,
            "period_end": period_end,
        }))
    }

    pub fn unknown_user(user_id: &str) -> Self {
        Self::new(
            "unknown_user",
            &format!("User `{user_id}` has no accounts and no expenses."),
            vec![
                "Import a statement with `umbra statement import <path> --user <id> --account <ref>`."
                    .to_string(),
                "Or record an expense with `umbra expense add --user <id> ...`.".to_string(),
            ],
        )
        .with_data(json!({
            "user_id": user_id,
        }))
    }

    pub fn already_linked(expense_id: &str, transaction_id: &str) -> Self {
        Self::new(
            "already_linked",
            &format!(
                "Expense `{expense_id}` or transaction `{transaction_id}` already has an active link."
            ),
            vec![
                "Run `umbra link show --expense <id>` to inspect the existing link.".to_string(),
                "Release it with `umbra link release <link_id>` before linking again.".to_string(),
            ],
        )
        .with_data(json!({
            "expense_id": expense_id,
            "transaction_id": transaction_id,
        }))
    }

    pub fn already_decided(entry_id: &str) -> Self {
        Self::new(
            "already_decided",
            &format!("Review entry `{entry_id}` was already decided."),
            vec!["Run `umbra review list --user <id>` to see pending entries.".to_string()],
        )
        .with_data(json!({
            "entry_id": entry_id,
        }))
    }

    pub fn conflicting_link(entry_id: &str, expense_id: &str, transaction_id: &str) -> Self {
        Self::new(
            "conflicting_link",
            &format!(
                "Review entry `{entry_id}` conflicts with a link created since it was queued."
            ),
            vec![
                "Inspect the existing link with `umbra link show --expense <id>` or `--transaction <id>`."
                    .to_string(),
                "Reject this entry, or release the other link and confirm again.".to_string(),
            ],
        )
        .with_data(json!({
            "entry_id": entry_id,
            "expense_id": expense_id,
            "transaction_id": transaction_id,
        }))
    }

    pub fn candidate_not_found(entry_id: &str, transaction_id: &str) -> Self {
        Self::new(
            "candidate_not_found",
            &format!(
                "Transaction `{transaction_id}` is not a candidate of review entry `{entry_id}`."
            ),
            vec!["Run `umbra review list --user <id>` to see the entry's candidates.".to_string()],
        )
        .with_data(json!({
            "entry_id": entry_id,
            "transaction_id": transaction_id,
        }))
    }

    pub fn transaction_voided(entry_id: &str, transaction_id: &str) -> Self {
        Self::new(
            "transaction_voided",
            &format!(
                "Transaction `{transaction_id}` of review entry `{entry_id}` was voided by a statement re-import."
            ),
            vec![
                "Reject this entry, or confirm another candidate with `--transaction <id>`.".to_string(),
                "Run `umbra reconcile` again to match against the re-imported lines.".to_string(),
            ],
        )
        .with_data(json!({
            "entry_id": entry_id,
            "transaction_id": transaction_id,
        }))
    }

    pub fn link_not_found(link_id: &str) -> Self {
        Self::new(
            "link_not_found",
            &format!("Link `{link_id}` was not found or is no longer active."),
            vec!["Run `umbra link list --user <id>` to find an active link id.".to_string()],
        )
        .with_data(json!({
            "link_id": link_id,
        }))
    }

    pub fn review_entry_not_found(entry_id: &str) -> Self {
        Self::new(
            "review_entry_not_found",
            &format!("Review entry `{entry_id}` was not found."),
            vec!["Run `umbra review list --user <id>` to find a valid entry id.".to_string()],
        )
        .with_data(json!({
            "entry_id": entry_id,
        }))
    }

    pub fn reconcile_in_progress(user_id: &str, run_id: &str) -> Self {
        Self::new(
            "reconcile_in_progress",
            &format!("A reconciliation run (`{run_id}`) is already in progress for `{user_id}`."),
            vec!["Wait for the running reconciliation to finish, then retry.".to_string()],
        )
        .with_data(json!({
            "user_id": user_id,
            "run_id": run_id,
        }))
    }

    pub fn account_owner_mismatch(account_ref: &str, owner: &str) -> Self {
        Self::new(
            "account_owner_mismatch",
            &format!("Account `{account_ref}` belongs to user `{owner}`."),
            vec!["Import the statement under its owning user or use a distinct account ref.".to_string()],
        )
        .with_data(json!({
            "account_ref": account_ref,
            "owner": owner,
        }))
    }

    pub fn expense_validation_failed(summary: RowSummary, issues: Vec<RowIssue>) -> Self {
        Self::row_validation_failed("expense_validation_failed", "Expense", summary, issues)
    }

    pub fn statement_validation_failed(summary: RowSummary, issues: Vec<RowIssue>) -> Self {
        Self::row_validation_failed("statement_validation_failed", "Statement", summary, issues)
    }

    fn row_validation_failed(
        code: &str,
        label: &str,
        summary: RowSummary,
        issues: Vec<RowIssue>,
    ) -> Self {
        let issue_count = summary.rows_invalid;
        Self::new(
            code,
            &format!(
                "{label} input failed validation: {issue_count} rows need fixes. No rows were written."
            ),
            vec![
                "Fix the listed issues in your source file.".to_string(),
                "Rerun the same command once every row validates.".to_string(),
            ],
        )
        .with_data(json!({
            "summary": summary,
            "issues": issues,
        }))
    }

    pub fn invalid_import_format(message: &str, received_format: &str) -> Self {
        Self::new(
            "invalid_import_format",
            message,
            vec!["Provide a supported input format (JSON array or CSV).".to_string()],
        )
        .with_data(json!({
            "received_format": received_format,
            "supported_formats": ["json_array", "csv"],
        }))
    }

    pub fn import_schema_mismatch(
        required_headers: Vec<String>,
        optional_headers: Vec<String>,
        actual_headers: Vec<String>,
    ) -> Self {
        Self::new(
            "invalid_import_format",
            "CSV headers do not satisfy the import schema.",
            vec![
                "Include all required headers; optional headers may be omitted.".to_string(),
                "Do not include unknown headers.".to_string(),
            ],
        )
        .with_data(json!({
            "received_format": "csv",
            "required_headers": required_headers,
            "optional_headers": optional_headers,
            "actual_headers": actual_headers,
        }))
    }

    pub fn internal_serialization(message: &str) -> Self {
        Self::new("internal_serialization_error", message, Vec::new())
    }

    pub fn ledger_init_permission_denied(path: &Path, detail: &str) -> Self {
        let location = path.display().to_string();
        Self::new(
            "ledger_init_permission_denied",
            &format!("Cannot initialize ledger at `{location}`: {detail}"),
            vec![format!(
                "Grant write access to `{location}` or set `UMBRA_HOME` to a writable directory."
            )],
        )
    }

    pub fn ledger_locked(path: &Path) -> Self {
        let location = path.display().to_string();
        Self::new(
            "ledger_locked",
            &format!("Ledger database is locked at `{location}`."),
            vec![format!(
                "Close other processes using `{location}` so the lock is released."
            )],
        )
    }

    pub fn ledger_corrupt(path: &Path) -> Self {
        let location = path.display().to_string();
        Self::new(
            "ledger_corrupt",
            &format!("Ledger database appears corrupt at `{location}`."),
            vec![format!(
                "Replace `{location}` with a valid SQLite ledger file or restore from backup."
            )],
        )
    }

    pub fn migration_failed(path: &Path, detail: &str) -> Self {
        let location = path.display().to_string();
        Self::new(
            "migration_failed",
            &format!("Ledger migration failed at `{location}`: {detail}"),
            vec!["Resolve conflicting schema objects referenced in the error details.".to_string()],
        )
    }

    pub fn ledger_init_failed(path: &Path, detail: &str) -> Self {
        let location = path.display().to_string();
        Self::new(
            "ledger_init_failed",
            &format!("Ledger initialization failed at `{location}`: {detail}"),
            Vec::new(),
        )
    }

    /// Codes that describe the caller's input or ledger state rather than a
    /// broken installation.
    pub fn is_recoverable(&self) -> bool {
        !(self.code.starts_with("internal_")
            || matches!(
                self.code.as_str(),
                "ledger_init_permission_denied"
                    | "ledger_locked"
                    | "ledger_corrupt"
                    | "migration_failed"
                    | "ledger_init_failed"
            ))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::ClientError;

    #[test]
    fn domain_errors_are_recoverable_and_storage_errors_are_not() {
        assert!(ClientError::already_linked("exp_1", "txn_1").is_recoverable());
        assert!(ClientError::already_decided("rev_1").is_recoverable());
        assert!(ClientError::invalid_period("2024-09-30", "2024-09-01").is_recoverable());
        assert!(!ClientError::ledger_locked(Path::new("/tmp/ledger.db")).is_recoverable());
        assert!(!ClientError::internal_serialization("boom").is_recoverable());
    }

    #[test]
    fn conflicting_link_carries_both_sides_in_data() {
        let error = ClientError::conflicting_link("rev_1", "exp_1", "txn_9");
        assert_eq!(error.code, "conflicting_link");
        let data = error.data.unwrap_or_default();
        assert_eq!(data["expense_id"], "exp_1");
        assert_eq!(data["transaction_id"], "txn_9");
    }
}
