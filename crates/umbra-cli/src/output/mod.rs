mod error_text;
mod format;
mod json;
mod ledger_text;
mod mode;
mod reconcile_text;

use std::io;

use umbra_accountant::{ClientError, SuccessEnvelope};

use crate::stdout_io::write_stdout_line;

pub use mode::{OutputMode, infer_requested_output_mode, mode_for_cli};

pub fn print_success(success: &SuccessEnvelope, mode: OutputMode) -> io::Result<()> {
    let body = match mode {
        OutputMode::Text => render_text_success(success)?,
        OutputMode::Json => json::render_success_json(success)?,
    };
    write_stdout_line(&body)
}

pub fn print_failure(error: &ClientError, mode: OutputMode) -> io::Result<()> {
    let body = match mode {
        OutputMode::Json => json::render_error_json(error)?,
        OutputMode::Text => error_text::render_error(error),
    };
    write_stdout_line(&body)
}

fn render_text_success(success: &SuccessEnvelope) -> io::Result<String> {
    let data = &success.data;
    match success.command.as_str() {
        "statement import" => ledger_text::render_statement_import(data),
        "statement list" => ledger_text::render_statement_list(data),
        "expense add" => ledger_text::render_expense_add(data),
        "expense import" => ledger_text::render_expense_import(data),
        "expense list" => ledger_text::render_expense_list(data),
        "fx set" => ledger_text::render_fx_set(data),
        "fx list" => ledger_text::render_fx_list(data),
        "alias set" => ledger_text::render_alias_set(data),
        "alias list" => ledger_text::render_alias_list(data),
        "reconcile" => reconcile_text::render_reconcile_run(data),
        "review list" => reconcile_text::render_review_list(data),
        "review decide" => reconcile_text::render_review_decide(data),
        "link release" => reconcile_text::render_link_release(data),
        "link show" => reconcile_text::render_link_show(data),
        "link list" => reconcile_text::render_link_list(data),
        _ => Err(io::Error::other(format!(
            "unsupported text output command `{}`",
            success.command
        ))),
    }
}
