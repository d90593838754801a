use std::path::Path;

use crate::ClientResult;
use crate::commands::common::{load_setup, require_arg};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::StatementListData;
use crate::ingest::{self, StatementImportRequest};
use crate::store::transactions::list_statements;

#[derive(Debug, Default)]
pub struct StatementImportOptions<'a> {
    pub path: Option<String>,
    pub user_id: String,
    pub account_ref: String,
    pub statement_ref: Option<String>,
    pub home_override: Option<&'a Path>,
    pub stdin_override: Option<String>,
}

#[derive(Debug, Default)]
pub struct StatementListOptions<'a> {
    pub user_id: String,
    pub home_override: Option<&'a Path>,
}

pub fn import(
    path: Option<String>,
    user_id: String,
    account_ref: String,
    statement_ref: Option<String>,
) -> ClientResult<SuccessEnvelope> {
    import_with_options(StatementImportOptions {
        path,
        user_id,
        account_ref,
        statement_ref,
        home_override: None,
        stdin_override: None,
    })
}

#[doc(hidden)]
pub fn import_with_options(options: StatementImportOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let setup = load_setup(options.home_override)?;
    let data = ingest::import_statement(
        &setup,
        StatementImportRequest {
            user_id: &options.user_id,
            account_ref: &options.account_ref,
            statement_ref: options.statement_ref.as_deref(),
            path: options.path.as_deref(),
            stdin_override: options.stdin_override,
        },
    )?;
    success("statement import", data)
}

pub fn list(user_id: String) -> ClientResult<SuccessEnvelope> {
    list_with_options(StatementListOptions {
        user_id,
        home_override: None,
    })
}

#[doc(hidden)]
pub fn list_with_options(options: StatementListOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let user_id = require_arg(&options.user_id, "--user", "statement list")?;
    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let statements = list_statements(&connection, &setup.db_path, user_id)?;
    success(
        "statement list",
        StatementListData {
            user_id: user_id.to_string(),
            statements,
        },
    )
}
