use std::path::Path;

use crate::commands::common::{load_setup, require_arg};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::ReviewListData;
use crate::model::Actor;
use crate::review::{self, ReviewAction, list_pending};
use crate::{ClientError, ClientResult};

#[derive(Debug, Default)]
pub struct ReviewListOptions<'a> {
    pub user_id: String,
    pub home_override: Option<&'a Path>,
}

#[derive(Debug, Default)]
pub struct ReviewDecideOptions<'a> {
    pub entry_id: String,
    /// `confirm` or `reject`.
    pub action: String,
    /// Picks a non-top candidate when confirming.
    pub transaction_id: Option<String>,
    pub actor: String,
    pub home_override: Option<&'a Path>,
}

pub fn pending(user_id: String) -> ClientResult<SuccessEnvelope> {
    pending_with_options(ReviewListOptions {
        user_id,
        home_override: None,
    })
}

#[doc(hidden)]
pub fn pending_with_options(options: ReviewListOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let user_id = require_arg(&options.user_id, "--user", "review list")?;
    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let entries = list_pending(&connection, &setup.db_path, user_id)?;
    success(
        "review list",
        ReviewListData {
            user_id: user_id.to_string(),
            entries,
        },
    )
}

pub fn decide(entry_id: String, action: String, actor: String) -> ClientResult<SuccessEnvelope> {
    decide_with_options(ReviewDecideOptions {
        entry_id,
        action,
        transaction_id: None,
        actor,
        home_override: None,
    })
}

#[doc(hidden)]
pub fn decide_with_options(options: ReviewDecideOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let command = "review decide";
    let entry_id = require_arg(&options.entry_id, "ENTRY_ID", command)?;
    let action = parse_action(&options.action, options.transaction_id)?;
    let actor = Actor::user(&options.actor)?;

    let setup = load_setup(options.home_override)?;
    let mut connection = setup.connect()?;
    let outcome = review::decide(&mut connection, &setup.db_path, entry_id, &action, &actor)?;
    success(command, outcome)
}

fn parse_action(action: &str, transaction_id: Option<String>) -> ClientResult<ReviewAction> {
    let transaction_id = transaction_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    match action.trim() {
        "confirm" => Ok(ReviewAction::Confirm { transaction_id }),
        "reject" if transaction_id.is_some() => Err(ClientError::invalid_argument_for_command(
            "`--transaction` only applies to `confirm`; `reject` rejects every candidate.",
            Some("review decide"),
        )),
        "reject" => Ok(ReviewAction::Reject),
        other => Err(ClientError::invalid_argument_for_command(
            &format!("Unknown decision `{other}`; expected `confirm` or `reject`."),
            Some("review decide"),
        )),
    }
}
