use std::path::Path;

use crate::commands::common::{load_setup, require_arg};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::{LinkListData, LinkReleaseData, LinkShowData};
use crate::ledger::{get_link_for_expense, get_link_for_transaction, list_links, release_link};
use crate::model::Actor;
use crate::{ClientError, ClientResult};

#[derive(Debug, Default)]
pub struct LinkReleaseOptions<'a> {
    pub link_id: String,
    pub actor: String,
    pub home_override: Option<&'a Path>,
}

/// Exactly one of `expense_id` and `transaction_id`.
#[derive(Debug, Default)]
pub struct LinkShowOptions<'a> {
    pub expense_id: Option<String>,
    pub transaction_id: Option<String>,
    pub home_override: Option<&'a Path>,
}

#[derive(Debug, Default)]
pub struct LinkListOptions<'a> {
    pub user_id: String,
    pub include_inactive: bool,
    pub home_override: Option<&'a Path>,
}

pub fn release(link_id: String, actor: String) -> ClientResult<SuccessEnvelope> {
    release_with_options(LinkReleaseOptions {
        link_id,
        actor,
        home_override: None,
    })
}

#[doc(hidden)]
pub fn release_with_options(options: LinkReleaseOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let command = "link release";
    let link_id = require_arg(&options.link_id, "LINK_ID", command)?;
    let actor = Actor::user(&options.actor)?;
    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let link = release_link(&connection, &setup.db_path, link_id, &actor)?;
    success(command, LinkReleaseData { link })
}

pub fn show(expense_id: Option<String>, transaction_id: Option<String>) -> ClientResult<SuccessEnvelope> {
    show_with_options(LinkShowOptions {
        expense_id,
        transaction_id,
        home_override: None,
    })
}

#[doc(hidden)]
pub fn show_with_options(options: LinkShowOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let command = "link show";
    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let link = match (options.expense_id.as_deref(), options.transaction_id.as_deref()) {
        (Some(expense_id), None) => get_link_for_expense(
            &connection,
            &setup.db_path,
            require_arg(expense_id, "--expense", command)?,
        )?,
        (None, Some(transaction_id)) => get_link_for_transaction(
            &connection,
            &setup.db_path,
            require_arg(transaction_id, "--transaction", command)?,
        )?,
        _ => {
            return Err(ClientError::invalid_argument_for_command(
                "Pass exactly one of `--expense` or `--transaction`.",
                Some(command),
            ));
        }
    };

    success(
        command,
        LinkShowData {
            expense_id: options.expense_id,
            transaction_id: options.transaction_id,
            link,
        },
    )
}

pub fn list(user_id: String, include_inactive: bool) -> ClientResult<SuccessEnvelope> {
    list_with_options(LinkListOptions {
        user_id,
        include_inactive,
        home_override: None,
    })
}

#[doc(hidden)]
pub fn list_with_options(options: LinkListOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let user_id = require_arg(&options.user_id, "--user", "link list")?;
    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let links = list_links(&connection, &setup.db_path, user_id, options.include_inactive)?;
    success(
        "link list",
        LinkListData {
            user_id: user_id.to_string(),
            include_inactive: options.include_inactive,
            links,
        },
    )
}
