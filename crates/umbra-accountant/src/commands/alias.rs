use std::path::Path;

use crate::commands::common::{load_setup, require_arg};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::{AliasListData, AliasSetData};
use crate::matching::normalize::fingerprint;
use crate::store::aliases::{MERCHANT_KIND, list_aliases, upsert_alias};
use crate::{ClientError, ClientResult};

/// Maps merchant text `alias` onto `canonical` before scoring.
#[derive(Debug, Default)]
pub struct AliasSetOptions<'a> {
    pub alias: String,
    pub canonical: String,
    pub home_override: Option<&'a Path>,
}

#[derive(Debug, Default)]
pub struct AliasListOptions<'a> {
    pub home_override: Option<&'a Path>,
}

pub fn set(alias: String, canonical: String) -> ClientResult<SuccessEnvelope> {
    set_with_options(AliasSetOptions {
        alias,
        canonical,
        home_override: None,
    })
}

#[doc(hidden)]
pub fn set_with_options(options: AliasSetOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let command = "alias set";
    let alias = comparable_text(&options.alias, "ALIAS", command)?;
    let canonical_key = comparable_text(&options.canonical, "CANONICAL", command)?;
    if alias == canonical_key {
        return Err(ClientError::invalid_argument_for_command(
            "`ALIAS` and `CANONICAL` normalize to the same merchant text.",
            Some(command),
        ));
    }
    let canonical = options.canonical.trim();

    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let record = upsert_alias(&connection, &setup.db_path, MERCHANT_KIND, &alias, canonical)?;
    success(command, AliasSetData { alias: record })
}

pub fn list() -> ClientResult<SuccessEnvelope> {
    list_with_options(AliasListOptions {
        home_override: None,
    })
}

#[doc(hidden)]
pub fn list_with_options(options: AliasListOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let aliases = list_aliases(&connection, &setup.db_path, MERCHANT_KIND)?;
    success("alias list", AliasListData { aliases })
}

/// Text that survives merchant normalization, returned as its fingerprint.
fn comparable_text(value: &str, field: &str, command: &str) -> ClientResult<String> {
    let trimmed = require_arg(value, field, command)?;
    fingerprint(trimmed).ok_or_else(|| {
        ClientError::invalid_argument_for_command(
            &format!("`{field}` has no comparable merchant text after normalization."),
            Some(command),
        )
    })
}
