use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::model::parse_iso_date_arg;
use crate::setup::{SetupContext, load};
use crate::{ClientError, ClientResult};

pub(crate) fn load_setup(home_override: Option<&Path>) -> ClientResult<SetupContext> {
    load(home_override)
}

pub(crate) fn require_arg<'a>(value: &'a str, flag: &str, command: &str) -> ClientResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::invalid_argument_for_command(
            &format!("`{flag}` must be non-empty."),
            Some(command),
        ));
    }
    Ok(trimmed)
}

pub(crate) fn optional_date_arg(
    value: Option<&str>,
    field: &str,
    command: &str,
) -> ClientResult<Option<NaiveDate>> {
    value
        .map(|raw| parse_iso_date_arg(raw, field, command))
        .transpose()
}

/// Three ASCII letters, upper-cased.
pub(crate) fn currency_arg(value: &str, field: &str, command: &str) -> ClientResult<String> {
    let upper = value.trim().to_ascii_uppercase();
    if upper.len() != 3 || !upper.bytes().all(|byte| byte.is_ascii_uppercase()) {
        return Err(ClientError::invalid_argument_for_command(
            &format!("`{field}` must be a three-letter ISO 4217 currency code."),
            Some(command),
        ));
    }
    Ok(upper)
}

pub(crate) fn positive_decimal_arg(value: &str, field: &str, command: &str) -> ClientResult<Decimal> {
    match Decimal::from_str(value.trim()) {
        Ok(parsed) if parsed > Decimal::ZERO => Ok(parsed),
        _ => Err(ClientError::invalid_argument_for_command(
            &format!("`{field}` must be a positive decimal number."),
            Some(command),
        )),
    }
}
