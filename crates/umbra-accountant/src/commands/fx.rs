use std::path::Path;

use crate::{ClientError, ClientResult};
use crate::commands::common::{currency_arg, load_setup, positive_decimal_arg, require_arg};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::{FxListData, FxSetData};
use crate::model::parse_iso_date_arg;
use crate::store::fx_rates::{list_rates, upsert_rate};

pub const DEFAULT_FX_SOURCE: &str = "manual";

/// `1 BASE = RATE QUOTE` on `as_of`.
#[derive(Debug, Default)]
pub struct FxSetOptions<'a> {
    pub base: String,
    pub quote: String,
    pub as_of: String,
    pub rate: String,
    pub source: Option<String>,
    pub home_override: Option<&'a Path>,
}

#[derive(Debug, Default)]
pub struct FxListOptions<'a> {
    pub home_override: Option<&'a Path>,
}

pub fn set(base: String, quote: String, as_of: String, rate: String) -> ClientResult<SuccessEnvelope> {
    set_with_options(FxSetOptions {
        base,
        quote,
        as_of,
        rate,
        source: None,
        home_override: None,
    })
}

#[doc(hidden)]
pub fn set_with_options(options: FxSetOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let command = "fx set";
    let base = currency_arg(&options.base, "BASE", command)?;
    let quote = currency_arg(&options.quote, "QUOTE", command)?;
    if base == quote {
        return Err(ClientError::invalid_argument_for_command(
            "`BASE` and `QUOTE` must differ.",
            Some(command),
        ));
    }
    let as_of = parse_iso_date_arg(&options.as_of, "DATE", command)?;
    let rate = positive_decimal_arg(&options.rate, "RATE", command)?;
    let source = match options.source.as_deref() {
        Some(value) => require_arg(value, "--source", command)?,
        None => DEFAULT_FX_SOURCE,
    };

    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let record = upsert_rate(&connection, &setup.db_path, &base, &quote, as_of, rate, source)?;
    success(command, FxSetData { rate: record })
}

pub fn list() -> ClientResult<SuccessEnvelope> {
    list_with_options(FxListOptions {
        home_override: None,
    })
}

#[doc(hidden)]
pub fn list_with_options(options: FxListOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let setup = load_setup(options.home_override)?;
    let connection = setup.connect()?;
    let rates = list_rates(&connection, &setup.db_path)?;
    success("fx list", FxListData { rates })
}
