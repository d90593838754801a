//! Row-level access to the ledger tables.
//!
//! Every function takes a `&Connection` so callers can pass either a plain
//! connection or an open `rusqlite::Transaction`.

pub mod accounts;
pub mod aliases;
pub mod expenses;
pub mod fx_rates;
pub mod runs;
pub mod transactions;

use std::path::Path;

use chrono::NaiveDate;

use crate::model::parse_iso_date;
use crate::{ClientError, ClientResult};

/// Dates are written by this crate as `YYYY-MM-DD`; anything else means the
/// file was edited out from under us.
pub(crate) fn stored_date(db_path: &Path, value: &str) -> ClientResult<NaiveDate> {
    parse_iso_date(value).ok_or_else(|| ClientError::ledger_corrupt(db_path))
}
