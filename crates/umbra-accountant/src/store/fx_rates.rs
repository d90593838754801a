use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::format_iso_date;
use crate::state::{map_sqlite_error, now_rfc3339};
use crate::store::stored_date;
use crate::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FxRateRecord {
    pub base: String,
    pub quote: String,
    pub as_of: NaiveDate,
    pub rate: Decimal,
    pub source: String,
    pub fetched_at: String,
}

/// Inserts or replaces the rate for `(base, quote, as_of)`.
pub fn upsert_rate(
    connection: &Connection,
    db_path: &Path,
    base: &str,
    quote: &str,
    as_of: NaiveDate,
    rate: Decimal,
    source: &str,
) -> ClientResult<FxRateRecord> {
    let fetched_at = now_rfc3339();
    connection
        .execute(
            "INSERT INTO internal_fx_rates (base, quote, as_of, rate, source, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (base, quote, as_of) DO UPDATE SET
                 rate = excluded.rate,
                 source = excluded.source,
                 fetched_at = excluded.fetched_at",
            params![
                base,
                quote,
                format_iso_date(&as_of),
                rate.normalize().to_string(),
                source,
                &fetched_at
            ],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    Ok(FxRateRecord {
        base: base.to_string(),
        quote: quote.to_string(),
        as_of,
        rate: rate.normalize(),
        source: source.to_string(),
        fetched_at,
    })
}

pub fn list_rates(connection: &Connection, db_path: &Path) -> ClientResult<Vec<FxRateRecord>> {
    let mut statement = connection
        .prepare(
            "SELECT base, quote, as_of, rate, source, fetched_at
             FROM internal_fx_rates
             ORDER BY base ASC, quote ASC, as_of ASC",
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut rates = Vec::new();
    for row in rows {
        let (base, quote, as_of, rate, source, fetched_at) =
            row.map_err(|error| map_sqlite_error(db_path, &error))?;
        rates.push(FxRateRecord {
            base,
            quote,
            as_of: stored_date(db_path, &as_of)?,
            rate: Decimal::from_str(&rate).map_err(|_| ClientError::ledger_corrupt(db_path))?,
            source,
            fetched_at,
        });
    }
    Ok(rates)
}
