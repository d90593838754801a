//! Currency conversion for cross-currency expense/transaction pairs.
//!
//! Rates are `rust_decimal::Decimal` end to end: `1 base = rate quote`.
//! Amounts stay in integer minor units and are rescaled by each currency's
//! minor-unit exponent before and after the multiplication.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::ClientResult;
use crate::model::format_iso_date;
use crate::state::map_sqlite_error;

/// Lookup of the rate converting `from` into `to` on `date`.
pub trait FxRateSource {
    fn rate(&self, from: &str, to: &str, date: NaiveDate) -> ClientResult<Option<Decimal>>;
}

/// Rates stored in `internal_fx_rates`.
///
/// Prefers the most recent `as_of` on or before `date` within the lookback,
/// a direct row over an inverted one on the same day.
pub struct SqliteFxRates<'a> {
    connection: &'a Connection,
    db_path: &'a Path,
    lookback_days: u32,
}

impl<'a> SqliteFxRates<'a> {
    pub fn new(connection: &'a Connection, db_path: &'a Path, lookback_days: u32) -> Self {
        Self {
            connection,
            db_path,
            lookback_days,
        }
    }
}

impl FxRateSource for SqliteFxRates<'_> {
    fn rate(&self, from: &str, to: &str, date: NaiveDate) -> ClientResult<Option<Decimal>> {
        if from == to {
            return Ok(Some(Decimal::ONE));
        }

        let earliest = date
            .checked_sub_days(Days::new(u64::from(self.lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        let row = self
            .connection
            .query_row(
                "SELECT base, rate
                 FROM internal_fx_rates
                 WHERE ((base = ?1 AND quote = ?2) OR (base = ?2 AND quote = ?1))
                   AND as_of <= ?3
                   AND as_of >= ?4
                 ORDER BY as_of DESC, CASE WHEN base = ?1 THEN 0 ELSE 1 END
                 LIMIT 1",
                params![from, to, format_iso_date(&date), format_iso_date(&earliest)],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(|error| map_sqlite_error(self.db_path, &error))?;

        let Some((base, stored_rate)) = row else {
            return Ok(None);
        };
        let Ok(rate) = Decimal::from_str(&stored_rate) else {
            warn!(from, to, stored_rate, "ignoring unparseable stored fx rate");
            return Ok(None);
        };

        if base == from {
            return Ok(positive(rate));
        }
        Ok(positive(rate).and_then(|value| Decimal::ONE.checked_div(value)))
    }
}

/// In-memory rates with the same lookback rules as [`SqliteFxRates`].
#[derive(Debug, Clone, Default)]
pub struct StaticFxRates {
    rates: BTreeMap<(String, String, NaiveDate), Decimal>,
    lookback_days: u32,
}

impl StaticFxRates {
    pub fn new(lookback_days: u32) -> Self {
        Self {
            rates: BTreeMap::new(),
            lookback_days,
        }
    }

    pub fn with_rate(mut self, base: &str, quote: &str, as_of: NaiveDate, rate: Decimal) -> Self {
        self.insert(base, quote, as_of, rate);
        self
    }

    pub fn insert(&mut self, base: &str, quote: &str, as_of: NaiveDate, rate: Decimal) {
        self.rates
            .insert((base.to_string(), quote.to_string(), as_of), rate);
    }

    fn on_day(&self, from: &str, to: &str, day: NaiveDate) -> Option<Decimal> {
        if let Some(rate) = self.rates.get(&(from.to_string(), to.to_string(), day)) {
            return positive(*rate);
        }
        self.rates
            .get(&(to.to_string(), from.to_string(), day))
            .and_then(|rate| positive(*rate))
            .and_then(|rate| Decimal::ONE.checked_div(rate))
    }
}

impl FxRateSource for StaticFxRates {
    fn rate(&self, from: &str, to: &str, date: NaiveDate) -> ClientResult<Option<Decimal>> {
        if from == to {
            return Ok(Some(Decimal::ONE));
        }
        for offset in 0..=self.lookback_days {
            let Some(day) = date.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };
            if let Some(rate) = self.on_day(from, to, day) {
                return Ok(Some(rate));
            }
        }
        Ok(None)
    }
}

/// `(from, to, date)` lookups resolved once per run.
pub type FxKey = (String, String, NaiveDate);

/// Rates memoized for one reconciliation run; `None` records an unavailable
/// rate so it is not looked up twice.
#[derive(Debug, Clone, Default)]
pub struct FxCache {
    entries: BTreeMap<FxKey, Option<Decimal>>,
}

impl FxCache {
    /// Resolves every key not already cached. Source failures are logged and
    /// treated as an unavailable rate.
    pub fn resolve_missing(&mut self, source: &dyn FxRateSource, keys: &BTreeSet<FxKey>) -> usize {
        let mut fetched = 0;
        for key in keys {
            if self.entries.contains_key(key) {
                continue;
            }
            let (from, to, date) = key;
            let rate = match source.rate(from, to, *date) {
                Ok(rate) => rate,
                Err(error) => {
                    warn!(
                        from = from.as_str(),
                        to = to.as_str(),
                        date = %date,
                        code = error.code.as_str(),
                        "fx lookup failed; treating rate as unavailable"
                    );
                    None
                }
            };
            self.entries.insert(key.clone(), rate);
            fetched += 1;
        }
        fetched
    }

    pub fn get(&self, from: &str, to: &str, date: NaiveDate) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        self.entries
            .get(&(from.to_string(), to.to_string(), date))
            .copied()
            .flatten()
    }
}

/// ISO 4217 minor-unit exponent; two decimals unless listed.
pub fn minor_unit_exponent(currency: &str) -> u32 {
    match currency {
        "JPY" | "KRW" | "ISK" | "CLP" | "VND" | "XOF" | "XAF" | "UGX" | "PYG" | "RWF" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" | "LYD" | "IQD" => 3,
        _ => 2,
    }
}

/// Converts `amount` minor units of `from` into minor units of `to`,
/// rounding half away from zero. `None` on overflow.
pub fn convert_minor(amount: i64, from: &str, to: &str, rate: Decimal) -> Option<i64> {
    let major = Decimal::new(amount, minor_unit_exponent(from));
    let converted = major.checked_mul(rate)?;
    let rounded = converted
        .round_dp_with_strategy(minor_unit_exponent(to), RoundingStrategy::MidpointAwayFromZero);
    let scale = Decimal::from(10_i64.checked_pow(minor_unit_exponent(to))?);
    rounded.checked_mul(scale)?.to_i64()
}

fn positive(rate: Decimal) -> Option<Decimal> {
    (rate > Decimal::ZERO).then_some(rate)
}
