//! Records shared by the importer, the expense store, the matcher, the ledger
//! and the review workflow.

use chrono::{Days, NaiveDate};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::{ClientError, ClientResult};

pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// One line of an imported bank or card statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub account_ref: String,
    pub posted_date: NaiveDate,
    /// Signed minor units; negative is money leaving the account.
    pub amount: i64,
    pub currency: String,
    pub counterparty_text: String,
    pub mcc: Option<String>,
    pub statement_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "debit" => Some(Self::Debit),
            "credit" => Some(Self::Credit),
            _ => None,
        }
    }

    /// Whether a signed statement amount flows the same way as this expense.
    pub const fn accepts(self, signed_amount: i64) -> bool {
        match self {
            Self::Debit => signed_amount <= 0,
            Self::Credit => signed_amount >= 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseSource {
    Manual,
    Ocr,
    QrBill,
    Payslip,
}

impl ExpenseSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Ocr => "ocr",
            Self::QrBill => "qr_bill",
            Self::Payslip => "payslip",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(Self::Manual),
            "ocr" => Some(Self::Ocr),
            "qr_bill" => Some(Self::QrBill),
            "payslip" => Some(Self::Payslip),
            _ => None,
        }
    }
}

/// A user-facing expense, whichever producer created it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expense {
    pub expense_id: String,
    pub user_id: String,
    pub date_local: NaiveDate,
    pub amount_cents: u64,
    pub direction: Direction,
    pub currency: String,
    pub merchant_text: String,
    pub category_code: Option<String>,
    pub source: ExpenseSource,
    /// Opaque to the matcher; stored and returned untouched.
    pub vat_breakdown: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    AutoConfirmed,
    ManuallyConfirmed,
    Rejected,
    Released,
}

impl LinkStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoConfirmed => "auto_confirmed",
            Self::ManuallyConfirmed => "manually_confirmed",
            Self::Rejected => "rejected",
            Self::Released => "released",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto_confirmed" => Some(Self::AutoConfirmed),
            "manually_confirmed" => Some(Self::ManuallyConfirmed),
            "rejected" => Some(Self::Rejected),
            "released" => Some(Self::Released),
            _ => None,
        }
    }

    pub const fn is_active(self) -> bool {
        matches!(self, Self::AutoConfirmed | Self::ManuallyConfirmed)
    }
}

/// Who committed or released a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    System,
    User(String),
}

impl Actor {
    pub const SYSTEM: &'static str = "system";

    pub fn user(user_id: &str) -> ClientResult<Self> {
        let trimmed = user_id.trim();
        if trimmed.is_empty() || trimmed == Self::SYSTEM {
            return Err(ClientError::invalid_argument(
                "Actor must be a non-empty user id other than `system`.",
            ));
        }
        Ok(Self::User(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::System => Self::SYSTEM,
            Self::User(user_id) => user_id,
        }
    }

    pub fn from_stored(value: &str) -> Self {
        if value == Self::SYSTEM {
            Self::System
        } else {
            Self::User(value.to_string())
        }
    }
}

impl Serialize for Actor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The committed (or audited) pairing of one expense with one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationLink {
    pub link_id: String,
    pub expense_id: String,
    pub transaction_id: String,
    pub status: LinkStatus,
    pub confidence_at_commit: f64,
    pub committed_at: String,
    pub committed_by: Actor,
    pub run_id: Option<String>,
    pub released_at: Option<String>,
    pub released_by: Option<Actor>,
}

/// Inclusive reconciliation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> ClientResult<Self> {
        if start > end {
            return Err(ClientError::invalid_period(
                &format_iso_date(&start),
                &format_iso_date(&end),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// The period widened by `days` on both sides, saturating at the calendar
    /// limits.
    pub fn widened(&self, days: u32) -> Self {
        let span = Days::new(u64::from(days));
        Self {
            start: self.start.checked_sub_days(span).unwrap_or(NaiveDate::MIN),
            end: self.end.checked_add_days(span).unwrap_or(NaiveDate::MAX),
        }
    }
}

pub fn format_iso_date(date: &NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

/// Strict `YYYY-MM-DD` parsing; rejects other chrono-accepted shapes.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, ISO_DATE_FORMAT).ok()
}

pub fn parse_iso_date_arg(value: &str, field: &str, command: &str) -> ClientResult<NaiveDate> {
    parse_iso_date(value).ok_or_else(|| {
        ClientError::invalid_argument_for_command(
            &format!("`{field}` must be a valid calendar date in YYYY-MM-DD format."),
            Some(command),
        )
    })
}
