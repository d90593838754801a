use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

use crate::contracts::types::{RowIssue, RowSummary};
use crate::ingest::parse::ParsedRecord;
use crate::matching::fx::minor_unit_exponent;
use crate::model::{Direction, ExpenseSource, parse_iso_date};
use crate::store::expenses::NewExpense;
use crate::store::transactions::NewTransaction;
use crate::{ClientError, ClientResult};

#[derive(Debug, Clone)]
pub(crate) struct Validated<T> {
    pub(crate) rows: Vec<T>,
    pub(crate) summary: RowSummary,
}

pub(crate) fn validate_statement_rows(
    records: Vec<ParsedRecord>,
) -> ClientResult<Validated<NewTransaction>> {
    validate_all(records, validate_statement_row)
        .map_err(|(summary, issues)| ClientError::statement_validation_failed(summary, issues))
}

pub(crate) fn validate_expense_rows(
    records: Vec<ParsedRecord>,
) -> ClientResult<Validated<NewExpense>> {
    validate_all(records, validate_expense_row)
        .map_err(|(summary, issues)| ClientError::expense_validation_failed(summary, issues))
}

fn validate_all<T>(
    records: Vec<ParsedRecord>,
    validate_row: fn(ParsedRecord, &mut Vec<RowIssue>) -> Option<T>,
) -> Result<Validated<T>, (RowSummary, Vec<RowIssue>)> {
    let total_rows = records.len();
    let mut rows = Vec::new();
    let mut issues = Vec::new();

    for record in records {
        let mut row_issues = Vec::new();
        match validate_row(record, &mut row_issues) {
            Some(row) if row_issues.is_empty() => rows.push(row),
            _ => issues.extend(row_issues),
        }
    }

    let summary = RowSummary {
        rows_read: count(total_rows),
        rows_valid: count(rows.len()),
        rows_invalid: count(
            issues
                .iter()
                .map(|issue| issue.row)
                .collect::<HashSet<i64>>()
                .len(),
        ),
        inserted: 0,
    };

    if !issues.is_empty() {
        return Err((summary, issues));
    }
    Ok(Validated { rows, summary })
}

fn validate_statement_row(
    mut record: ParsedRecord,
    issues: &mut Vec<RowIssue>,
) -> Option<NewTransaction> {
    let row = record.row;
    let posted_date = validate_date(row, "posted_date", record.take("posted_date"), issues);
    let currency = validate_currency(row, record.take("currency"), issues);
    let amount = validate_amount(row, record.take("amount"), currency.as_deref(), issues);
    let mcc = validate_mcc(row, record.take("mcc"), issues);
    let counterparty_text = normalize_optional(record.take("counterparty_text")).unwrap_or_default();
    let external_ref = normalize_optional(record.take("external_ref"));

    Some(NewTransaction {
        posted_date: posted_date?,
        amount: amount?,
        currency: currency?,
        counterparty_text,
        mcc,
        external_ref,
    })
}

fn validate_expense_row(mut record: ParsedRecord, issues: &mut Vec<RowIssue>) -> Option<NewExpense> {
    let row = record.row;
    let user_id = validate_required_string(
        row,
        "user_id",
        record.take("user_id"),
        issues,
        "user_id must be present and non-empty.",
    );
    let date_local = validate_date(row, "date_local", record.take("date_local"), issues);
    let currency = validate_currency(row, record.take("currency"), issues);
    let amount = validate_amount(row, record.take("amount"), currency.as_deref(), issues);
    let amount_cents = amount.and_then(|value| match u64::try_from(value) {
        Ok(unsigned) => Some(unsigned),
        Err(_) => {
            issues.push(RowIssue {
                row,
                field: "amount".to_string(),
                code: "negative_amount".to_string(),
                description: "amount must not be negative; set direction to `credit` for refunds."
                    .to_string(),
                expected: Some("number >= 0".to_string()),
                received: Some(value.to_string()),
            });
            None
        }
    });
    let direction = validate_enum(
        row,
        "direction",
        record.take("direction"),
        Direction::Debit,
        Direction::parse,
        "debit|credit",
        issues,
    );
    let source = validate_enum(
        row,
        "source",
        record.take("source"),
        ExpenseSource::Manual,
        ExpenseSource::parse,
        "manual|ocr|qr_bill|payslip",
        issues,
    );
    let vat_breakdown = validate_vat_breakdown(row, record.take("vat_breakdown"), issues);
    let merchant_text = normalize_optional(record.take("merchant_text")).unwrap_or_default();
    let category_code = normalize_optional(record.take("category_code"));

    Some(NewExpense {
        user_id: user_id?,
        date_local: date_local?,
        amount_cents: amount_cents?,
        direction: direction?,
        currency: currency?,
        merchant_text,
        category_code,
        source: source?,
        vat_breakdown: vat_breakdown?,
    })
}

fn validate_required_string(
    row: i64,
    field: &str,
    value: Option<String>,
    issues: &mut Vec<RowIssue>,
    description: &str,
) -> Option<String> {
    let normalized = normalize_optional(value);
    if normalized.is_none() {
        issues.push(missing_field(row, field, description, "non-empty string"));
    }
    normalized
}

fn validate_date(
    row: i64,
    field: &str,
    value: Option<String>,
    issues: &mut Vec<RowIssue>,
) -> Option<NaiveDate> {
    let Some(candidate) = normalize_optional(value) else {
        issues.push(missing_field(
            row,
            field,
            &format!("{field} must be present and non-empty."),
            "YYYY-MM-DD",
        ));
        return None;
    };

    let parsed = parse_iso_date(&candidate);
    if parsed.is_none() {
        issues.push(RowIssue {
            row,
            field: field.to_string(),
            code: "invalid_date".to_string(),
            description: format!("{field} must be a calendar date in YYYY-MM-DD; got \"{candidate}\""),
            expected: Some("YYYY-MM-DD".to_string()),
            received: Some(candidate),
        });
    }
    parsed
}

/// Parses a major-unit decimal into signed minor units of `currency`.
fn validate_amount(
    row: i64,
    value: Option<String>,
    currency: Option<&str>,
    issues: &mut Vec<RowIssue>,
) -> Option<i64> {
    let Some(candidate) = normalize_optional(value) else {
        issues.push(missing_field(
            row,
            "amount",
            "amount must be present and non-empty.",
            "number (e.g. -27.50)",
        ));
        return None;
    };

    let invalid_number = |candidate: String| RowIssue {
        row,
        field: "amount".to_string(),
        code: "invalid_number".to_string(),
        description: format!("amount must be numeric; got \"{candidate}\""),
        expected: Some("number (e.g. -27.50)".to_string()),
        received: Some(candidate),
    };

    let parsed = Decimal::from_str(&candidate).or_else(|_| Decimal::from_scientific(&candidate));
    let Ok(amount) = parsed else {
        issues.push(invalid_number(candidate));
        return None;
    };

    let exponent = currency.map_or(2, minor_unit_exponent);
    let scale = amount.normalize().scale();
    if scale > exponent {
        issues.push(RowIssue {
            row,
            field: "amount".to_string(),
            code: "invalid_amount_scale".to_string(),
            description: format!(
                "amount must use at most {exponent} decimal places; got {scale} decimal places."
            ),
            expected: Some(format!("number with <= {exponent} decimal places")),
            received: Some(candidate),
        });
        return None;
    }

    let minor = Decimal::from(10_i64.pow(exponent))
        .checked_mul(amount)
        .and_then(|value| value.to_i64());
    if minor.is_none() {
        issues.push(invalid_number(candidate));
    }
    minor
}

fn validate_currency(
    row: i64,
    value: Option<String>,
    issues: &mut Vec<RowIssue>,
) -> Option<String> {
    let Some(candidate) = normalize_optional(value) else {
        issues.push(missing_field(
            row,
            "currency",
            "currency must be present and non-empty.",
            "ISO 4217 code (e.g. CHF)",
        ));
        return None;
    };

    let upper = candidate.to_ascii_uppercase();
    if upper.len() != 3 || !upper.bytes().all(|byte| byte.is_ascii_uppercase()) {
        issues.push(RowIssue {
            row,
            field: "currency".to_string(),
            code: "invalid_currency".to_string(),
            description: format!("currency must be a three-letter ISO 4217 code; got \"{candidate}\""),
            expected: Some("ISO 4217 code (e.g. CHF)".to_string()),
            received: Some(candidate),
        });
        return None;
    }
    Some(upper)
}

fn validate_mcc(row: i64, value: Option<String>, issues: &mut Vec<RowIssue>) -> Option<String> {
    let candidate = normalize_optional(value)?;
    if candidate.len() != 4 || !candidate.bytes().all(|byte| byte.is_ascii_digit()) {
        issues.push(RowIssue {
            row,
            field: "mcc".to_string(),
            code: "invalid_mcc".to_string(),
            description: format!("mcc must be four digits; got \"{candidate}\""),
            expected: Some("four digits (e.g. 5411)".to_string()),
            received: Some(candidate),
        });
        return None;
    }
    Some(candidate)
}

/// Optional enumerated field; absent means `default`.
fn validate_enum<T: Copy>(
    row: i64,
    field: &str,
    value: Option<String>,
    default: T,
    parse: fn(&str) -> Option<T>,
    expected: &str,
    issues: &mut Vec<RowIssue>,
) -> Option<T> {
    let Some(candidate) = normalize_optional(value) else {
        return Some(default);
    };
    let parsed = parse(&candidate.to_ascii_lowercase());
    if parsed.is_none() {
        issues.push(RowIssue {
            row,
            field: field.to_string(),
            code: "invalid_value".to_string(),
            description: format!("{field} must be one of {expected}; got \"{candidate}\""),
            expected: Some(expected.to_string()),
            received: Some(candidate),
        });
    }
    parsed
}

/// Outer `None` means invalid; `Some(None)` means absent.
fn validate_vat_breakdown(
    row: i64,
    value: Option<String>,
    issues: &mut Vec<RowIssue>,
) -> Option<Option<Value>> {
    let Some(candidate) = normalize_optional(value) else {
        return Some(None);
    };
    match serde_json::from_str::<Value>(&candidate) {
        Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Some(Some(parsed)),
        _ => {
            issues.push(RowIssue {
                row,
                field: "vat_breakdown".to_string(),
                code: "invalid_json".to_string(),
                description: "vat_breakdown must be a JSON object or array.".to_string(),
                expected: Some("JSON object or array".to_string()),
                received: Some(candidate),
            });
            None
        }
    }
}

fn missing_field(row: i64, field: &str, description: &str, expected: &str) -> RowIssue {
    RowIssue {
        row,
        field: field.to_string(),
        code: "missing_required_field".to_string(),
        description: description.to_string(),
        expected: Some(expected.to_string()),
        received: Some(String::new()),
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use crate::ingest::parse::ParsedRecord;
    use crate::model::{Direction, ExpenseSource};

    use super::{validate_expense_rows, validate_statement_rows};

    fn statement_line(row: i64, date: &str, amount: &str, currency: &str) -> ParsedRecord {
        ParsedRecord::new(row)
            .with("posted_date", Some(date.to_string()))
            .with("amount", Some(amount.to_string()))
            .with("currency", Some(currency.to_string()))
    }

    #[test]
    fn statement_amounts_become_signed_minor_units() {
        let records = vec![
            statement_line(1, "2024-09-14", "-27.50", "chf")
                .with("counterparty_text", Some("  MIGROS ZUERICH ".to_string()))
                .with("mcc", Some("5411".to_string())),
            statement_line(2, "2024-09-15", "1500", "JPY"),
        ];
        let validated = validate_statement_rows(records);
        assert!(validated.is_ok());
        if let Ok(validated) = validated {
            assert_eq!(validated.summary.rows_valid, 2);
            assert_eq!(validated.rows[0].amount, -2750);
            assert_eq!(validated.rows[0].currency, "CHF");
            assert_eq!(validated.rows[0].counterparty_text, "MIGROS ZUERICH");
            assert_eq!(validated.rows[0].mcc.as_deref(), Some("5411"));
            assert_eq!(validated.rows[1].amount, 1500);
        }
    }

    #[test]
    fn invalid_rows_are_reported_together_and_nothing_is_returned() {
        let records = vec![
            statement_line(1, "2024-09-14", "-27.505", "CHF"),
            statement_line(2, "14.09.2024", "abc", "SWISS"),
            statement_line(3, "2024-09-14", "-1.00", "CHF").with("mcc", Some("54".to_string())),
            statement_line(4, "2024-09-14", "-1.00", "CHF"),
        ];
        let validated = validate_statement_rows(records);
        assert!(validated.is_err());
        if let Err(error) = validated {
            assert_eq!(error.code, "statement_validation_failed");
            let data = error.data.unwrap_or_default();
            assert_eq!(data["summary"]["rows_read"], 4);
            assert_eq!(data["summary"]["rows_invalid"], 3);
            let codes = data["issues"]
                .as_array()
                .map(|issues| {
                    issues
                        .iter()
                        .filter_map(|issue| issue["code"].as_str().map(str::to_string))
                        .collect::<Vec<String>>()
                })
                .unwrap_or_default();
            assert!(codes.contains(&"invalid_amount_scale".to_string()));
            assert!(codes.contains(&"invalid_date".to_string()));
            assert!(codes.contains(&"invalid_currency".to_string()));
            assert!(codes.contains(&"invalid_mcc".to_string()));
        }
    }

    #[test]
    fn expense_defaults_to_manual_debit() {
        let record = ParsedRecord::new(1)
            .with("user_id", Some("u1".to_string()))
            .with("date_local", Some("2024-09-14".to_string()))
            .with("amount", Some("27.5".to_string()))
            .with("currency", Some("CHF".to_string()))
            .with("merchant_text", Some("Migros".to_string()));
        let validated = validate_expense_rows(vec![record]);
        assert!(validated.is_ok());
        if let Ok(validated) = validated {
            let expense = &validated.rows[0];
            assert_eq!(expense.amount_cents, 2750);
            assert_eq!(expense.direction, Direction::Debit);
            assert_eq!(expense.source, ExpenseSource::Manual);
            assert!(expense.vat_breakdown.is_none());
        }
    }

    #[test]
    fn expense_rejects_negative_amounts_and_unknown_sources() {
        let record = ParsedRecord::new(1)
            .with("user_id", Some("u1".to_string()))
            .with("date_local", Some("2024-09-14".to_string()))
            .with("amount", Some("-27.50".to_string()))
            .with("currency", Some("CHF".to_string()))
            .with("source", Some("email".to_string()))
            .with("vat_breakdown", Some("8.1%".to_string()));
        let validated = validate_expense_rows(vec![record]);
        assert!(validated.is_err());
        if let Err(error) = validated {
            assert_eq!(error.code, "expense_validation_failed");
            let data = error.data.unwrap_or_default();
            assert_eq!(data["issues"].as_array().map(Vec::len), Some(3));
            assert_eq!(data["summary"]["rows_invalid"], 1);
        }
    }
}
