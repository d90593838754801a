use std::collections::HashMap;

use serde_json::Value;

use crate::ingest::invalid_input_error;
use crate::{ClientError, ClientResult};

/// Field names one input kind accepts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordSchema {
    pub(crate) noun: &'static str,
    pub(crate) required: &'static [&'static str],
    pub(crate) optional: &'static [&'static str],
}

pub(crate) const STATEMENT_SCHEMA: RecordSchema = RecordSchema {
    noun: "statement line",
    required: &["posted_date", "amount", "currency"],
    optional: &["counterparty_text", "mcc", "external_ref"],
};

pub(crate) const EXPENSE_SCHEMA: RecordSchema = RecordSchema {
    noun: "expense",
    required: &["user_id", "date_local", "amount", "currency"],
    optional: &[
        "direction",
        "merchant_text",
        "category_code",
        "source",
        "vat_breakdown",
    ],
};

/// One input row with its raw field text, 1-based.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedRecord {
    pub(crate) row: i64,
    fields: HashMap<String, String>,
}

impl ParsedRecord {
    pub(crate) fn new(row: i64) -> Self {
        Self {
            row,
            fields: HashMap::new(),
        }
    }

    pub(crate) fn with(mut self, field: &str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.fields.insert(field.to_string(), value);
        }
        self
    }

    pub(crate) fn take(&mut self, field: &str) -> Option<String> {
        self.fields.remove(field)
    }
}

pub(crate) fn parse_source(content: &str, schema: RecordSchema) -> ClientResult<Vec<ParsedRecord>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(invalid_input_error("Input source is empty."));
    }

    if looks_like_ndjson(trimmed) {
        return Err(ClientError::invalid_import_format(
            "NDJSON is not supported. Provide a JSON array or CSV.",
            "ndjson",
        ));
    }

    if trimmed.starts_with('[') {
        return parse_json_array(trimmed, schema);
    }

    if looks_like_csv(trimmed) {
        return parse_csv(trimmed, schema);
    }

    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return Err(ClientError::invalid_import_format(
            &format!("JSON input must be a top-level array of {} objects.", schema.noun),
            "json_non_array",
        ));
    }

    Err(ClientError::invalid_import_format(
        "Unsupported input format. Provide a JSON array or CSV with headers.",
        "unknown",
    ))
}

fn parse_json_array(content: &str, schema: RecordSchema) -> ClientResult<Vec<ParsedRecord>> {
    let parsed = serde_json::from_str::<Value>(content)
        .map_err(|_| invalid_input_error("Invalid JSON input. Provide a valid JSON array."))?;

    let Some(items) = parsed.as_array() else {
        return Err(invalid_input_error(&format!(
            "JSON input must be a top-level array of {} objects.",
            schema.noun
        )));
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(object) = item.as_object() else {
            return Err(invalid_input_error(&format!(
                "JSON array entries must all be {} objects.",
                schema.noun
            )));
        };

        let mut record = ParsedRecord::new(row_number(index));
        for field in schema.required.iter().chain(schema.optional) {
            record = record.with(field, read_optional_string(object.get(*field)));
        }
        records.push(record);
    }

    Ok(records)
}

fn parse_csv(content: &str, schema: RecordSchema) -> ClientResult<Vec<ParsedRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|_| invalid_input_error("CSV header row is missing or unreadable."))?
        .iter()
        .map(|value| value.trim().to_string())
        .collect::<Vec<String>>();

    if !headers_are_valid(&headers, schema) {
        return Err(ClientError::import_schema_mismatch(
            schema.required.iter().map(|name| name.to_string()).collect(),
            schema.optional.iter().map(|name| name.to_string()).collect(),
            headers,
        ));
    }

    let mut records = Vec::new();
    for (row_index, result_row) in reader.records().enumerate() {
        let values =
            result_row.map_err(|_| invalid_input_error("CSV rows are malformed or not UTF-8."))?;

        let mut record = ParsedRecord::new(row_number(row_index));
        for (header, value) in headers.iter().zip(values.iter()) {
            record = record.with(header, Some(value.to_string()));
        }
        records.push(record);
    }

    Ok(records)
}

fn row_number(index: usize) -> i64 {
    i64::try_from(index).map_or(i64::MAX, |value| value.saturating_add(1))
}

fn read_optional_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

fn looks_like_ndjson(content: &str) -> bool {
    let lines = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<&str>>();
    if lines.len() < 2 {
        return false;
    }

    lines.iter().all(|line| {
        serde_json::from_str::<Value>(line.trim())
            .map(|value| value.is_object())
            .unwrap_or(false)
    })
}

fn looks_like_csv(content: &str) -> bool {
    let Some(first_line) = content.lines().find(|line| !line.trim().is_empty()) else {
        return false;
    };
    first_line.contains(',')
}

fn headers_are_valid(actual_headers: &[String], schema: RecordSchema) -> bool {
    let has_required = schema
        .required
        .iter()
        .all(|required| actual_headers.iter().any(|header| header == required));
    let all_known = actual_headers.iter().all(|header| {
        schema.required.contains(&header.as_str()) || schema.optional.contains(&header.as_str())
    });
    has_required && all_known
}
