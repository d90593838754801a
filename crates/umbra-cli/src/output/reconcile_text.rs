use std::io;

use serde_json::Value;

use super::format::{
    Column, array_field, float_field, format_confidence, int_field, key_value_rows,
    render_table_or_blocks, terminal_width, text_field,
};

pub fn render_reconcile_run(data: &Value) -> io::Result<String> {
    let counts = data.get("counts").cloned().unwrap_or(Value::Null);
    let headline = if data.get("cancelled").and_then(Value::as_bool) == Some(true) {
        "Reconciliation cancelled; committed links were kept."
    } else {
        "Reconciliation complete."
    };

    let mut lines = vec![headline.to_string(), String::new()];
    lines.extend(key_value_rows(
        &[
            ("Run:", text_field(data, "run_id")),
            ("User:", text_field(data, "user_id")),
            (
                "Period:",
                format!(
                    "{} to {}",
                    text_field(data, "period_start"),
                    text_field(data, "period_end")
                ),
            ),
            (
                "Policy:",
                format!(
                    "{} (auto >= {}, review >= {})",
                    text_field(data, "policy_version"),
                    format_confidence(float_field(data, "auto_match_threshold")),
                    format_confidence(float_field(data, "review_floor"))
                ),
            ),
        ],
        2,
    ));

    lines.push(String::new());
    lines.push("Results:".to_string());
    lines.extend(key_value_rows(
        &[
            ("Auto-matched:", int_field(&counts, "auto_matched").to_string()),
            ("Queued for review:", int_field(&counts, "queued").to_string()),
            (
                "Unmatched expenses:",
                int_field(&counts, "unmatched_expenses").to_string(),
            ),
            (
                "Unmatched statement lines:",
                int_field(&counts, "unmatched_transactions").to_string(),
            ),
            (
                "Skipped, no FX rate:",
                int_field(&counts, "excluded_missing_fx").to_string(),
            ),
            ("Conflicts:", int_field(&counts, "conflicts").to_string()),
        ],
        2,
    ));

    if int_field(&counts, "queued") > 0 {
        lines.push(String::new());
        lines.push("What to do next:".to_string());
        lines.push(format!(
            "  umbra review list --user {}",
            text_field(data, "user_id")
        ));
    }
    Ok(lines.join("\n"))
}

pub fn render_review_list(data: &Value) -> io::Result<String> {
    let entries = array_field(data, "entries");
    if entries.is_empty() {
        return Ok(format!(
            "No pending review entries for {}.",
            text_field(data, "user_id")
        ));
    }

    let mut lines = vec![
        format!(
            "{} pending review entr{} for {}:",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" },
            text_field(data, "user_id")
        ),
        String::new(),
    ];

    let columns = [
        Column::left("#"),
        Column::left("Transaction"),
        Column::right("Confidence"),
        Column::right("Days"),
        Column::left("Reasons"),
    ];
    for (index, entry) in entries.iter().enumerate() {
        if index > 0 {
            lines.push(String::new());
        }
        lines.push(format!(
            "  {}  expense {}",
            text_field(entry, "entry_id"),
            text_field(entry, "expense_id")
        ));
        let rows = array_field(entry, "candidates")
            .iter()
            .enumerate()
            .map(|(rank, candidate)| {
                vec![
                    (rank + 1).to_string(),
                    text_field(candidate, "transaction_id"),
                    format_confidence(float_field(candidate, "confidence")),
                    format!("{:+}", int_field(candidate, "date_delta_days")),
                    reason_list(candidate),
                ]
            })
            .collect::<Vec<Vec<String>>>();
        lines.extend(render_table_or_blocks(&columns, &rows, terminal_width(), "Candidate"));
    }

    lines.push(String::new());
    lines.push("What to do next:".to_string());
    lines.push("  umbra review decide <entry_id> confirm --actor <user>".to_string());
    lines.push(
        "  umbra review decide <entry_id> confirm --transaction <id> --actor <user>".to_string(),
    );
    lines.push("  umbra review decide <entry_id> reject --actor <user>".to_string());
    Ok(lines.join("\n"))
}

pub fn render_review_decide(data: &Value) -> io::Result<String> {
    let entry = data.get("entry").cloned().unwrap_or(Value::Null);
    let mut lines = Vec::new();
    match data.get("link").filter(|link| !link.is_null()) {
        Some(link) => {
            lines.push(format!(
                "Entry {} confirmed by {}.",
                text_field(&entry, "entry_id"),
                text_field(&entry, "decided_by")
            ));
            lines.push(String::new());
            lines.extend(link_rows(link));
        }
        None => {
            lines.push(format!(
                "Entry {} rejected by {}; {} pair(s) will not be proposed again.",
                text_field(&entry, "entry_id"),
                text_field(&entry, "decided_by"),
                array_field(data, "rejected_links").len()
            ));
        }
    }
    Ok(lines.join("\n"))
}

pub fn render_link_release(data: &Value) -> io::Result<String> {
    let link = data.get("link").cloned().unwrap_or(Value::Null);
    let mut lines = vec![
        format!(
            "Link released; expense {} and transaction {} can match again.",
            text_field(&link, "expense_id"),
            text_field(&link, "transaction_id")
        ),
        String::new(),
    ];
    lines.extend(link_rows(&link));
    Ok(lines.join("\n"))
}

pub fn render_link_show(data: &Value) -> io::Result<String> {
    match data.get("link").filter(|link| !link.is_null()) {
        Some(link) => Ok(link_rows(link).join("\n")),
        None => {
            let target = match data.get("expense_id").and_then(Value::as_str) {
                Some(expense_id) => format!("expense {expense_id}"),
                None => format!("transaction {}", text_field(data, "transaction_id")),
            };
            Ok(format!("No active link for {target}."))
        }
    }
}

pub fn render_link_list(data: &Value) -> io::Result<String> {
    let links = array_field(data, "links");
    if links.is_empty() {
        return Ok(format!("No links for {}.", text_field(data, "user_id")));
    }

    let columns = [
        Column::left("Link"),
        Column::left("Expense"),
        Column::left("Transaction"),
        Column::left("Status"),
        Column::right("Confidence"),
        Column::left("By"),
    ];
    let rows = links
        .iter()
        .map(|link| {
            vec![
                text_field(link, "link_id"),
                text_field(link, "expense_id"),
                text_field(link, "transaction_id"),
                text_field(link, "status"),
                format_confidence(float_field(link, "confidence_at_commit")),
                text_field(link, "committed_by"),
            ]
        })
        .collect::<Vec<Vec<String>>>();

    let mut lines = vec![format!("Links for {}:", text_field(data, "user_id")), String::new()];
    lines.extend(render_table_or_blocks(&columns, &rows, terminal_width(), "Link"));
    Ok(lines.join("\n"))
}

fn link_rows(link: &Value) -> Vec<String> {
    let mut entries = vec![
        ("Link:", text_field(link, "link_id")),
        ("Expense:", text_field(link, "expense_id")),
        ("Transaction:", text_field(link, "transaction_id")),
        ("Status:", text_field(link, "status")),
        (
            "Confidence:",
            format_confidence(float_field(link, "confidence_at_commit")),
        ),
        (
            "Committed:",
            format!(
                "{} by {}",
                text_field(link, "committed_at"),
                text_field(link, "committed_by")
            ),
        ),
    ];
    if link.get("released_at").is_some_and(|value| !value.is_null()) {
        entries.push((
            "Released:",
            format!(
                "{} by {}",
                text_field(link, "released_at"),
                text_field(link, "released_by")
            ),
        ));
    }
    key_value_rows(&entries, 2)
}

fn reason_list(candidate: &Value) -> String {
    let reasons = array_field(candidate, "reasons")
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<&str>>();
    if reasons.is_empty() {
        "-".to_string()
    } else {
        reasons.join(", ")
    }
}
