use std::io;

use serde_json::Value;

use super::format::{
    Column, array_field, format_minor, int_field, key_value_rows, render_table_or_blocks,
    terminal_width, text_field,
};

pub fn render_statement_import(data: &Value) -> io::Result<String> {
    let summary = data.get("summary").cloned().unwrap_or(Value::Null);
    let mut lines = vec!["Statement imported.".to_string(), String::new()];
    lines.extend(key_value_rows(
        &[
            ("Statement:", text_field(data, "statement_id")),
            ("User:", text_field(data, "user_id")),
            ("Account:", text_field(data, "account_ref")),
            ("Statement ref:", text_field(data, "statement_ref")),
            ("Source:", source_label(data)),
            ("Rows read:", int_field(&summary, "rows_read").to_string()),
            ("Inserted:", int_field(&summary, "inserted").to_string()),
        ],
        2,
    ));

    let voided = array_field(data, "voided_statement_ids");
    if !voided.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "Replaced {} earlier import(s) of this statement ref; {} line(s) voided.",
            voided.len(),
            int_field(data, "voided_transactions")
        ));
        let superseded = int_field(data, "superseded_review_entries");
        if superseded > 0 {
            lines.push(format!(
                "Closed {superseded} pending review entr(ies) that proposed a voided line; reconcile again to re-propose."
            ));
        }
    }

    if let Some(next_step) = data.get("next_step") {
        lines.push(String::new());
        lines.push("What to do next:".to_string());
        lines.push(format!("  {}", text_field(next_step, "command")));
    }
    Ok(lines.join("\n"))
}

pub fn render_statement_list(data: &Value) -> io::Result<String> {
    let statements = array_field(data, "statements");
    if statements.is_empty() {
        return Ok(format!(
            "No statements imported for {} yet.",
            text_field(data, "user_id")
        ));
    }

    let columns = [
        Column::left("Statement"),
        Column::left("Account"),
        Column::left("Ref"),
        Column::left("Imported"),
        Column::right("Lines"),
        Column::left("Status"),
    ];
    let rows = statements
        .iter()
        .map(|statement| {
            vec![
                text_field(statement, "statement_id"),
                text_field(statement, "account_ref"),
                text_field(statement, "statement_ref"),
                text_field(statement, "imported_at"),
                int_field(statement, "inserted").to_string(),
                if statement.get("voided_at").is_some_and(|value| !value.is_null()) {
                    "voided".to_string()
                } else {
                    "live".to_string()
                },
            ]
        })
        .collect::<Vec<Vec<String>>>();

    let mut lines = vec![format!("Statements for {}:", text_field(data, "user_id")), String::new()];
    lines.extend(render_table_or_blocks(&columns, &rows, terminal_width(), "Statement"));
    Ok(lines.join("\n"))
}

pub fn render_expense_add(data: &Value) -> io::Result<String> {
    let expense = data.get("expense").cloned().unwrap_or(Value::Null);
    let mut lines = vec!["Expense recorded.".to_string(), String::new()];
    lines.extend(key_value_rows(
        &[
            ("Expense:", text_field(&expense, "expense_id")),
            ("User:", text_field(&expense, "user_id")),
            ("Date:", text_field(&expense, "date_local")),
            ("Amount:", expense_amount(&expense)),
            ("Merchant:", text_field(&expense, "merchant_text")),
            ("Source:", text_field(&expense, "source")),
        ],
        2,
    ));
    Ok(lines.join("\n"))
}

pub fn render_expense_import(data: &Value) -> io::Result<String> {
    let summary = data.get("summary").cloned().unwrap_or(Value::Null);
    let mut lines = vec!["Expenses imported.".to_string(), String::new()];
    lines.extend(key_value_rows(
        &[
            ("Source:", source_label(data)),
            ("Rows read:", int_field(&summary, "rows_read").to_string()),
            ("Inserted:", int_field(&summary, "inserted").to_string()),
        ],
        2,
    ));
    Ok(lines.join("\n"))
}

pub fn render_expense_list(data: &Value) -> io::Result<String> {
    let expenses = array_field(data, "rows");
    if expenses.is_empty() {
        return Ok(format!(
            "No expenses for {} in the requested range.",
            text_field(data, "user_id")
        ));
    }

    let columns = [
        Column::left("Expense"),
        Column::left("Date"),
        Column::right("Amount"),
        Column::left("Merchant"),
        Column::left("Link"),
    ];
    let rows = expenses
        .iter()
        .map(|expense| {
            vec![
                text_field(expense, "expense_id"),
                text_field(expense, "date_local"),
                expense_amount(expense),
                text_field(expense, "merchant_text"),
                text_field(expense, "active_link_id"),
            ]
        })
        .collect::<Vec<Vec<String>>>();

    let mut lines = vec![
        format!(
            "Expenses for {} ({} to {}):",
            text_field(data, "user_id"),
            text_field(data, "from"),
            text_field(data, "to")
        ),
        String::new(),
    ];
    lines.extend(render_table_or_blocks(&columns, &rows, terminal_width(), "Expense"));
    Ok(lines.join("\n"))
}

pub fn render_fx_set(data: &Value) -> io::Result<String> {
    let rate = data.get("rate").cloned().unwrap_or(Value::Null);
    Ok(format!(
        "Rate stored: 1 {} = {} {} on {} ({}).",
        text_field(&rate, "base"),
        text_field(&rate, "rate"),
        text_field(&rate, "quote"),
        text_field(&rate, "as_of"),
        text_field(&rate, "source")
    ))
}

pub fn render_fx_list(data: &Value) -> io::Result<String> {
    let rates = array_field(data, "rates");
    if rates.is_empty() {
        return Ok("No FX rates stored. Add one with `umbra fx set`.".to_string());
    }

    let columns = [
        Column::left("Base"),
        Column::left("Quote"),
        Column::left("As of"),
        Column::right("Rate"),
        Column::left("Source"),
    ];
    let rows = rates
        .iter()
        .map(|rate| {
            vec![
                text_field(rate, "base"),
                text_field(rate, "quote"),
                text_field(rate, "as_of"),
                text_field(rate, "rate"),
                text_field(rate, "source"),
            ]
        })
        .collect::<Vec<Vec<String>>>();

    let mut lines = vec!["FX rates:".to_string(), String::new()];
    lines.extend(render_table_or_blocks(&columns, &rows, terminal_width(), "Rate"));
    Ok(lines.join("\n"))
}

pub fn render_alias_set(data: &Value) -> io::Result<String> {
    let alias = data.get("alias").cloned().unwrap_or(Value::Null);
    Ok(format!(
        "Alias stored: {} now matches as {}.",
        text_field(&alias, "alias"),
        text_field(&alias, "canonical")
    ))
}

pub fn render_alias_list(data: &Value) -> io::Result<String> {
    let aliases = array_field(data, "aliases");
    if aliases.is_empty() {
        return Ok("No merchant aliases stored. Add one with `umbra alias set`.".to_string());
    }

    let columns = [
        Column::left("Alias"),
        Column::left("Canonical"),
        Column::left("Updated"),
    ];
    let rows = aliases
        .iter()
        .map(|alias| {
            vec![
                text_field(alias, "alias"),
                text_field(alias, "canonical"),
                text_field(alias, "updated_at"),
            ]
        })
        .collect::<Vec<Vec<String>>>();

    let mut lines = vec!["Merchant aliases:".to_string(), String::new()];
    lines.extend(render_table_or_blocks(&columns, &rows, terminal_width(), "Canonical"));
    Ok(lines.join("\n"))
}

fn expense_amount(expense: &Value) -> String {
    let cents = int_field(expense, "amount_cents");
    let signed = if text_field(expense, "direction") == "credit" {
        cents
    } else {
        -cents
    };
    format_minor(signed, &text_field(expense, "currency"))
}

fn source_label(data: &Value) -> String {
    match data.get("source_ref").and_then(Value::as_str) {
        Some(reference) => format!("{} ({reference})", text_field(data, "source_kind")),
        None => text_field(data, "source_kind"),
    }
}
