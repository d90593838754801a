use serde_json::Value;
use umbra_accountant::ClientError;

/// Row issues beyond this many are summarised in one line.
const MAX_ISSUES_SHOWN: usize = 20;

pub fn render_error(error: &ClientError) -> String {
    let mut lines = vec![
        "Something went wrong, but it's easy to fix.".to_string(),
        String::new(),
        format!("  Error:    {}", error.code),
        format!("  Details:  {}", error.message),
    ];

    let issues = error
        .data
        .as_ref()
        .and_then(|data| data.get("issues"))
        .and_then(Value::as_array);
    if let Some(issues) = issues
        && !issues.is_empty()
    {
        lines.push(String::new());
        lines.push("Issues:".to_string());
        for issue in issues.iter().take(MAX_ISSUES_SHOWN) {
            lines.push(format!(
                "  row {} {}: {} ({})",
                issue.get("row").and_then(Value::as_i64).unwrap_or(0),
                issue.get("field").and_then(Value::as_str).unwrap_or("-"),
                issue.get("description").and_then(Value::as_str).unwrap_or(""),
                issue.get("code").and_then(Value::as_str).unwrap_or("")
            ));
        }
        if issues.len() > MAX_ISSUES_SHOWN {
            lines.push(format!(
                "  ... and {} more; rerun with --json for the full list.",
                issues.len() - MAX_ISSUES_SHOWN
            ));
        }
    }

    lines.push(String::new());
    lines.push("What to do next:".to_string());
    if error.recovery_steps.is_empty() {
        lines.push("  1. Retry the command.".to_string());
    } else {
        for (index, step) in error.recovery_steps.iter().enumerate() {
            lines.push(format!("  {}. {step}", index + 1));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use umbra_accountant::ClientError;

    use super::render_error;

    #[test]
    fn renders_standard_error_layout() {
        let error = ClientError::invalid_argument_with_recovery(
            "bad input",
            vec!["run umbra --help".to_string()],
        );

        let rendered = render_error(&error);
        assert!(rendered.starts_with("Something went wrong, but it's easy to fix."));
        assert!(rendered.contains("  Error:    invalid_argument"));
        assert!(rendered.contains("  Details:  bad input"));
        assert!(rendered.contains("What to do next:"));
        assert!(rendered.contains("  1. run umbra --help"));
        assert!(!rendered.contains("Issues:"));
    }

    #[test]
    fn lists_row_issues_when_present() {
        let error = ClientError::new(
            "statement_validation_failed",
            "Statement input failed validation.",
            vec!["Fix the listed issues in your source file.".to_string()],
        )
        .with_data(json!({
            "issues": [
                {"row": 2, "field": "posted_date", "code": "invalid_date",
                 "description": "posted_date must be YYYY-MM-DD"}
            ]
        }));

        let rendered = render_error(&error);
        assert!(rendered.contains("Issues:"));
        assert!(rendered.contains("  row 2 posted_date: posted_date must be YYYY-MM-DD (invalid_date)"));
    }
}
