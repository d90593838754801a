use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::Value;
use tempfile::{TempDir, tempdir};

const USER: &str = "u_anna";

struct CliOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
}

fn test_home() -> TempDir {
    let temp = tempdir();
    assert!(temp.is_ok());
    match temp {
        Ok(dir) => dir,
        Err(error) => panic!("tempdir failed: {error}"),
    }
}

fn run_cli_in_home_with_input(home: &Path, args: &[&str], input: Option<&str>) -> CliOutput {
    let mut command = Command::new(env!("CARGO_BIN_EXE_umbra"));
    command.args(args);
    command.env("UMBRA_HOME", home);
    command.env_remove("UMBRA_LOG");
    command.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let child_spawn = command.spawn();
    assert!(child_spawn.is_ok());
    if let Ok(mut child) = child_spawn {
        if let Some(body) = input
            && let Some(mut pipe) = child.stdin.take()
        {
            let write_result = pipe.write_all(body.as_bytes());
            assert!(write_result.is_ok());
        }

        let output = child.wait_with_output();
        assert!(output.is_ok());
        if let Ok(result) = output {
            let stdout = String::from_utf8(result.stdout);
            assert!(stdout.is_ok());
            if let Ok(stdout_text) = stdout {
                return CliOutput {
                    success: result.status.success(),
                    code: result.status.code(),
                    stdout: stdout_text,
                };
            }
        }
    }

    CliOutput {
        success: false,
        code: None,
        stdout: String::new(),
    }
}

fn run_cli_in_home(home: &Path, args: &[&str]) -> CliOutput {
    run_cli_in_home_with_input(home, args, None)
}

fn parse_json(body: &str) -> Value {
    let parsed = serde_json::from_str::<Value>(body);
    assert!(parsed.is_ok(), "not JSON: {body}");
    parsed.unwrap_or(Value::Null)
}

fn assert_text_error_contract(body: &str, code: &str) {
    assert!(body.contains("Something went wrong, but it's easy to fix."));
    assert!(body.contains(&format!("  Error:    {code}")));
    assert!(body.contains("  Details:"));
    assert!(body.contains("What to do next:"));
}

fn assert_json_error_contract(body: &str, code: &str) -> Value {
    let payload = parse_json(body);
    assert_eq!(payload["ok"], false);
    assert_eq!(payload["error"]["code"], Value::String(code.to_string()));
    assert!(payload["error"]["message"].is_string());
    assert!(payload["error"]["recovery_steps"].is_array());
    payload
}

fn statement_json(lines: &[(&str, &str, &str)]) -> String {
    let rows = lines
        .iter()
        .map(|(date, amount, counterparty)| {
            serde_json::json!({
                "posted_date": date,
                "amount": amount,
                "currency": "CHF",
                "counterparty_text": counterparty,
            })
        })
        .collect::<Vec<Value>>();
    Value::Array(rows).to_string()
}

#[test]
fn root_command_uses_short_plaintext_help() {
    let home = test_home();
    let output = run_cli_in_home(home.path(), &[]);
    assert!(output.success);
    assert!(output.stdout.starts_with("umbra - match bank statement lines"));
    assert!(output.stdout.contains("umbra statement import --help"));
}

#[test]
fn help_and_version_return_success_output() {
    let home = test_home();
    let help = run_cli_in_home(home.path(), &["--help"]);
    assert!(help.success);
    assert!(help.stdout.contains("USAGE: umbra [--json] [--home <DIR>] <command>"));
    assert!(help.stdout.contains("umbra review decide <entry-id> confirm|reject"));

    let version = run_cli_in_home(home.path(), &["--version"]);
    assert!(version.success);
    assert!(version.stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn statement_import_help_shows_schema_and_field_rules() {
    let home = test_home();
    let output = run_cli_in_home(home.path(), &["statement", "import", "--help"]);
    assert!(output.success);
    assert!(output.stdout.contains("Statement schema:"));
    assert!(output.stdout.contains("posted_date (required)"));
    assert!(output.stdout.contains("--statement-ref"));
}

#[test]
fn bare_group_command_shows_help_with_subcommands() {
    let home = test_home();
    let output = run_cli_in_home(home.path(), &["review"]);
    assert!(output.success);
    assert!(output.stdout.contains("list"));
    assert!(output.stdout.contains("decide"));
}

#[test]
fn parse_errors_use_both_error_contracts() {
    let home = test_home();
    let text = run_cli_in_home(home.path(), &["reconcile", "--user", USER]);
    assert_eq!(text.code, Some(1));
    assert_text_error_contract(&text.stdout, "invalid_argument");
    assert!(text.stdout.contains("umbra reconcile --help"));
    assert!(!text.stdout.contains("Usage:"));

    let json = run_cli_in_home(
        home.path(),
        &["--json", "expense", "add", "--user", USER, "--date", "2024-02-30"],
    );
    assert_eq!(json.code, Some(1));
    let payload = assert_json_error_contract(&json.stdout, "invalid_argument");
    assert_eq!(payload["data"]["command_hint"], "expense add");
}

#[test]
fn runtime_errors_use_both_error_contracts() {
    let home = test_home();
    let text = run_cli_in_home(
        home.path(),
        &["reconcile", "--user", "u_nobody", "--from", "2024-09-01", "--to", "2024-09-30"],
    );
    assert_eq!(text.code, Some(1));
    assert_text_error_contract(&text.stdout, "unknown_user");

    let json = run_cli_in_home(
        home.path(),
        &["link", "release", "lnk_missing", "--actor", USER, "--json"],
    );
    assert_eq!(json.code, Some(1));
    assert_json_error_contract(&json.stdout, "link_not_found");
}

#[test]
fn statement_validation_lists_row_issues() {
    let home = test_home();
    let body = statement_json(&[
        ("2024-09-14", "-27.50", "MIGROS"),
        ("2024-09-31", "-4.20", "COOP"),
    ]);

    let text = run_cli_in_home_with_input(
        home.path(),
        &["statement", "import", "-", "--user", USER, "--account", "ch93"],
        Some(&body),
    );
    assert_eq!(text.code, Some(1));
    assert_text_error_contract(&text.stdout, "statement_validation_failed");
    assert!(text.stdout.contains("Issues:"));
    assert!(text.stdout.contains("posted_date"));

    let json = run_cli_in_home_with_input(
        home.path(),
        &["--json", "statement", "import", "-", "--user", USER, "--account", "ch93"],
        Some(&body),
    );
    let payload = assert_json_error_contract(&json.stdout, "statement_validation_failed");
    assert!(payload["data"]["issues"].as_array().is_some_and(|issues| !issues.is_empty()));

    let listed = run_cli_in_home(home.path(), &["--json", "statement", "list", "--user", USER]);
    assert!(listed.success);
    assert_eq!(
        parse_json(&listed.stdout)["data"]["statements"].as_array().map(Vec::len),
        Some(0)
    );
}

#[test]
fn import_add_reconcile_flow_in_text_and_json() {
    let home = test_home();
    let body = statement_json(&[
        ("2024-09-14", "-27.50", "MIGROS ZUERICH"),
        ("2024-09-16", "-42.00", "COOP PRONTO"),
    ]);

    let imported = run_cli_in_home_with_input(
        home.path(),
        &["statement", "import", "-", "--user", USER, "--account", "ch93", "--statement-ref", "2024-09"],
        Some(&body),
    );
    assert!(imported.success, "{}", imported.stdout);
    assert!(imported.stdout.starts_with("Statement imported."));
    assert!(imported.stdout.contains("Inserted:"));

    let exact = run_cli_in_home(
        home.path(),
        &[
            "expense", "add", "--user", USER, "--date", "2024-09-14", "--amount", "27.50",
            "--currency", "CHF", "--merchant", "Migros",
        ],
    );
    assert!(exact.success, "{}", exact.stdout);
    assert!(exact.stdout.contains("-27.50 CHF"));

    let late = run_cli_in_home(
        home.path(),
        &[
            "--json", "expense", "add", "--user", USER, "--date", "2024-09-14", "--amount",
            "42.00", "--currency", "CHF", "--merchant", "Coop", "--source", "ocr",
        ],
    );
    assert!(late.success, "{}", late.stdout);
    let late_payload = parse_json(&late.stdout);
    assert_eq!(late_payload["command"], "expense add");
    assert_eq!(late_payload["data"]["expense"]["source"], "ocr");

    let run = run_cli_in_home(
        home.path(),
        &["--json", "reconcile", "--user", USER, "--from", "2024-09-01", "--to", "2024-09-30"],
    );
    assert!(run.success, "{}", run.stdout);
    let run_payload = parse_json(&run.stdout);
    assert_eq!(run_payload["ok"], true);
    assert_eq!(run_payload["command"], "reconcile");
    assert_eq!(run_payload["data"]["counts"]["auto_matched"], 1);
    assert_eq!(run_payload["data"]["counts"]["queued"], 1);

    let review = run_cli_in_home(home.path(), &["review", "list", "--user", USER]);
    assert!(review.success);
    assert!(review.stdout.starts_with("1 pending review entry for u_anna:"));

    let pending = run_cli_in_home(home.path(), &["--json", "review", "list", "--user", USER]);
    let entry_id = parse_json(&pending.stdout)["data"]["entries"][0]["entry_id"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    assert!(entry_id.starts_with("rev_"));

    let decided = run_cli_in_home(
        home.path(),
        &["review", "decide", &entry_id, "confirm", "--actor", USER],
    );
    assert!(decided.success, "{}", decided.stdout);
    assert!(decided.stdout.contains(&format!("Entry {entry_id} confirmed by {USER}.")));

    let again = run_cli_in_home(
        home.path(),
        &["--json", "review", "decide", &entry_id, "reject", "--actor", USER],
    );
    assert_eq!(again.code, Some(1));
    assert_json_error_contract(&again.stdout, "already_decided");

    let listed = run_cli_in_home(home.path(), &["link", "list", "--user", USER]);
    assert!(listed.success);
    assert!(listed.stdout.contains("auto_confirmed"));
    assert!(listed.stdout.contains("manually_confirmed"));
}

#[test]
fn fx_set_and_list_round_trip_through_text_output() {
    let home = test_home();
    let set = run_cli_in_home(home.path(), &["fx", "set", "EUR", "CHF", "2024-09-13", "0.9412"]);
    assert!(set.success, "{}", set.stdout);
    assert!(set.stdout.starts_with("Rate stored: 1 EUR = 0.9412 CHF on 2024-09-13"));

    let listed = run_cli_in_home(home.path(), &["fx", "list"]);
    assert!(listed.success);
    assert!(listed.stdout.contains("EUR"));
    assert!(listed.stdout.contains("0.9412"));
}

#[test]
fn alias_set_and_list_show_the_normalized_alias() {
    let home = test_home();
    let set = run_cli_in_home(home.path(), &["alias", "set", "mgb 0042 Zürich", "Migros"]);
    assert!(set.success, "{}", set.stdout);
    assert!(set.stdout.starts_with("Alias stored: MGB now matches as Migros."));

    let listed = run_cli_in_home(home.path(), &["alias", "list", "--json"]);
    assert!(listed.success);
    let payload = parse_json(&listed.stdout);
    assert_eq!(payload["command"], "alias list");
    assert_eq!(payload["data"]["aliases"][0]["alias"], "MGB");
    assert_eq!(payload["data"]["aliases"][0]["canonical"], "Migros");

    let same = run_cli_in_home(home.path(), &["alias", "set", "Migros AG", "MIGROS"]);
    assert_eq!(same.code, Some(1));
    assert_text_error_contract(&same.stdout, "invalid_argument");
}

#[test]
fn unreadable_ledger_exits_with_the_internal_code() {
    let home = test_home();
    let write = std::fs::write(home.path().join("ledger.db"), vec![b'x'; 4096]);
    assert!(write.is_ok());

    let output = run_cli_in_home(home.path(), &["fx", "list", "--json"]);
    assert_eq!(output.code, Some(2));
    let payload = parse_json(&output.stdout);
    assert_eq!(payload["ok"], false);
}

#[test]
fn error_output_pipe_close_does_not_panic() {
    let home = test_home();
    let mut producer = Command::new(env!("CARGO_BIN_EXE_umbra"));
    producer.args(["link", "show", "--expense", "exp_missing"]);
    producer.env("UMBRA_HOME", home.path());
    producer.stdin(Stdio::null());
    producer.stdout(Stdio::piped());
    producer.stderr(Stdio::piped());

    let producer_spawn = producer.spawn();
    assert!(producer_spawn.is_ok());
    if let Ok(mut producer_child) = producer_spawn {
        let producer_stdout = producer_child.stdout.take();
        let producer_stderr = producer_child.stderr.take();

        if let Some(stdout_pipe) = producer_stdout {
            let mut reader = BufReader::new(stdout_pipe);
            let mut first_line = String::new();
            let read_result = reader.read_line(&mut first_line);
            assert!(read_result.is_ok());
            drop(reader);
        }

        let status = producer_child.wait();
        assert!(status.is_ok());

        if let Some(mut stderr_pipe) = producer_stderr {
            let mut stderr_bytes = Vec::new();
            let stderr_read = stderr_pipe.read_to_end(&mut stderr_bytes);
            assert!(stderr_read.is_ok());
            let stderr_text = String::from_utf8_lossy(&stderr_bytes);
            assert!(!stderr_text.contains("Broken pipe"));
            assert!(!stderr_text.contains("panicked"));
        }
    }
}
