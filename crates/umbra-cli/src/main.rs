mod cli;
mod dispatch;
mod output;
mod stdout_io;

use std::process::ExitCode;

use clap::{Parser, error::ErrorKind};
use stdout_io::write_stdout_text;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use umbra_accountant::ClientError;

/// Log filter variable; logs go to stderr so stdout stays a clean contract.
const LOG_ENV_VAR: &str = "UMBRA_LOG";

const ROOT_HELP: &str = "umbra - match bank statement lines to recorded expenses

Usage:
  umbra <command>

Start here:
  umbra statement import --help
  umbra reconcile --help
  umbra review list --user <user>
";

const TOP_LEVEL_HELP: &str = "umbra - match bank statement lines to recorded expenses

USAGE: umbra [--json] [--home <DIR>] <command>

Load your data:
  1. umbra statement import --help                        Read the statement schema
  2. umbra statement import <path> --user <u> --account <a>
  3. umbra expense add --user <u> --date <d> --amount <x> --currency <c>
     umbra expense import <path>                          Batch-import expenses
  4. umbra fx set EUR CHF 2024-09-14 0.9412                Only needed across currencies
  5. umbra alias set MGB Migros                            Same shop, different spelling

Reconcile:
  umbra reconcile --user <u> --from <date> --to <date>   Auto-match and queue proposals
  umbra review list --user <u>                           Proposals waiting for a decision
  umbra review decide <entry-id> confirm|reject --actor <u>

Inspect and correct:
  umbra link list --user <u> [--all]                     Active links (or full history)
  umbra link show --expense <id> | --transaction <id>
  umbra link release <link-id> --actor <u>               Undo a link
  umbra statement list --user <u>
  umbra expense list --user <u> [--from <d>] [--to <d>]
  umbra fx list
  umbra alias list

Every command accepts --json for the machine-readable envelope.
Data lives in $UMBRA_HOME (default ~/.umbra). Set UMBRA_LOG=debug for logs.
";

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(code) => code,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn run() -> Result<ExitCode, ExitCode> {
    let raw_args = std::env::args().collect::<Vec<String>>();
    if raw_args.len() == 1 {
        if write_stdout_text(ROOT_HELP).is_err() {
            return Err(ExitCode::from(2));
        }
        return Ok(ExitCode::SUCCESS);
    }
    let parsed = cli::Cli::try_parse();
    let cli = match parsed {
        Ok(value) => value,
        Err(err) => {
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) {
                let text = if is_top_level_help_request(&raw_args) {
                    TOP_LEVEL_HELP.to_string()
                } else {
                    err.to_string()
                };
                if write_stdout_text(&text).is_err() {
                    return Err(ExitCode::from(2));
                }
                return Ok(ExitCode::SUCCESS);
            }
            let command_hint = if matches!(
                err.kind(),
                ErrorKind::MissingRequiredArgument
                    | ErrorKind::InvalidValue
                    | ErrorKind::ValueValidation
                    | ErrorKind::WrongNumberOfValues
                    | ErrorKind::UnknownArgument
                    | ErrorKind::InvalidSubcommand
                    | ErrorKind::ArgumentConflict
            ) {
                command_path_from_args(&raw_args)
            } else {
                None
            };
            let clean_message = strip_clap_boilerplate(&err.to_string());
            let parse_error =
                ClientError::invalid_argument_for_command(&clean_message, command_hint.as_deref());
            let mode = output::infer_requested_output_mode(&raw_args);
            if output::print_failure(&parse_error, mode).is_err() {
                return Err(ExitCode::from(2));
            }
            return Err(ExitCode::from(1));
        }
    };
    let mode = output::mode_for_cli(&cli);

    match dispatch::dispatch(&cli) {
        Ok(success) => {
            if output::print_success(&success, mode).is_err() {
                return Err(ExitCode::from(2));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            tracing::debug!(code = %error.code, "command failed");
            if output::print_failure(&error, mode).is_err() {
                return Err(ExitCode::from(2));
            }
            Err(exit_code_for_error(&error))
        }
    }
}

fn is_top_level_help_request(raw_args: &[String]) -> bool {
    raw_args.len() == 2 && matches!(raw_args[1].as_str(), "--help" | "-h")
}

/// Drops clap's Usage and "For more information" tail so the error's
/// recovery steps are the only guidance printed.
fn strip_clap_boilerplate(message: &str) -> String {
    let trimmed = if let Some(pos) = message.find("\n\nUsage:") {
        &message[..pos]
    } else if let Some(pos) = message.find("\nFor more information") {
        &message[..pos]
    } else {
        message
    };
    trimmed.trim_end().to_string()
}

/// Subcommand path such as "review decide", taken from the leading
/// non-flag arguments.
fn command_path_from_args(raw_args: &[String]) -> Option<String> {
    let non_flags: Vec<&str> = raw_args
        .iter()
        .skip(1)
        .filter(|value| !value.starts_with('-'))
        .map(String::as_str)
        .collect();

    let hint = match non_flags.as_slice() {
        ["statement", "import", ..] => "statement import",
        ["statement", "list", ..] => "statement list",
        ["statement", ..] => "statement",
        ["expense", "add", ..] => "expense add",
        ["expense", "import", ..] => "expense import",
        ["expense", "list", ..] => "expense list",
        ["expense", ..] => "expense",
        ["fx", "set", ..] => "fx set",
        ["fx", "list", ..] => "fx list",
        ["fx", ..] => "fx",
        ["alias", "set", ..] => "alias set",
        ["alias", "list", ..] => "alias list",
        ["alias", ..] => "alias",
        ["reconcile", ..] => "reconcile",
        ["review", "list", ..] => "review list",
        ["review", "decide", ..] => "review decide",
        ["review", ..] => "review",
        ["link", "release", ..] => "link release",
        ["link", "show", ..] => "link show",
        ["link", "list", ..] => "link list",
        ["link", ..] => "link",
        _ => return None,
    };
    Some(hint.to_string())
}

fn exit_code_for_error(error: &ClientError) -> ExitCode {
    if error.is_recoverable() {
        ExitCode::from(1)
    } else {
        ExitCode::from(2)
    }
}
