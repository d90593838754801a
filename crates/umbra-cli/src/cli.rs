use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoDate(pub String);

impl IsoDate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn parse_iso_date(value: &str) -> Result<IsoDate, String> {
    if value.len() != 10 {
        return Err("date must use YYYY-MM-DD format".to_string());
    }

    let bytes = value.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return Err("date must use YYYY-MM-DD format".to_string());
    }

    for index in [0usize, 1, 2, 3, 5, 6, 8, 9] {
        if !bytes[index].is_ascii_digit() {
            return Err("date must use YYYY-MM-DD format".to_string());
        }
    }

    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
        return Err("date must use valid calendar values".to_string());
    }

    Ok(IsoDate(value.to_string()))
}

pub fn parse_confidence(value: &str) -> Result<f64, String> {
    let parsed = value
        .parse::<f64>()
        .map_err(|_| "confidence must be a number between 0 and 1".to_string())?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err("confidence must be a number between 0 and 1".to_string());
    }
    Ok(parsed)
}

/// Extended help shown after `umbra statement import --help`.
pub const STATEMENT_IMPORT_AFTER_HELP: &str = "\
How statement import works:
  Parse each bank statement into a JSON array or a CSV with a header row,
  then import it for one user and one account.

  <path> is a local file path. Use `-` to read stdin.
  Example: cat september.json | umbra statement import - --user u_anna --account ch93-0076

  Every row is validated before anything is written. One bad row rejects
  the whole file and the report lists each issue by row and field.

  Passing the same --statement-ref again for an account voids the earlier
  import's lines and records the new ones.

Statement schema:
  JSON example:
  [
    {
      \"posted_date\": \"2024-09-14\",
      \"amount\": \"-27.50\",
      \"currency\": \"CHF\",
      \"counterparty_text\": \"MIGROS ZUERICH\",
      \"mcc\": \"5411\",
      \"external_ref\": \"ZKB-2024-09-14-001\"
    }
  ]

  CSV example:
  posted_date,amount,currency,counterparty_text,mcc,external_ref
  2024-09-14,-27.50,CHF,MIGROS ZUERICH,5411,ZKB-2024-09-14-001

Field rules:
  posted_date (required)        Date only, `YYYY-MM-DD`.
  amount (required)             Signed major units: negative = money out.
                                At most the currency's minor-unit decimals.
  currency (required)           3-letter ISO code.
  counterparty_text (optional)  Raw booking text from the bank.
  mcc (optional)                4-digit merchant category code.
  external_ref (optional)       Upstream booking reference, kept verbatim.

What to do next:
  Run `umbra reconcile --user <user> --from <date> --to <date>`.
";

/// Extended help shown after `umbra expense import --help`.
pub const EXPENSE_IMPORT_AFTER_HELP: &str = "\
Expense schema:
  Required: user_id, date_local, amount, currency
  Optional: direction (debit|credit, default debit), merchant_text,
            category_code, source (manual|ocr|qr_bill|payslip, default manual),
            vat_breakdown (JSON object or array, stored untouched)

  amount is an unsigned major-unit amount, e.g. `27.50`.

  CSV example:
  user_id,date_local,amount,currency,merchant_text,source
  u_anna,2024-09-14,27.50,CHF,Migros,ocr
";

#[derive(Debug, Parser)]
#[command(
    name = "umbra",
    version,
    about = "statement-to-expense reconciliation for Swiss households",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Data directory; defaults to $UMBRA_HOME, then ~/.umbra
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,
    /// Print the JSON envelope instead of text
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import and list bank statements
    #[command(arg_required_else_help = true)]
    Statement {
        #[command(subcommand)]
        command: StatementCommand,
    },
    /// Record, import and list expenses
    #[command(arg_required_else_help = true)]
    Expense {
        #[command(subcommand)]
        command: ExpenseCommand,
    },
    /// Maintain the daily FX rate table
    #[command(arg_required_else_help = true)]
    Fx {
        #[command(subcommand)]
        command: FxCommand,
    },
    /// Teach the matcher that two merchant spellings are the same shop
    #[command(arg_required_else_help = true)]
    Alias {
        #[command(subcommand)]
        command: AliasCommand,
    },
    /// Match expenses to statement lines for one user and period
    Reconcile {
        #[arg(long = "user")]
        user_id: String,
        /// First day of the period (YYYY-MM-DD)
        #[arg(long, value_parser = parse_iso_date)]
        from: IsoDate,
        /// Last day of the period (YYYY-MM-DD)
        #[arg(long, value_parser = parse_iso_date)]
        to: IsoDate,
        /// Auto-confirm at or above this confidence
        #[arg(long, value_parser = parse_confidence)]
        threshold: Option<f64>,
        /// Queue for review at or above this confidence
        #[arg(long, value_parser = parse_confidence)]
        review_floor: Option<f64>,
        /// Largest date gap in days between expense and posting
        #[arg(long)]
        window_days: Option<u32>,
    },
    /// Work through mid-confidence proposals
    #[command(arg_required_else_help = true)]
    Review {
        #[command(subcommand)]
        command: ReviewCommand,
    },
    /// Inspect and release reconciliation links
    #[command(arg_required_else_help = true)]
    Link {
        #[command(subcommand)]
        command: LinkCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum StatementCommand {
    /// Validate and record one statement file
    #[command(after_long_help = STATEMENT_IMPORT_AFTER_HELP)]
    Import {
        /// File path, or `-` for stdin
        path: Option<String>,
        #[arg(long = "user")]
        user_id: String,
        #[arg(long = "account")]
        account_ref: String,
        /// Re-importing a ref voids the earlier import of it
        #[arg(long)]
        statement_ref: Option<String>,
    },
    /// List imported statements, voided ones included
    List {
        #[arg(long = "user")]
        user_id: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ExpenseCommand {
    /// Record one expense
    Add {
        #[arg(long = "user")]
        user_id: String,
        #[arg(long, value_parser = parse_iso_date)]
        date: IsoDate,
        /// Unsigned major units, e.g. 27.50
        #[arg(long)]
        amount: String,
        #[arg(long)]
        currency: String,
        #[arg(long, default_value = "")]
        merchant: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_parser = ["manual", "ocr", "qr_bill", "payslip"])]
        source: Option<String>,
        /// Money in (refund, income) rather than spending
        #[arg(long)]
        credit: bool,
        /// VAT split as a JSON object or array
        #[arg(long)]
        vat_breakdown: Option<String>,
    },
    /// Validate and record a batch of expenses
    #[command(after_long_help = EXPENSE_IMPORT_AFTER_HELP)]
    Import {
        /// File path, or `-` for stdin
        path: Option<String>,
    },
    /// List expenses with their active link
    List {
        #[arg(long = "user")]
        user_id: String,
        #[arg(long, value_parser = parse_iso_date)]
        from: Option<IsoDate>,
        #[arg(long, value_parser = parse_iso_date)]
        to: Option<IsoDate>,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum FxCommand {
    /// Record `1 BASE = RATE QUOTE` on DATE
    Set {
        base: String,
        quote: String,
        #[arg(value_parser = parse_iso_date)]
        date: IsoDate,
        rate: String,
        #[arg(long)]
        source: Option<String>,
    },
    /// List stored rates
    List,
}

#[derive(Debug, Clone, Subcommand)]
pub enum AliasCommand {
    /// Treat merchant text ALIAS as CANONICAL when matching
    Set { alias: String, canonical: String },
    /// List merchant aliases
    List,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ReviewCommand {
    /// Show undecided entries with their ranked candidates
    List {
        #[arg(long = "user")]
        user_id: String,
    },
    /// Confirm or reject one entry
    Decide {
        entry_id: String,
        #[arg(value_parser = ["confirm", "reject"])]
        decision: String,
        /// Confirm this candidate instead of the top one
        #[arg(long = "transaction")]
        transaction_id: Option<String>,
        #[arg(long)]
        actor: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum LinkCommand {
    /// Undo an active link so both sides can match again
    Release {
        link_id: String,
        #[arg(long)]
        actor: String,
    },
    /// Show the active link of one expense or one transaction
    #[command(group(
        ArgGroup::new("target")
            .required(true)
            .args(["expense_id", "transaction_id"])
    ))]
    Show {
        #[arg(long = "expense")]
        expense_id: Option<String>,
        #[arg(long = "transaction")]
        transaction_id: Option<String>,
    },
    /// List links of one user
    List {
        #[arg(long = "user")]
        user_id: String,
        /// Include rejected and released rows
        #[arg(long)]
        all: bool,
    },
}

#[cfg(test)]
pub fn parse_from<I, T>(itr: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(itr)
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::{Commands, LinkCommand, ReviewCommand, parse_from};

    #[test]
    fn parse_command_paths() {
        let cases: [Vec<&str>; 18] = [
            vec!["umbra", "statement", "import", "-", "--user", "u", "--account", "a"],
            vec![
                "umbra",
                "statement",
                "import",
                "./sept.csv",
                "--user",
                "u",
                "--account",
                "a",
                "--statement-ref",
                "2024-09",
                "--json",
            ],
            vec!["umbra", "statement", "list", "--user", "u"],
            vec![
                "umbra", "expense", "add", "--user", "u", "--date", "2024-09-14", "--amount",
                "27.50", "--currency", "CHF", "--merchant", "Migros",
            ],
            vec![
                "umbra", "expense", "add", "--user", "u", "--date", "2024-09-14", "--amount",
                "5", "--currency", "CHF", "--source", "qr_bill", "--credit",
            ],
            vec!["umbra", "expense", "import", "-"],
            vec!["umbra", "expense", "list", "--user", "u", "--from", "2024-09-01"],
            vec!["umbra", "fx", "set", "EUR", "CHF", "2024-09-13", "0.95"],
            vec!["umbra", "fx", "list", "--json"],
            vec!["umbra", "alias", "set", "MGB", "Migros"],
            vec!["umbra", "alias", "list", "--json"],
            vec![
                "umbra", "reconcile", "--user", "u", "--from", "2024-09-01", "--to",
                "2024-09-30",
            ],
            vec![
                "umbra",
                "reconcile",
                "--user",
                "u",
                "--from",
                "2024-09-01",
                "--to",
                "2024-09-30",
                "--threshold",
                "0.9",
                "--review-floor",
                "0.4",
                "--window-days",
                "5",
            ],
            vec!["umbra", "review", "list", "--user", "u"],
            vec!["umbra", "review", "decide", "rev_1", "reject", "--actor", "u"],
            vec!["umbra", "link", "release", "lnk_1", "--actor", "u"],
            vec!["umbra", "link", "show", "--transaction", "txn_1"],
            vec!["umbra", "--home", "/tmp/umbra", "link", "list", "--user", "u", "--all"],
        ];

        for case in cases {
            let parsed = parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse: {case:?}");
        }
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let parsed = parse_from([
            "umbra", "fx", "list", "--json", "--home", "/tmp/umbra-home",
        ]);
        assert!(parsed.is_ok());
        if let Ok(cli) = parsed {
            assert!(cli.json);
            assert_eq!(
                cli.home.as_deref().map(|path| path.display().to_string()),
                Some("/tmp/umbra-home".to_string())
            );
        }
    }

    #[test]
    fn review_decide_parses_transaction_choice() {
        let parsed = parse_from([
            "umbra",
            "review",
            "decide",
            "rev_1",
            "confirm",
            "--transaction",
            "txn_2",
            "--actor",
            "u_anna",
        ]);
        assert!(parsed.is_ok());
        if let Ok(cli) = parsed {
            assert!(matches!(
                cli.command,
                Commands::Review {
                    command: ReviewCommand::Decide {
                        transaction_id: Some(_),
                        ..
                    }
                }
            ));
        }
    }

    #[test]
    fn review_decide_rejects_unknown_decision() {
        let parsed = parse_from(["umbra", "review", "decide", "rev_1", "maybe", "--actor", "u"]);
        assert!(parsed.is_err());
        if let Err(error) = parsed {
            assert_eq!(error.kind(), ErrorKind::InvalidValue);
        }
    }

    #[test]
    fn link_show_requires_exactly_one_target() {
        let neither = parse_from(["umbra", "link", "show"]);
        assert!(neither.is_err());

        let both = parse_from([
            "umbra",
            "link",
            "show",
            "--expense",
            "exp_1",
            "--transaction",
            "txn_1",
        ]);
        assert!(both.is_err());

        let one = parse_from(["umbra", "link", "show", "--expense", "exp_1"]);
        assert!(one.is_ok());
        if let Ok(cli) = one {
            assert!(matches!(
                cli.command,
                Commands::Link {
                    command: LinkCommand::Show {
                        expense_id: Some(_),
                        transaction_id: None
                    }
                }
            ));
        }
    }

    #[test]
    fn reconcile_rejects_malformed_dates_and_confidence() {
        let bad_date = parse_from([
            "umbra", "reconcile", "--user", "u", "--from", "2024-9-1", "--to", "2024-09-30",
        ]);
        assert!(bad_date.is_err());
        if let Err(error) = bad_date {
            assert_eq!(error.kind(), ErrorKind::ValueValidation);
        }

        let bad_threshold = parse_from([
            "umbra",
            "reconcile",
            "--user",
            "u",
            "--from",
            "2024-09-01",
            "--to",
            "2024-09-30",
            "--threshold",
            "1.5",
        ]);
        assert!(bad_threshold.is_err());
    }

    #[test]
    fn unknown_subcommand_is_not_parsed() {
        let parsed = parse_from(["umbra", "guide"]);
        assert!(parsed.is_err());
    }
}
