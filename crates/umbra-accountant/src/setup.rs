use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::migrations::{
    REQUIRED_INDEX_NAMES, REQUIRED_META_KEYS, run_pending, safe_repair_statement,
};
use crate::state::{
    ensure_ledger_directory, ledger_db_path, map_sqlite_error, open_connection, resolve_ledger_home,
};
use crate::{ClientError, ClientResult};

const INTERNAL_META_COLUMNS: [&str; 2] = ["key", "value"];
const INTERNAL_ACCOUNTS_COLUMNS: [&str; 3] = ["account_ref", "user_id", "created_at"];
const INTERNAL_STATEMENTS_COLUMNS: [&str; 10] = [
    "statement_id",
    "user_id",
    "account_ref",
    "statement_ref",
    "source_kind",
    "source_ref",
    "imported_at",
    "voided_at",
    "rows_read",
    "inserted",
];
const INTERNAL_TRANSACTIONS_COLUMNS: [&str; 10] = [
    "transaction_id",
    "statement_id",
    "account_ref",
    "posted_date",
    "amount",
    "currency",
    "counterparty_text",
    "mcc",
    "external_ref",
    "voided_at",
];
const INTERNAL_EXPENSES_COLUMNS: [&str; 11] = [
    "expense_id",
    "user_id",
    "date_local",
    "amount_cents",
    "direction",
    "currency",
    "merchant_text",
    "category_code",
    "source",
    "vat_breakdown_json",
    "created_at",
];
const INTERNAL_FX_RATES_COLUMNS: [&str; 6] =
    ["base", "quote", "as_of", "rate", "source", "fetched_at"];
const INTERNAL_RECONCILE_RUNS_COLUMNS: [&str; 14] = [
    "run_id",
    "user_id",
    "period_start",
    "period_end",
    "auto_match_threshold",
    "review_floor",
    "policy_version",
    "started_at",
    "finished_at",
    "status",
    "auto_matched",
    "queued",
    "excluded_missing_fx",
    "conflicts",
];
const INTERNAL_RECONCILIATION_LINKS_COLUMNS: [&str; 10] = [
    "link_id",
    "expense_id",
    "transaction_id",
    "status",
    "confidence_at_commit",
    "committed_at",
    "committed_by",
    "run_id",
    "released_at",
    "released_by",
];
const INTERNAL_REVIEW_ENTRIES_COLUMNS: [&str; 14] = [
    "entry_id",
    "run_id",
    "user_id",
    "period_start",
    "period_end",
    "expense_id",
    "transaction_id",
    "best_confidence",
    "created_at",
    "decided",
    "decision",
    "decided_at",
    "decided_by",
    "link_id",
];
const INTERNAL_REVIEW_CANDIDATES_COLUMNS: [&str; 12] = [
    "entry_id",
    "rank",
    "expense_id",
    "transaction_id",
    "confidence",
    "amount_score",
    "date_score",
    "text_score",
    "date_delta_days",
    "converted_amount",
    "fx_rate",
    "reasons_json",
];
const INTERNAL_RECONCILE_LOCKS_COLUMNS: [&str; 3] = ["user_id", "run_id", "acquired_at"];
const INTERNAL_ALIASES_COLUMNS: [&str; 5] =
    ["kind", "alias", "canonical", "created_at", "updated_at"];
const EXPECTED_USER_VERSION: i64 = 3;

const REQUIRED_CORE_TABLES: [(&str, &[&str]); 12] = [
    ("internal_meta", &INTERNAL_META_COLUMNS),
    ("internal_accounts", &INTERNAL_ACCOUNTS_COLUMNS),
    ("internal_statements", &INTERNAL_STATEMENTS_COLUMNS),
    ("internal_transactions", &INTERNAL_TRANSACTIONS_COLUMNS),
    ("internal_expenses", &INTERNAL_EXPENSES_COLUMNS),
    ("internal_fx_rates", &INTERNAL_FX_RATES_COLUMNS),
    ("internal_reconcile_runs", &INTERNAL_RECONCILE_RUNS_COLUMNS),
    (
        "internal_reconciliation_links",
        &INTERNAL_RECONCILIATION_LINKS_COLUMNS,
    ),
    ("internal_review_entries", &INTERNAL_REVIEW_ENTRIES_COLUMNS),
    (
        "internal_review_candidates",
        &INTERNAL_REVIEW_CANDIDATES_COLUMNS,
    ),
    ("internal_reconcile_locks", &INTERNAL_RECONCILE_LOCKS_COLUMNS),
    ("internal_aliases", &INTERNAL_ALIASES_COLUMNS),
];

/// Unique indexes whose exact definition carries a ledger invariant; a drifted
/// definition is treated as corruption rather than repaired.
const GUARD_INDEX_NAMES: [&str; 4] = [
    "uq_links_active_expense",
    "uq_links_active_transaction",
    "uq_review_entries_pending_expense",
    "uq_review_entries_pending_transaction",
];

#[derive(Debug, Clone)]
pub struct SetupContext {
    pub db_path: PathBuf,
    pub schema_version: String,
    pub match_policy_version: String,
}

impl SetupContext {
    pub fn connect(&self) -> ClientResult<Connection> {
        open_connection(&self.db_path)
    }

    pub fn db_path_display(&self) -> String {
        self.db_path.display().to_string()
    }
}

pub fn ensure_initialized() -> ClientResult<SetupContext> {
    ensure_initialized_with_home_override(None)
}

pub fn ensure_initialized_at(home_override: &Path) -> ClientResult<SetupContext> {
    ensure_initialized_with_home_override(Some(home_override))
}

pub(crate) fn load(home_override: Option<&Path>) -> ClientResult<SetupContext> {
    ensure_initialized_with_home_override(home_override)
}

fn ensure_initialized_with_home_override(
    home_override: Option<&Path>,
) -> ClientResult<SetupContext> {
    let ledger_home = resolve_ledger_home(home_override)?;
    ensure_ledger_directory(&ledger_home)?;

    let db_path = ledger_db_path(&ledger_home);
    let mut connection = open_connection(&db_path)?;

    run_pending(&mut connection).map_err(|error| map_migration_error(&db_path, &error))?;

    verify_core_tables(&connection, &db_path)?;
    repair_safe_objects(&connection, &db_path)?;
    verify_post_repair_objects(&connection, &db_path)?;

    let schema_version = read_meta_value(&connection, &db_path, "schema_version")?;
    let match_policy_version = read_meta_value(&connection, &db_path, "match_policy_version")?;
    debug!(db_path = %db_path.display(), %schema_version, "ledger ready");

    Ok(SetupContext {
        db_path,
        schema_version,
        match_policy_version,
    })
}

fn map_migration_error(db_path: &Path, error: &rusqlite_migration::Error) -> ClientError {
    match error {
        rusqlite_migration::Error::RusqliteError { query: _, err } => {
            let mapped = map_sqlite_error(db_path, err);
            if mapped.code == "ledger_locked"
                || mapped.code == "ledger_corrupt"
                || mapped.code == "ledger_init_permission_denied"
            {
                mapped
            } else {
                ClientError::migration_failed(db_path, &error.to_string())
            }
        }
        _ => ClientError::migration_failed(db_path, &error.to_string()),
    }
}

fn verify_core_tables(connection: &Connection, db_path: &Path) -> ClientResult<()> {
    for (table_name, required_columns) in REQUIRED_CORE_TABLES {
        if !sqlite_object_exists(connection, "table", table_name, db_path)? {
            return Err(ClientError::ledger_corrupt(db_path));
        }

        let columns = table_columns(connection, table_name, db_path)?;
        for required_column in required_columns {
            if !columns.iter().any(|column| column == required_column) {
                return Err(ClientError::ledger_corrupt(db_path));
            }
        }
    }

    Ok(())
}

fn repair_safe_objects(connection: &Connection, db_path: &Path) -> ClientResult<()> {
    // Insert-only: a missing key is restored, a drifted value fails verification.
    for (meta_key, default_value) in REQUIRED_META_KEYS {
        connection
            .execute(
                "INSERT OR IGNORE INTO internal_meta (key, value) VALUES (?1, ?2)",
                params![meta_key, default_value],
            )
            .map_err(|error| map_sqlite_error(db_path, &error))?;
    }

    for index_name in REQUIRED_INDEX_NAMES {
        if !sqlite_object_exists(connection, "index", index_name, db_path)? {
            let sql = safe_repair_statement(index_name).ok_or_else(|| {
                ClientError::ledger_init_failed(db_path, "Missing canonical SQL for index repair.")
            })?;
            warn!(index = index_name, "recreating missing ledger index");
            connection
                .execute_batch(&sql)
                .map_err(|error| map_sqlite_error(db_path, &error))?;
        }
    }

    Ok(())
}

fn verify_post_repair_objects(connection: &Connection, db_path: &Path) -> ClientResult<()> {
    let user_version = connection
        .query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    if user_version != EXPECTED_USER_VERSION {
        return Err(ClientError::ledger_corrupt(db_path));
    }

    for (meta_key, expected_value) in REQUIRED_META_KEYS {
        let value = connection
            .query_row(
                "SELECT value FROM internal_meta WHERE key = ?1 LIMIT 1",
                [meta_key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|error| map_sqlite_error(db_path, &error))?;

        match value {
            Some(actual) if actual == expected_value => {}
            _ => return Err(ClientError::ledger_corrupt(db_path)),
        }
    }

    for index_name in REQUIRED_INDEX_NAMES {
        if !sqlite_object_exists(connection, "index", index_name, db_path)? {
            return Err(ClientError::ledger_corrupt(db_path));
        }
    }
    verify_guard_index_sql(connection, db_path)?;

    Ok(())
}

fn verify_guard_index_sql(connection: &Connection, db_path: &Path) -> ClientResult<()> {
    for index_name in GUARD_INDEX_NAMES {
        let actual_sql = connection
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'index' AND name = ?1 LIMIT 1",
                [index_name],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map_err(|error| map_sqlite_error(db_path, &error))?
            .flatten();

        let Some(actual_index_sql) = actual_sql else {
            return Err(ClientError::ledger_corrupt(db_path));
        };

        let expected_block = safe_repair_statement(index_name).ok_or_else(|| {
            ClientError::ledger_init_failed(db_path, "Missing canonical SQL for index verification.")
        })?;

        if normalize_sql(&actual_index_sql) != normalize_sql(&expected_block) {
            return Err(ClientError::ledger_corrupt(db_path));
        }
    }

    Ok(())
}

fn normalize_sql(sql: &str) -> String {
    sql.chars()
        .filter(|value| !value.is_whitespace() && *value != ';')
        .flat_map(char::to_lowercase)
        .collect()
}

fn sqlite_object_exists(
    connection: &Connection,
    object_type: &str,
    object_name: &str,
    db_path: &Path,
) -> ClientResult<bool> {
    let exists = connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2 LIMIT 1",
            params![object_type, object_name],
            |_row| Ok(true),
        )
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))?
        .unwrap_or(false);

    Ok(exists)
}

fn table_columns(
    connection: &Connection,
    table_name: &str,
    db_path: &Path,
) -> ClientResult<Vec<String>> {
    if !is_required_core_table(table_name) {
        return Err(ClientError::ledger_init_failed(
            db_path,
            "Refused PRAGMA table inspection for non-core table.",
        ));
    }

    // `table_name` comes from REQUIRED_CORE_TABLES, never from user input.
    let sql = format!("PRAGMA table_info({table_name})");
    let mut statement = connection
        .prepare(&sql)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let column_iter = statement
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut columns: Vec<String> = Vec::new();
    for row in column_iter {
        let column = row.map_err(|error| map_sqlite_error(db_path, &error))?;
        columns.push(column);
    }

    Ok(columns)
}

fn is_required_core_table(table_name: &str) -> bool {
    REQUIRED_CORE_TABLES
        .iter()
        .any(|(required_name, _)| required_name == &table_name)
}

fn read_meta_value(connection: &Connection, db_path: &Path, key: &str) -> ClientResult<String> {
    connection
        .query_row(
            "SELECT value FROM internal_meta WHERE key = ?1 LIMIT 1",
            [key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))?
        .ok_or_else(|| ClientError::ledger_corrupt(db_path))
}
