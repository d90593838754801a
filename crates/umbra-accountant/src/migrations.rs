use std::collections::HashMap;

use rusqlite::Connection;
use rusqlite_migration::{M, Migrations};

const BOOTSTRAP_SQL: &str = include_str!("migrations/0001_bootstrap.sql");
const RECONCILIATION_SQL: &str = include_str!("migrations/0002_reconciliation.sql");
const ALIASES_SQL: &str = include_str!("migrations/0003_aliases.sql");

pub const REQUIRED_INDEX_NAMES: [&str; 8] = [
    "idx_internal_statements_account_ref",
    "idx_internal_transactions_account_posted_date",
    "idx_internal_expenses_user_date",
    "uq_links_active_expense",
    "uq_links_active_transaction",
    "uq_review_entries_pending_expense",
    "uq_review_entries_pending_transaction",
    "idx_review_entries_user_pending",
];

pub const REQUIRED_META_KEYS: [(&str, &str); 2] = [
    ("schema_version", "v1"),
    ("match_policy_version", "match/v1"),
];

pub fn run_pending(conn: &mut Connection) -> rusqlite_migration::Result<()> {
    let migrations = Migrations::new(vec![
        M::up(BOOTSTRAP_SQL),
        M::up(RECONCILIATION_SQL),
        M::up(ALIASES_SQL),
    ]);
    migrations.to_latest(conn)
}

pub fn safe_repair_statement(statement_name: &str) -> Option<String> {
    parse_safe_repair_statements().remove(statement_name)
}

fn parse_safe_repair_statements() -> HashMap<String, String> {
    let mut blocks: HashMap<String, String> = HashMap::new();
    let mut active_name: Option<String> = None;
    let mut active_sql = String::new();

    for line in BOOTSTRAP_SQL.lines().chain(RECONCILIATION_SQL.lines()) {
        let trimmed = line.trim();

        if let Some(name) = trimmed.strip_prefix("-- umbra:safe_repair:start:") {
            active_name = Some(name.to_string());
            active_sql.clear();
            continue;
        }

        if let Some(name) = trimmed.strip_prefix("-- umbra:safe_repair:end:") {
            if let Some(active) = &active_name
                && active == name
            {
                blocks.insert(name.to_string(), active_sql.trim().to_string());
            }
            active_name = None;
            active_sql.clear();
            continue;
        }

        if active_name.is_some() {
            active_sql.push_str(line);
            active_sql.push('\n');
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::{REQUIRED_INDEX_NAMES, safe_repair_statement};

    #[test]
    fn safe_repair_statement_exists_for_every_required_index() {
        for name in REQUIRED_INDEX_NAMES {
            let sql = safe_repair_statement(name);
            assert!(sql.is_some(), "missing repair block for {name}");
        }
    }

    #[test]
    fn active_link_indexes_are_partial_unique_indexes() {
        for name in ["uq_links_active_expense", "uq_links_active_transaction"] {
            let sql = safe_repair_statement(name).unwrap_or_default();
            assert!(sql.starts_with("CREATE UNIQUE INDEX"));
            assert!(sql.contains("WHERE status IN ('auto_confirmed', 'manually_confirmed')"));
        }
    }
}
