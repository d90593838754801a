use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::state::{map_sqlite_error, now_rfc3339};
use crate::{ClientError, ClientResult};

pub fn account_owner(
    connection: &Connection,
    db_path: &Path,
    account_ref: &str,
) -> ClientResult<Option<String>> {
    connection
        .query_row(
            "SELECT user_id FROM internal_accounts WHERE account_ref = ?1 LIMIT 1",
            [account_ref],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))
}

/// Registers `account_ref` for `user_id`, or confirms the existing owner.
pub fn ensure_account_owner(
    connection: &Connection,
    db_path: &Path,
    account_ref: &str,
    user_id: &str,
) -> ClientResult<()> {
    connection
        .execute(
            "INSERT OR IGNORE INTO internal_accounts (account_ref, user_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![account_ref, user_id, now_rfc3339()],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    match account_owner(connection, db_path, account_ref)? {
        Some(owner) if owner == user_id => Ok(()),
        Some(owner) => Err(ClientError::account_owner_mismatch(account_ref, &owner)),
        None => Err(ClientError::ledger_corrupt(db_path)),
    }
}

/// A user is known once they own an account or have recorded an expense.
pub fn user_is_known(connection: &Connection, db_path: &Path, user_id: &str) -> ClientResult<bool> {
    connection
        .query_row(
            "SELECT EXISTS (SELECT 1 FROM internal_accounts WHERE user_id = ?1)
                 OR EXISTS (SELECT 1 FROM internal_expenses WHERE user_id = ?1)",
            [user_id],
            |row| row.get::<_, bool>(0),
        )
        .map_err(|error| map_sqlite_error(db_path, &error))
}
