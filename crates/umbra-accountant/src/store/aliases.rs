use std::path::Path;

use rusqlite::{Connection, params};
use serde::Serialize;

use crate::ClientResult;
use crate::matching::normalize::MerchantAliases;
use crate::state::{map_sqlite_error, now_rfc3339};

pub const MERCHANT_KIND: &str = "merchant";

/// `alias` is stored as its fingerprint, so spellings that normalize alike
/// share one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasRecord {
    pub kind: String,
    pub alias: String,
    pub canonical: String,
    pub created_at: String,
    pub updated_at: String,
}

pub fn upsert_alias(
    connection: &Connection,
    db_path: &Path,
    kind: &str,
    alias: &str,
    canonical: &str,
) -> ClientResult<AliasRecord> {
    let now = now_rfc3339();
    connection
        .execute(
            "INSERT INTO internal_aliases (kind, alias, canonical, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (kind, alias) DO UPDATE SET
                 canonical = excluded.canonical,
                 updated_at = excluded.updated_at",
            params![kind, alias, canonical, &now],
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let created_at = connection
        .query_row(
            "SELECT created_at FROM internal_aliases WHERE kind = ?1 AND alias = ?2",
            params![kind, alias],
            |row| row.get::<_, String>(0),
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    Ok(AliasRecord {
        kind: kind.to_string(),
        alias: alias.to_string(),
        canonical: canonical.to_string(),
        created_at,
        updated_at: now,
    })
}

pub fn list_aliases(
    connection: &Connection,
    db_path: &Path,
    kind: &str,
) -> ClientResult<Vec<AliasRecord>> {
    let mut statement = connection
        .prepare(
            "SELECT kind, alias, canonical, created_at, updated_at
             FROM internal_aliases
             WHERE kind = ?1
             ORDER BY alias ASC",
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map([kind], |row| {
            Ok(AliasRecord {
                kind: row.get(0)?,
                alias: row.get(1)?,
                canonical: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|error| map_sqlite_error(db_path, &error))
}

pub fn load_merchant_aliases(
    connection: &Connection,
    db_path: &Path,
) -> ClientResult<MerchantAliases> {
    let records = list_aliases(connection, db_path, MERCHANT_KIND)?;
    Ok(MerchantAliases::from_pairs(
        records
            .iter()
            .map(|record| (record.alias.as_str(), record.canonical.as_str())),
    ))
}
