//! Reconciliation ledger: the append-only record of expense/transaction links.
//!
//! At most one active (`auto_confirmed` or `manually_confirmed`) link exists
//! per expense and per transaction. The partial unique indexes
//! `uq_links_active_expense` and `uq_links_active_transaction` make the insert
//! itself the compare-and-set; the pre-insert lookup only produces a friendlier
//! error. Rows are never deleted: releases flip the status and stamp
//! `released_at`/`released_by`.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::{Actor, LinkStatus, ReconciliationLink};
use crate::state::{is_constraint_violation, map_sqlite_error, now_rfc3339};
use crate::{ClientError, ClientResult};

const LINK_COLUMNS: &str = "l.link_id, l.expense_id, l.transaction_id, l.status,
     l.confidence_at_commit, l.committed_at, l.committed_by, l.run_id, l.released_at,
     l.released_by";

const ACTIVE_STATUSES_SQL: &str = "('auto_confirmed', 'manually_confirmed')";

pub struct NewLink<'a> {
    pub expense_id: &'a str,
    pub transaction_id: &'a str,
    pub status: LinkStatus,
    pub confidence: f64,
    pub actor: &'a Actor,
    /// Run or review entry that produced the link.
    pub run_id: Option<&'a str>,
}

pub fn create_link(
    connection: &Connection,
    db_path: &Path,
    link: &NewLink<'_>,
) -> ClientResult<ReconciliationLink> {
    if link.status == LinkStatus::Released {
        return Err(ClientError::invalid_argument(
            "Links cannot be created in the `released` state.",
        ));
    }

    if link.status.is_active()
        && (get_link_for_expense(connection, db_path, link.expense_id)?.is_some()
            || get_link_for_transaction(connection, db_path, link.transaction_id)?.is_some())
    {
        return Err(ClientError::already_linked(
            link.expense_id,
            link.transaction_id,
        ));
    }

    let link_id = format!("lnk_{}", Ulid::new());
    let committed_at = now_rfc3339();
    let inserted = connection.execute(
        "INSERT INTO internal_reconciliation_links (
            link_id,
            expense_id,
            transaction_id,
            status,
            confidence_at_commit,
            committed_at,
            committed_by,
            run_id,
            released_at,
            released_by
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL)",
        params![
            &link_id,
            link.expense_id,
            link.transaction_id,
            link.status.as_str(),
            link.confidence,
            &committed_at,
            link.actor.as_str(),
            link.run_id
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(error) if is_constraint_violation(&error) => {
            debug!(
                expense_id = link.expense_id,
                transaction_id = link.transaction_id,
                "link insert lost the race to a concurrent commit"
            );
            return Err(ClientError::already_linked(
                link.expense_id,
                link.transaction_id,
            ));
        }
        Err(error) => return Err(map_sqlite_error(db_path, &error)),
    }

    Ok(ReconciliationLink {
        link_id,
        expense_id: link.expense_id.to_string(),
        transaction_id: link.transaction_id.to_string(),
        status: link.status,
        confidence_at_commit: link.confidence,
        committed_at,
        committed_by: link.actor.clone(),
        run_id: link.run_id.map(str::to_string),
        released_at: None,
        released_by: None,
    })
}

/// Releases an active link so both sides become matchable again.
pub fn release_link(
    connection: &Connection,
    db_path: &Path,
    link_id: &str,
    actor: &Actor,
) -> ClientResult<ReconciliationLink> {
    let sql = format!(
        "UPDATE internal_reconciliation_links
         SET status = 'released', released_at = ?2, released_by = ?3
         WHERE link_id = ?1 AND status IN {ACTIVE_STATUSES_SQL}"
    );
    let changed = connection
        .execute(&sql, params![link_id, now_rfc3339(), actor.as_str()])
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    if changed == 0 {
        return Err(ClientError::link_not_found(link_id));
    }

    let link = get_link(connection, db_path, link_id)?
        .ok_or_else(|| ClientError::link_not_found(link_id))?;
    info!(
        link_id,
        expense_id = link.expense_id.as_str(),
        transaction_id = link.transaction_id.as_str(),
        actor = actor.as_str(),
        "link released"
    );
    Ok(link)
}

pub fn get_link(
    connection: &Connection,
    db_path: &Path,
    link_id: &str,
) -> ClientResult<Option<ReconciliationLink>> {
    let sql = format!("SELECT {LINK_COLUMNS} FROM internal_reconciliation_links l WHERE l.link_id = ?1");
    query_optional_link(connection, db_path, &sql, link_id)
}

pub fn get_link_for_expense(
    connection: &Connection,
    db_path: &Path,
    expense_id: &str,
) -> ClientResult<Option<ReconciliationLink>> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM internal_reconciliation_links l
         WHERE l.expense_id = ?1 AND l.status IN {ACTIVE_STATUSES_SQL}
         LIMIT 1"
    );
    query_optional_link(connection, db_path, &sql, expense_id)
}

pub fn get_link_for_transaction(
    connection: &Connection,
    db_path: &Path,
    transaction_id: &str,
) -> ClientResult<Option<ReconciliationLink>> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM internal_reconciliation_links l
         WHERE l.transaction_id = ?1 AND l.status IN {ACTIVE_STATUSES_SQL}
         LIMIT 1"
    );
    query_optional_link(connection, db_path, &sql, transaction_id)
}

/// Links whose expense belongs to `user_id`, oldest first.
pub fn list_links(
    connection: &Connection,
    db_path: &Path,
    user_id: &str,
    include_inactive: bool,
) -> ClientResult<Vec<ReconciliationLink>> {
    let status_filter = if include_inactive {
        String::new()
    } else {
        format!("AND l.status IN {ACTIVE_STATUSES_SQL}")
    };
    let sql = format!(
        "SELECT {LINK_COLUMNS}
         FROM internal_reconciliation_links l
         JOIN internal_expenses e ON e.expense_id = l.expense_id
         WHERE e.user_id = ?1 {status_filter}
         ORDER BY l.committed_at ASC, l.link_id ASC"
    );
    let mut statement = connection
        .prepare(&sql)
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map([user_id], LinkRow::from_row)
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut links = Vec::new();
    for row in rows {
        let link_row = row.map_err(|error| map_sqlite_error(db_path, &error))?;
        links.push(link_row.into_link(db_path)?);
    }
    Ok(links)
}

/// `(expense_id, transaction_id)` pairs a human rejected; never proposed again.
pub fn rejected_pairs(
    connection: &Connection,
    db_path: &Path,
    user_id: &str,
) -> ClientResult<BTreeSet<(String, String)>> {
    let mut statement = connection
        .prepare(
            "SELECT l.expense_id, l.transaction_id
             FROM internal_reconciliation_links l
             JOIN internal_expenses e ON e.expense_id = l.expense_id
             WHERE e.user_id = ?1 AND l.status = 'rejected'",
        )
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    let rows = statement
        .query_map([user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|error| map_sqlite_error(db_path, &error))?;

    let mut pairs = BTreeSet::new();
    for row in rows {
        pairs.insert(row.map_err(|error| map_sqlite_error(db_path, &error))?);
    }
    Ok(pairs)
}

struct LinkRow {
    link_id: String,
    expense_id: String,
    transaction_id: String,
    status: String,
    confidence_at_commit: f64,
    committed_at: String,
    committed_by: String,
    run_id: Option<String>,
    released_at: Option<String>,
    released_by: Option<String>,
}

impl LinkRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            link_id: row.get(0)?,
            expense_id: row.get(1)?,
            transaction_id: row.get(2)?,
            status: row.get(3)?,
            confidence_at_commit: row.get(4)?,
            committed_at: row.get(5)?,
            committed_by: row.get(6)?,
            run_id: row.get(7)?,
            released_at: row.get(8)?,
            released_by: row.get(9)?,
        })
    }

    fn into_link(self, db_path: &Path) -> ClientResult<ReconciliationLink> {
        let status =
            LinkStatus::parse(&self.status).ok_or_else(|| ClientError::ledger_corrupt(db_path))?;
        Ok(ReconciliationLink {
            link_id: self.link_id,
            expense_id: self.expense_id,
            transaction_id: self.transaction_id,
            status,
            confidence_at_commit: self.confidence_at_commit,
            committed_at: self.committed_at,
            committed_by: Actor::from_stored(&self.committed_by),
            run_id: self.run_id,
            released_at: self.released_at,
            released_by: self.released_by.as_deref().map(Actor::from_stored),
        })
    }
}

fn query_optional_link(
    connection: &Connection,
    db_path: &Path,
    sql: &str,
    key: &str,
) -> ClientResult<Option<ReconciliationLink>> {
    let row = connection
        .query_row(sql, [key], LinkRow::from_row)
        .optional()
        .map_err(|error| map_sqlite_error(db_path, &error))?;
    row.map(|value| value.into_link(db_path)).transpose()
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use tempfile::tempdir;

    use super::{NewLink, create_link};
    use crate::model::{Actor, LinkStatus};
    use crate::setup::ensure_initialized_at;
    use crate::state::is_constraint_violation;

    fn new_link<'a>(expense_id: &'a str, transaction_id: &'a str, status: LinkStatus) -> NewLink<'a> {
        NewLink {
            expense_id,
            transaction_id,
            status,
            confidence: 0.97,
            actor: &Actor::System,
            run_id: Some("run_1"),
        }
    }

    fn insert_raw(
        connection: &Connection,
        link_id: &str,
        expense_id: &str,
        status: &str,
    ) -> rusqlite::Result<usize> {
        connection.execute(
            "INSERT INTO internal_reconciliation_links (
                link_id, expense_id, transaction_id, status, confidence_at_commit,
                committed_at, committed_by, run_id, released_at, released_by
             ) VALUES (?1, ?2, 'txn_1', ?3, 1.0, '2024-09-14T10:00:00Z', 'system', NULL, NULL, NULL)",
            [link_id, expense_id, status],
        )
    }

    #[test]
    fn second_active_link_on_either_side_is_already_linked() {
        let temp = tempdir();
        assert!(temp.is_ok());
        if let Ok(dir) = temp {
            let setup = ensure_initialized_at(dir.path());
            assert!(setup.is_ok());
            if let Ok(context) = setup {
                let connection = context.connect();
                assert!(connection.is_ok());
                if let Ok(connection) = connection {
                    let db_path = &context.db_path;
                    let first = create_link(
                        &connection,
                        db_path,
                        &new_link("exp_a", "txn_1", LinkStatus::AutoConfirmed),
                    );
                    assert!(first.is_ok());

                    for (expense_id, transaction_id) in [("exp_b", "txn_1"), ("exp_a", "txn_2")] {
                        let again = create_link(
                            &connection,
                            db_path,
                            &new_link(expense_id, transaction_id, LinkStatus::ManuallyConfirmed),
                        );
                        assert_eq!(
                            again.err().map(|error| error.code),
                            Some("already_linked".to_string())
                        );
                    }

                    let rejected = create_link(
                        &connection,
                        db_path,
                        &new_link("exp_b", "txn_1", LinkStatus::Rejected),
                    );
                    assert!(rejected.is_ok());
                }
            }
        }
    }

    #[test]
    fn unique_indexes_reject_a_second_active_link_written_directly() {
        let temp = tempdir();
        assert!(temp.is_ok());
        if let Ok(dir) = temp {
            let setup = ensure_initialized_at(dir.path());
            assert!(setup.is_ok());
            if let Ok(context) = setup {
                let connection = context.connect();
                assert!(connection.is_ok());
                if let Ok(connection) = connection {
                    assert!(insert_raw(&connection, "lnk_1", "exp_a", "auto_confirmed").is_ok());

                    let duplicate = insert_raw(&connection, "lnk_2", "exp_b", "manually_confirmed");
                    assert!(duplicate.is_err());
                    if let Err(error) = duplicate {
                        assert!(is_constraint_violation(&error));
                    }

                    assert!(insert_raw(&connection, "lnk_3", "exp_b", "released").is_ok());
                    assert!(insert_raw(&connection, "lnk_4", "exp_c", "rejected").is_ok());
                }
            }
        }
    }
}
