//! Run-scoped transaction helper.
//!
//! # Responsibility
//! - Execute one logical run inside a single write transaction.
//!
//! # Invariants
//! - Success commits; any error (including a failed commit) rolls back.
//! - Deferred foreign keys are checked by the commit, so a run that leaves
//!   dangling edges never becomes visible.

use super::DbError;
use log::{error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fmt::Display;
use std::time::Instant;

/// Runs `body` inside an immediate transaction on `conn`.
///
/// `operation` is a static label used only in log events.
pub fn run_in_transaction<T, E, F>(
    conn: &mut Connection,
    operation: &'static str,
    body: F,
) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<DbError> + Display,
{
    let started_at = Instant::now();
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| E::from(DbError::from(err)))?;

    match body(&tx) {
        Ok(value) => {
            if let Err(err) = tx.commit() {
                error!(
                    "event=run_tx module=db status=error operation={} stage=commit duration_ms={} error={}",
                    operation,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(E::from(DbError::from(err)));
            }
            info!(
                "event=run_tx module=db status=ok operation={} duration_ms={}",
                operation,
                started_at.elapsed().as_millis()
            );
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(
                    "event=run_tx module=db status=error operation={} stage=rollback error={}",
                    operation, rollback_err
                );
            }
            error!(
                "event=run_tx module=db status=rolled_back operation={} duration_ms={} error={}",
                operation,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}
