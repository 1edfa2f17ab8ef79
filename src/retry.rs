//! Transaction runner.
//!
//! Each attempt opens its own Sea-ORM transaction, reads what it needs and
//! writes through guarded updates (`... WHERE enrolled_count < capacity`,
//! `... WHERE remaining_credits = <observed>`). A guard that matches no row
//! means another transaction committed first; the attempt aborts, its
//! transaction is dropped (rolled back), and the runner starts over from fresh
//! reads. No process-local locks are taken.
//!
//! The database can also end an attempt itself when two transactions touch
//! the same rows: SQLite answers `SQLITE_BUSY` / `SQLITE_LOCKED`, Postgres a
//! serialization failure or a detected deadlock. Those are treated exactly
//! like a lost guard.

use std::future::Future;
use std::time::Duration;

use sea_orm::{DbErr, RuntimeErr, SqlErr};
use tracing::{debug, error};

use crate::error::{Error, Result};

/// SQLite busy/locked result codes (primary and extended) and the Postgres
/// SQLSTATEs for serialization failure, deadlock and lock timeout.
const CONTENDED_CODES: &[&str] = &[
    "5", "6", "261", "262", "517", "773", // SQLite
    "40001", "40P01", "55P03", // Postgres
];

/// Why a single transaction attempt stopped.
#[derive(Debug)]
pub(crate) enum Abort {
    /// Final outcome; returned to the caller as is.
    Rejected(Error),
    /// A write guard lost a race. The attempt is retried from scratch.
    Contended(&'static str),
}

impl From<Error> for Abort {
    fn from(err: Error) -> Self {
        match err {
            Error::Store(db) => db.into(),
            other => Self::Rejected(other),
        }
    }
}

impl From<DbErr> for Abort {
    fn from(err: DbErr) -> Self {
        if is_lock_contention(&err) {
            Self::Contended("database lock")
        } else {
            Self::Rejected(Error::Store(err))
        }
    }
}

/// True when an insert collided with a row committed by a concurrent writer.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// True when the database aborted the statement because a concurrent
/// transaction holds the rows or the file.
pub(crate) fn is_lock_contention(err: &DbErr) -> bool {
    let runtime = match err {
        DbErr::Exec(runtime) | DbErr::Query(runtime) | DbErr::Conn(runtime) => runtime,
        _ => return false,
    };

    match runtime {
        #[cfg(any(feature = "postgres", feature = "sqlite"))]
        RuntimeErr::SqlxError(sqlx_err) => sqlx_err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| is_contended_code(&code)),
        _ => false,
    }
}

fn is_contended_code(code: &str) -> bool {
    CONTENDED_CODES.contains(&code)
}

/// Bounded retry policy for contended transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Linear backoff unit; attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub(crate) async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, Abort>>,
    {
        let max_attempts = self.max_attempts.max(1);

        for n in 1..=max_attempts {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(Abort::Rejected(err)) => return Err(err),
                Err(Abort::Contended(guard)) => {
                    debug!(operation, attempt = n, guard, "write guard lost a race");
                    if n < max_attempts {
                        tokio::time::sleep(self.backoff * n).await;
                    }
                }
            }
        }

        error!(operation, attempts = max_attempts, "transaction retries exhausted");
        Err(Error::RetriesExhausted {
            operation,
            attempts: max_attempts,
        })
    }
}
