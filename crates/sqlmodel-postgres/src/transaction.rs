//! Transaction helper (C10): `BEGIN`/`COMMIT`/`ROLLBACK` with optional
//! per-transaction row-level-security variables and a `Drop`-based safety net.

use crate::connection::Connection;
use crate::error::{Error, TransactionError, TransactionErrorKind};
use crate::protocol::TransactionStatus;
use crate::rls::RlsContext;

/// A running transaction borrowed from a [`Connection`].
///
/// If dropped without an explicit [`Transaction::commit`] or
/// [`Transaction::rollback`], the transaction is rolled back automatically.
/// Errors from that deferred rollback are logged, not returned, since `Drop`
/// cannot propagate a `Result`.
pub struct Transaction<'a> {
    conn: &'a mut Connection,
    finished: bool,
}

impl<'a> Transaction<'a> {
    /// `BEGIN`, then one `SET LOCAL` per entry in `rls` (if any), scoped to
    /// this transaction only.
    pub fn begin(conn: &'a mut Connection, rls: Option<&RlsContext>) -> Result<Self, Error> {
        conn.query("BEGIN")?;

        if conn.transaction_status() != TransactionStatus::InTransaction {
            conn.query("ROLLBACK").ok();
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::Aborted,
                message: "BEGIN did not transition the connection into a transaction".to_string(),
            }));
        }

        let mut txn = Transaction { conn, finished: false };

        if let Some(rls) = rls {
            for stmt in rls.to_local_statements() {
                if let Err(e) = txn.conn.query(&stmt) {
                    txn.finished = true;
                    txn.conn.query("ROLLBACK").ok();
                    return Err(e);
                }
            }
        }

        Ok(txn)
    }

    /// Run `sql` within this transaction via the simple query protocol.
    pub fn query(&mut self, sql: &str) -> Result<crate::connection::QueryResult, Error> {
        self.conn.query(sql)
    }

    /// Access the underlying connection, e.g. to call [`Connection::execute`]
    /// against a statement prepared on it.
    pub fn connection(&mut self) -> &mut Connection {
        self.conn
    }

    /// `COMMIT`. Fails with [`TransactionErrorKind::NotActive`] if this
    /// transaction was already finalized, and with
    /// [`TransactionErrorKind::Aborted`] if the server reports the
    /// transaction was in a failed state at commit time.
    pub fn commit(mut self) -> Result<(), Error> {
        self.finish("COMMIT")
    }

    /// `ROLLBACK`. Fails with [`TransactionErrorKind::NotActive`] if this
    /// transaction was already finalized.
    pub fn rollback(mut self) -> Result<(), Error> {
        self.finish("ROLLBACK")
    }

    fn finish(&mut self, sql: &'static str) -> Result<(), Error> {
        if self.finished {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotActive,
                message: format!("{sql} called on a transaction that was already finalized"),
            }));
        }
        self.finished = true;
        self.conn.query(sql)?;

        if self.conn.transaction_status() != TransactionStatus::Idle {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::Aborted,
                message: format!("{sql} did not return the connection to idle"),
            }));
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Err(e) = self.conn.query("ROLLBACK") {
                tracing::warn!(error = %e, "deferred rollback on dropped transaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_error_display_mentions_kind() {
        let err = TransactionError {
            kind: TransactionErrorKind::NotActive,
            message: "already finalized".to_string(),
        };
        assert!(format!("{err}").contains("NotActive"));
    }
}
