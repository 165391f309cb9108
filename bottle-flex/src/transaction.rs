//! # Transaction Module
//!
//! A lazily-started transaction shared by reference across a command and the
//! nested queries it triggers. The server-side transaction opens on the first
//! statement; commit and rollback are idempotent.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    Error,
    database::{Connection, Session},
    row::Row,
};

struct TxState {
    session: Option<Box<dyn Session>>,
    committed: bool,
    end_at: Option<DateTime<Utc>>,
}

/// A transaction handle.
///
/// Statements issued through the same `Tx` are serialized on one session, so
/// concurrent fan-out queries may share it safely.
pub struct Tx {
    pub id: String,
    pub created_at: DateTime<Utc>,
    state: tokio::sync::Mutex<TxState>,
}

impl Tx {
    pub fn new() -> Self {
        Self {
            id: format!("tx:{}", Uuid::new_v4()),
            created_at: Utc::now(),
            state: tokio::sync::Mutex::new(TxState { session: None, committed: false, end_at: None }),
        }
    }

    /// Runs `sql` inside the transaction, beginning it on first use.
    pub(crate) async fn fetch_all(&self, conn: &dyn Connection, sql: &str) -> Result<Vec<Row>, Error> {
        let mut state = self.state.lock().await;
        if state.end_at.is_some() {
            return Err(Error::InvalidCommand(format!("transaction {} already finished", self.id)));
        }

        if state.session.is_none() {
            log::debug!("begin {}", self.id);
            state.session = Some(conn.begin().await?);
        }

        match state.session.as_mut() {
            Some(session) => session.fetch_all(sql).await.map_err(|source| Error::Sql { sql: sql.to_string(), source }),
            None => Err(Error::DatabaseRequired),
        }
    }

    /// Commits. A second call, or a call after rollback, does nothing.
    pub async fn commit(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.committed || state.end_at.is_some() {
            return Ok(());
        }

        if let Some(session) = state.session.take() {
            session.commit().await?;
            log::debug!("commit {}", self.id);
        }
        state.committed = true;
        state.end_at = Some(Utc::now());
        Ok(())
    }

    /// Rolls back. Does nothing once the transaction has finished.
    pub async fn rollback(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.committed || state.end_at.is_some() {
            return Ok(());
        }

        if let Some(session) = state.session.take() {
            session.rollback().await?;
            log::debug!("rollback {}", self.id);
        }
        state.end_at = Some(Utc::now());
        Ok(())
    }

    pub async fn is_committed(&self) -> bool {
        self.state.lock().await.committed
    }

    pub async fn end_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.end_at
    }

    /// True once a statement has opened the server-side transaction.
    pub async fn is_started(&self) -> bool {
        let state = self.state.lock().await;
        state.session.is_some() || state.end_at.is_some()
    }
}

impl Default for Tx {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx").field("id", &self.id).field("created_at", &self.created_at).finish()
    }
}
