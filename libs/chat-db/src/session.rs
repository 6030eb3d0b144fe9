//! Request-scoped session over a SeaORM connection.

use anyhow::Context;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use tracing::debug;

use crate::integrity::{run_guarded, BoxFuture, Dialect, DomainError, GuardScope, TxSession};

/// Owns at most one open transaction, begun on first use.
///
/// Not shared between concurrent flows: each caller opens its own session.
/// A transaction still open on drop is rolled back by SeaORM.
pub struct DbSession {
    conn: DatabaseConnection,
    tx: Option<DatabaseTransaction>,
    dialect: Dialect,
}

impl DbSession {
    pub fn new(conn: DatabaseConnection) -> Self {
        let dialect = Dialect::from_backend(conn.get_database_backend());
        Self {
            conn,
            tx: None,
            dialect,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Begin a transaction unless one is already open.
    pub async fn begin(&mut self) -> Result<&DatabaseTransaction, DbErr> {
        if self.tx.is_none() {
            let tx = self.conn.begin().await?;
            debug!(dialect = %self.dialect, "session: transaction started");
            self.tx = Some(tx);
        }
        self.tx
            .as_ref()
            .ok_or_else(|| DbErr::Custom("transaction not open".into()))
    }

    /// Commit the open transaction; a no-op when none is open.
    pub async fn commit(&mut self) -> Result<(), DbErr> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!(dialect = %self.dialect, "session: transaction committed");
        }
        Ok(())
    }

    /// [`run_guarded`] on this session.
    pub async fn guarded<T, F>(&mut self, scope: GuardScope<'_>, work: F) -> Result<T, DomainError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, anyhow::Result<T>> + Send,
    {
        run_guarded(self, scope, work).await
    }
}

#[async_trait]
impl TxSession for DbSession {
    type Conn = DatabaseTransaction;

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn conn(&mut self) -> anyhow::Result<&DatabaseTransaction> {
        self.begin().await.context("begin transaction failed")
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.context("rollback failed")?;
            debug!(dialect = %self.dialect, "session: transaction rolled back");
        }
        Ok(())
    }
}
