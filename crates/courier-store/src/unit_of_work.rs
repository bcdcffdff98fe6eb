use sqlx::postgres::{PgConnection, PgPool, Postgres};
use sqlx::Transaction;

use crate::{Result, StoreError};

/// Transaction scope for one unit of business work.
///
/// `conn()` hands out the inner connection for repository calls. `commit()`
/// closes the current transaction; the next `conn()` call silently opens a
/// fresh one, so long-running handlers can commit per batch without
/// rebuilding their collaborators.
pub struct UnitOfWork {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl UnitOfWork {
    pub async fn begin(pool: &PgPool) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Self {
            pool: pool.clone(),
            tx: Some(tx),
        })
    }

    /// The connection of the active transaction, opening one if needed.
    pub async fn conn(&mut self) -> Result<&mut PgConnection> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(StoreError::NoTransaction),
        }
    }

    pub async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
