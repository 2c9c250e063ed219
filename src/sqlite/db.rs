use async_trait::async_trait;
use sqlx::{Connection, SqliteConnection};
use tokio::sync::MutexGuard;
use tracing::{debug, info};

use super::{SharedConnection, SqliteOptions};
use crate::{error::BackendError, provider::DataContext};

/// DDL statements declaring a context's tables and indexes.
pub type Schema = &'static [&'static str];

/// Base data context over the run's shared connection.
///
/// Typed contexts wrap one of these and add their own queries; it can also be
/// used as a context by itself.
#[derive(Debug)]
pub struct SqliteDb {
    conn: SharedConnection,
    schema: Schema,
}

impl SqliteDb {
    #[must_use]
    pub fn new(options: &SqliteOptions, schema: Schema) -> Self {
        Self { conn: options.connection(), schema }
    }

    /// Locks the connection for queries. Holding the guard while calling
    /// `acquire` again deadlocks.
    pub async fn acquire(&self) -> MutexGuard<'_, SqliteConnection> {
        self.conn.lock().await
    }

    /// Runs the schema statements in one transaction unless the database
    /// already holds user tables. Returns whether it created anything.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails; nothing is created then.
    pub async fn ensure_created(&mut self) -> Result<bool, BackendError> {
        let mut conn = self.conn.lock().await;
        let existing = count_user_tables(&mut conn).await?;
        if existing > 0 {
            debug!(existing, "schema already present");
            return Ok(false);
        }

        let mut tx = conn.begin().await?;
        for statement in self.schema {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!(statements = self.schema.len(), "schema created");
        Ok(true)
    }
}

#[async_trait]
impl DataContext for SqliteDb {
    async fn ensure_created(&mut self) -> Result<bool, BackendError> {
        SqliteDb::ensure_created(self).await
    }
}

async fn count_user_tables(
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT count(*) FROM sqlite_schema
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%';
        "#,
    )
    .fetch_one(conn)
    .await?;
    Ok(count)
}
