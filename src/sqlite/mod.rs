//! In-memory SQLite backend for the harness.
pub mod db;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqliteConnection};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use self::db::{Schema, SqliteDb};
use crate::{
    error::BackendError,
    provider::{Connection, ConnectionProvider, DataContext},
    runner::Harness,
};

pub(crate) type SharedConnection = Arc<Mutex<SqliteConnection>>;

/// Hands out connections to private `:memory:` databases. Every opened
/// connection is a separate database that disappears when it closes.
#[derive(Clone, Debug)]
pub struct SqliteMemory {
    connect_options: SqliteConnectOptions,
}

impl SqliteMemory {
    /// Uses `connect_options` instead of the in-memory defaults.
    #[must_use]
    pub const fn with_connect_options(
        connect_options: SqliteConnectOptions,
    ) -> Self {
        Self { connect_options }
    }
}

impl Default for SqliteMemory {
    fn default() -> Self {
        // `new()` names a plain ":memory:" file, which sqlite never shares
        // between connections.
        let connect_options = SqliteConnectOptions::new()
            .foreign_keys(true)
            .pragma("temp_store", "memory");
        Self { connect_options }
    }
}

impl ConnectionProvider for SqliteMemory {
    type Connection = SqliteHandle;
    type Options = SqliteOptions;

    fn create_connection(&self) -> SqliteHandle {
        SqliteHandle {
            connect_options: self.connect_options.clone(),
            conn: None,
        }
    }

    fn build_options(
        &self,
        connection: &SqliteHandle,
    ) -> Result<SqliteOptions, BackendError> {
        let conn = connection.conn.as_ref().ok_or(BackendError::NotOpen)?;
        Ok(SqliteOptions { conn: Arc::clone(conn) })
    }
}

/// A connection that is opened and closed by the harness.
#[derive(Debug)]
pub struct SqliteHandle {
    connect_options: SqliteConnectOptions,
    conn: Option<SharedConnection>,
}

impl SqliteHandle {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.conn.is_some()
    }
}

#[async_trait]
impl Connection for SqliteHandle {
    async fn open(&mut self) -> Result<(), BackendError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = self.connect_options.connect().await?;
        self.conn = Some(Arc::new(Mutex::new(conn)));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        let Some(conn) = self.conn.take() else {
            debug!("connection was never opened");
            return Ok(());
        };
        match Arc::try_unwrap(conn) {
            Ok(conn) => {
                sqlx::Connection::close(conn.into_inner()).await?;
            }
            Err(conn) => {
                // The driver closes the connection once the last holder
                // drops it.
                warn!(
                    holders = Arc::strong_count(&conn) - 1,
                    "connection still held elsewhere, releasing handle"
                );
            }
        }
        Ok(())
    }
}

/// Options every data context of one run is built from. Cloning shares the
/// same open connection.
#[derive(Clone, Debug)]
pub struct SqliteOptions {
    conn: SharedConnection,
}

impl SqliteOptions {
    pub(crate) fn connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }
}

/// A harness over [`SqliteMemory::default`].
pub fn in_memory<C, F>(make_context: F) -> Harness<SqliteMemory, C>
where
    C: DataContext + 'static,
    F: Fn(&SqliteOptions) -> Result<C, BackendError> + Send + Sync + 'static,
{
    Harness::new(SqliteMemory::default(), make_context)
}
