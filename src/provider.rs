//! The seams a backend plugs into the lifecycle runner.
use async_trait::async_trait;

use crate::error::BackendError;

/// A connection to an isolated backing store.
#[async_trait]
pub trait Connection: Send {
    async fn open(&mut self) -> Result<(), BackendError>;

    /// Closing a connection that was never opened must succeed without doing
    /// anything.
    async fn close(&mut self) -> Result<(), BackendError>;
}

/// Supplies connections and the options every data context of a run is built
/// from.
pub trait ConnectionProvider: Send + Sync {
    type Connection: Connection;
    type Options: Clone + Send + Sync;

    /// Returns a new, unopened connection. Called once per run.
    fn create_connection(&self) -> Self::Connection;

    /// Binds options to an opened connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection can't be bound, e.g. it is not open.
    fn build_options(
        &self,
        connection: &Self::Connection,
    ) -> Result<Self::Options, BackendError>;
}

/// A short-lived handle for reads and writes against the store.
#[async_trait]
pub trait DataContext: Send {
    /// Creates the schema if the store doesn't have one yet. Returns `true`
    /// when it created it.
    async fn ensure_created(&mut self) -> Result<bool, BackendError>;
}
