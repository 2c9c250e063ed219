#![warn(clippy::missing_const_for_fn, clippy::must_use_candidate)]

//! Run data-access tests against a throwaway database.
//!
//! A [`Harness`] opens one connection per run, creates the schema, runs an
//! optional setup callable and then the test body, each on a freshly built
//! data context, and always closes the connection at the end.
//!
//! ```ignore
//! let harness = scratchdb::sqlite::in_memory(|options| {
//!     Ok(scratchdb::sqlite::SqliteDb::new(options, SCHEMA))
//! });
//! harness
//!     .test::<sqlx::Error>()
//!     .setup(|db, _| Box::pin(async move { seed(db).await }))
//!     .body(|db, _| Box::pin(async move { check(db).await }))
//!     .run(&CancellationToken::new())
//!     .await?;
//! ```

pub mod error;
pub mod provider;
pub mod runner;
pub mod sqlite;

pub use error::{BackendError, Error, HarnessResult};
pub use provider::{Connection, ConnectionProvider, DataContext};
pub use runner::{phase, BoxFuture, Harness, Phase, TestRun};
pub use tokio_util::sync::CancellationToken;
