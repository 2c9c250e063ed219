use std::{
    fmt::{Debug, Display},
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    error::{BackendError, Error, HarnessResult},
    provider::{Connection, ConnectionProvider, DataContext},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A setup or test-body callable. It borrows the phase's data context for as
/// long as its future runs.
pub type Phase<C, E> = Box<
    dyn Send
        + for<'a> FnOnce(
            &'a mut C,
            CancellationToken,
        ) -> BoxFuture<'a, Result<(), E>>,
>;

type ContextFactory<O, C> =
    Box<dyn Send + Sync + Fn(&O) -> Result<C, BackendError>>;

/// Boxes a closure into a [`Phase`].
///
/// ```ignore
/// let body = phase(|ctx: &mut MyContext, _cancel| {
///     Box::pin(async move { ctx.check().await })
/// });
/// ```
pub fn phase<C, E, F>(f: F) -> Phase<C, E>
where
    F: Send
        + 'static
        + for<'a> FnOnce(
            &'a mut C,
            CancellationToken,
        ) -> BoxFuture<'a, Result<(), E>>,
{
    Box::new(f)
}

/// Runs `fut` unless `cancel` fires first. Cancellation is checked before the
/// step is polled.
async fn cancellable<T, E>(
    cancel: &CancellationToken,
    fut: impl Future<Output = HarnessResult<T, E>>,
) -> HarnessResult<T, E> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

/// Runs test bodies against a fresh, schema-created store per run.
pub struct Harness<P: ConnectionProvider, C> {
    provider: P,
    make_context: ContextFactory<P::Options, C>,
}

impl<P, C> Harness<P, C>
where
    P: ConnectionProvider,
    C: DataContext + 'static,
{
    pub fn new<F>(provider: P, make_context: F) -> Self
    where
        F: Fn(&P::Options) -> Result<C, BackendError> + Send + Sync + 'static,
    {
        Self { provider, make_context: Box::new(make_context) }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Starts building a run.
    #[must_use]
    pub const fn test<E>(&self) -> TestRun<'_, P, C, E> {
        TestRun { harness: self, setup: None, body: None }
    }

    /// Opens a connection, creates the schema, runs `setup` (if any) and then
    /// `test_body`, each on its own data context, and closes the connection
    /// whatever happened.
    ///
    /// # Errors
    ///
    /// [`Error::MissingTestBody`] if `test_body` is `None`; nothing is opened
    /// in that case. Otherwise the first backend failure, cancellation or
    /// callable failure, unchanged. A close failure is only returned when
    /// everything before it succeeded.
    ///
    /// # Panics
    ///
    /// A panic in a callable is resumed once the connection has been closed.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn run_test<E>(
        &self,
        test_body: Option<Phase<C, E>>,
        setup: Option<Phase<C, E>>,
        cancel: &CancellationToken,
    ) -> HarnessResult<(), E>
    where
        E: Display + Debug + Send + 'static,
    {
        let Some(test_body) = test_body else {
            warn!("test run started without a body");
            return Err(Error::MissingTestBody);
        };

        let mut connection = self.provider.create_connection();
        let outcome = AssertUnwindSafe(self.run_phases(
            &mut connection,
            test_body,
            setup,
            cancel,
        ))
        .catch_unwind()
        .await;

        debug!("closing connection");
        let closed = connection.close().await;
        match outcome {
            Ok(Ok(())) => {
                closed?;
                debug!("test run done");
                Ok(())
            }
            Ok(Err(err)) => {
                error!(%err, "test run failed");
                if let Err(close_err) = closed {
                    warn!(%close_err, "could not close connection");
                }
                Err(err)
            }
            Err(panic) => {
                error!("test run panicked");
                if let Err(close_err) = closed {
                    warn!(%close_err, "could not close connection");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn run_phases<E>(
        &self,
        connection: &mut P::Connection,
        test_body: Phase<C, E>,
        setup: Option<Phase<C, E>>,
        cancel: &CancellationToken,
    ) -> HarnessResult<(), E> {
        debug!("opening connection");
        cancellable(cancel, async {
            connection.open().await.map_err(Error::<E>::from)
        })
        .await?;
        let options = self.provider.build_options(connection)?;

        debug!("creating schema");
        {
            let mut context = (self.make_context)(&options)?;
            let created = cancellable(cancel, async {
                context.ensure_created().await.map_err(Error::<E>::from)
            })
            .await?;
            debug!(created, "schema ready");
        }

        if let Some(setup) = setup {
            debug!("running setup");
            let mut context = (self.make_context)(&options)?;
            cancellable(cancel, async {
                setup(&mut context, cancel.clone()).await.map_err(Error::Failed)
            })
            .await?;
        }

        debug!("running test body");
        let mut context = (self.make_context)(&options)?;
        cancellable(cancel, async {
            test_body(&mut context, cancel.clone())
                .await
                .map_err(Error::Failed)
        })
        .await
    }
}

/// Builder for a single run: `harness.test().setup(..).body(..).run(&cancel)`.
pub struct TestRun<'h, P: ConnectionProvider, C, E> {
    harness: &'h Harness<P, C>,
    setup: Option<Phase<C, E>>,
    body: Option<Phase<C, E>>,
}

impl<'h, P, C, E> TestRun<'h, P, C, E>
where
    P: ConnectionProvider,
    C: DataContext + 'static,
    E: Display + Debug + Send + 'static,
{
    /// Seeds the store before the body runs.
    #[must_use]
    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Send
            + 'static
            + for<'a> FnOnce(
                &'a mut C,
                CancellationToken,
            ) -> BoxFuture<'a, Result<(), E>>,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    #[must_use]
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Send
            + 'static
            + for<'a> FnOnce(
                &'a mut C,
                CancellationToken,
            ) -> BoxFuture<'a, Result<(), E>>,
    {
        self.body = Some(Box::new(body));
        self
    }

    /// See [`Harness::run_test`].
    ///
    /// # Errors
    ///
    /// [`Error::MissingTestBody`] if no body was set, otherwise whatever the
    /// run failed with.
    pub async fn run(self, cancel: &CancellationToken) -> HarnessResult<(), E> {
        self.harness.run_test(self.body, self.setup, cancel).await
    }
}
