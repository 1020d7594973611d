//! Configurable, executable units of work against a [`Session`]
//!
//! Every operation implements [`QueryOperation`], which carries the fluent policy setters and
//! the four ways of running it:
//!
//! * [`execute`][QueryOperation::execute] waits for the result.
//! * [`execute_async`][QueryOperation::execute_async] returns a [`QueryFuture`] right away.
//! * [`execute_async_with`][QueryOperation::execute_async_with] hands the outcome to a
//!   [`CallbackHandler`] on the operation's executor.
//! * [`execute_nonstop`][QueryOperation::execute_nonstop] waits for at most a given duration;
//!   running out of time fails the call but leaves the statement running.
//!
//! Operations decorate each other through [`QueryOperation::process`]: the decorator owns the
//! operation it wraps, so the policy set on any layer is the one the statement runs with.
use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::warn;

use crate::{
    error::{Error, Result},
    executor::Executor,
    future::QueryFuture,
    policy::{ConsistencyLevel, ExecutionPolicy, FallbackHandler, RetryPolicy, fire_fallback},
    result::ResultSet,
    session::Session,
    statement::Statement,
};

mod ingest;
mod processing;
mod select;
mod update;

pub use ingest::IngestOperation;
pub use processing::ProcessingOperation;
pub use select::{SelectOneOperation, SelectOperation};
pub use update::UpdateOperation;

/// An operation that can be configured and then executed any number of times
#[async_trait]
pub trait QueryOperation: Debug + Send + Sync + Sized + 'static {
    type Output: Send + 'static;

    fn session(&self) -> &Session;

    fn policy(&self) -> &ExecutionPolicy;

    fn policy_mut(&mut self) -> &mut ExecutionPolicy;

    /// Consistency level the statement is sent with
    fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.policy_mut().set_consistency_level(level);
        self
    }

    /// Retry policy the driver consults when the statement fails
    fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy_mut().set_retry_policy(policy);
        self
    }

    /// Ask the store to trace the statement
    fn with_query_tracing(mut self, enabled: bool) -> Self {
        self.policy_mut().set_query_tracing(enabled);
        self
    }

    /// Observe failures of asynchronous executions
    ///
    /// The handler sees each error before the caller does; it cannot suppress it.
    fn with_fallback_handler(mut self, handler: impl FallbackHandler) -> Self {
        self.policy_mut().set_fallback_handler(Arc::new(handler));
        self
    }

    /// Executor for post-processing and callback dispatch
    fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.policy_mut().set_executor(executor);
        self
    }

    /// The configured executor, or the session's default one
    fn executor(&self) -> Arc<dyn Executor> {
        self.policy()
            .executor()
            .map_or_else(|| self.session().default_executor(), Arc::clone)
    }

    /// Run the operation and wait for its result
    async fn execute(&self) -> Result<Self::Output>;

    /// Start the operation and return a handle on its eventual result
    fn execute_async(&self) -> QueryFuture<Self::Output>;

    /// Start the operation and deliver its outcome to `handler`
    ///
    /// The handler runs on the operation's [executor][Self::executor].
    fn execute_async_with<H>(&self, handler: H)
    where
        H: CallbackHandler<Self::Output>,
    {
        let future = self.execute_async();
        self.executor().spawn(Box::pin(async move {
            match future.get().await {
                Ok(value) => handler.on_complete(value),
                Err(error) => handler.on_failure(error),
            }
        }));
    }

    /// Run the operation, waiting at most `timeout` for its result
    ///
    /// On timeout this fails with [`Error::Timeout`]; the statement is not cancelled.
    async fn execute_nonstop(&self, timeout: Duration) -> Result<Self::Output> {
        self.execute_async().get_timeout(timeout).await
    }

    /// Decorate this operation with a function applied to each of its results
    fn process<T, F>(self, processor: F) -> ProcessingOperation<Self, T>
    where
        T: Send + 'static,
        F: Fn(Self::Output) -> Result<T> + Send + Sync + 'static,
    {
        ProcessingOperation::new(self, processor)
    }
}

/// Receives the outcome of [`QueryOperation::execute_async_with`]
///
/// Any `FnOnce(T)` is a handler that only cares about success; failures it does not handle are
/// logged.
pub trait CallbackHandler<T>: Sized + Send + 'static {
    fn on_complete(self, value: T);

    fn on_failure(self, error: Error) {
        warn!(%error, "unhandled asynchronous query failure");
    }
}

impl<T, F> CallbackHandler<T> for F
where
    F: FnOnce(T) + Send + 'static,
{
    fn on_complete(self, value: T) {
        self(value)
    }
}

/// A single statement bound to a session, along with its policy
#[derive(Debug)]
pub(crate) struct StatementCore {
    pub(crate) session: Session,
    pub(crate) statement: Arc<Statement>,
    pub(crate) policy: ExecutionPolicy,
}

impl StatementCore {
    pub(crate) fn new(session: Session, statement: Statement) -> Self {
        Self {
            session,
            statement: Arc::new(statement),
            policy: ExecutionPolicy::default(),
        }
    }

    pub(crate) async fn execute(&self) -> Result<ResultSet> {
        let options = self.policy.query_options(self.session.policy_defaults());
        self.session.run(&self.statement, &options).await
    }

    /// Send the statement from the session's I/O executor
    pub(crate) fn execute_async(&self) -> QueryFuture<ResultSet> {
        let options = self.policy.query_options(self.session.policy_defaults());
        let fallback = self.policy.fallback_handler().map(Arc::clone);
        let session = self.session.clone();
        let statement = Arc::clone(&self.statement);

        let (future, completer) = QueryFuture::pending();
        let task = self.session.io_executor().spawn(Box::pin(async move {
            let outcome = session.run(&statement, &options).await;
            if let Err(error) = &outcome {
                fire_fallback(fallback.as_ref(), error);
            }
            completer.complete(outcome);
        }));
        future.attach(task)
    }
}

/// Implement [`QueryOperation`] for a type wrapping a [`StatementCore`] in its `core` field
macro_rules! statement_operation {
    ($name:ident) => {
        #[async_trait::async_trait]
        impl $crate::operation::QueryOperation for $name {
            type Output = $crate::result::ResultSet;

            fn session(&self) -> &$crate::session::Session {
                &self.core.session
            }

            fn policy(&self) -> &$crate::policy::ExecutionPolicy {
                &self.core.policy
            }

            fn policy_mut(&mut self) -> &mut $crate::policy::ExecutionPolicy {
                &mut self.core.policy
            }

            async fn execute(&self) -> $crate::error::Result<$crate::result::ResultSet> {
                self.core.execute().await
            }

            fn execute_async(&self) -> $crate::future::QueryFuture<$crate::result::ResultSet> {
                self.core.execute_async()
            }
        }
    };
}
pub(crate) use statement_operation;
