use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::task::AbortHandle;

use super::QueryOperation;
use crate::{
    error::Result,
    future::QueryFuture,
    policy::{ExecutionPolicy, fire_fallback},
    session::Session,
};

type Processor<I, O> = dyn Fn(I) -> Result<O> + Send + Sync;

/// Applies a function to every result of the operation it wraps
///
/// The wrapped operation is owned, so policy setters called on either layer configure the
/// same statement. Each execution of the decorator runs the wrapped operation exactly once.
pub struct ProcessingOperation<Op: QueryOperation, T> {
    delegate: Op,
    processor: Arc<Processor<Op::Output, T>>,
}

impl<Op: QueryOperation, T> Debug for ProcessingOperation<Op, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingOperation")
            .field("delegate", &self.delegate)
            .finish_non_exhaustive()
    }
}

impl<Op, T> ProcessingOperation<Op, T>
where
    Op: QueryOperation,
    T: Send + 'static,
{
    pub(crate) fn new<F>(delegate: Op, processor: F) -> Self
    where
        F: Fn(Op::Output) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            delegate,
            processor: Arc::new(processor),
        }
    }

    /// The operation whose results are processed
    pub fn delegate(&self) -> &Op {
        &self.delegate
    }

    /// Drop the processor and get the wrapped operation back, policy included
    pub fn into_delegate(self) -> Op {
        self.delegate
    }
}

#[async_trait]
impl<Op, T> QueryOperation for ProcessingOperation<Op, T>
where
    Op: QueryOperation,
    T: Send + 'static,
{
    type Output = T;

    fn session(&self) -> &Session {
        self.delegate.session()
    }

    fn policy(&self) -> &ExecutionPolicy {
        self.delegate.policy()
    }

    fn policy_mut(&mut self) -> &mut ExecutionPolicy {
        self.delegate.policy_mut()
    }

    async fn execute(&self) -> Result<T> {
        let raw = self.delegate.execute().await?;
        (self.processor)(raw)
    }

    /// Processing runs on this operation's executor once the raw result arrives
    ///
    /// A processor failure is shown to the fallback handler before it resolves the handle.
    /// Failures of the wrapped operation were already shown to it upstream.
    fn execute_async(&self) -> QueryFuture<T> {
        let raw = self.delegate.execute_async();
        let upstream: Vec<AbortHandle> = raw.tasks().collect();
        let processor = Arc::clone(&self.processor);
        let fallback = self.policy().fallback_handler().map(Arc::clone);

        let (future, completer) = QueryFuture::pending();
        let task = self.executor().spawn(Box::pin(async move {
            let outcome = match raw.get().await {
                Ok(raw) => {
                    let processed = processor(raw);
                    if let Err(error) = &processed {
                        fire_fallback(fallback.as_ref(), error);
                    }
                    processed
                }
                Err(error) => Err(error),
            };
            completer.complete(outcome);
        }));
        future.attach_all(upstream).attach(task)
    }

    /// Only the wait for the raw result is bounded; processing it is not
    async fn execute_nonstop(&self, timeout: Duration) -> Result<T> {
        let raw = self.delegate.execute_nonstop(timeout).await?;
        (self.processor)(raw)
    }
}
