//! A scripted, in-process [`Driver`]
//!
//! Answers each statement by calling a handler, and records what it was asked to do so tests
//! can inspect the statements and options that reached the store.
use std::{
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{Driver, DriverError};
use crate::{
    policy::{QueryOptions, RetryDecision},
    result::{ExecutionInfo, ResultSet},
    statement::{PreparedStatement, Statement},
};

type Handler = dyn Fn(&Statement) -> Result<ResultSet, DriverError> + Send + Sync;

/// A statement the driver was asked to execute, with the options it came with
#[derive(Debug, Clone)]
pub struct ExecutedStatement {
    pub statement: Statement,
    pub options: QueryOptions,
}

pub struct MemoryDriver {
    handler: Box<Handler>,
    latency: Option<Duration>,
    executed: Mutex<Vec<ExecutedStatement>>,
    attempts: AtomicUsize,
    completed: AtomicUsize,
    next_prepared_id: AtomicU64,
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("latency", &self.latency)
            .field("executed", &self.executed.lock().len())
            .field("completed", &self.completed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MemoryDriver {
    /// Create a driver that answers every statement with `handler`
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Statement) -> Result<ResultSet, DriverError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: None,
            executed: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            next_prepared_id: AtomicU64::new(1),
        }
    }

    /// Create a driver that answers every statement with an empty result
    pub fn new_empty() -> Self {
        Self::new(|_| Ok(ResultSet::empty()))
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Statements received so far, in arrival order
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.executed.lock().clone()
    }

    /// Number of times the handler was called, retries included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of statements that finished, successfully or not
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn execute(
        &self,
        statement: &Statement,
        options: &QueryOptions,
    ) -> Result<ResultSet, DriverError> {
        self.executed.lock().push(ExecutedStatement {
            statement: statement.clone(),
            options: options.clone(),
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut attempt = 0;
        let outcome = loop {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match (self.handler)(statement) {
                Ok(result) => break Ok(result),
                Err(e) => match options.retry_policy.on_failure(e.kind(), attempt) {
                    RetryDecision::Retry => {
                        debug!(attempt, error = %e, "retrying statement");
                        attempt += 1;
                    }
                    RetryDecision::Rethrow => break Err(e),
                },
            }
        };
        self.completed.fetch_add(1, Ordering::SeqCst);

        outcome.map(|result| {
            result.with_info(ExecutionInfo {
                consistency_level: Some(options.consistency_level),
                tracing_id: options.tracing.then(Uuid::new_v4),
            })
        })
    }

    async fn prepare(&self, cql: &str) -> Result<PreparedStatement, DriverError> {
        let id = self.next_prepared_id.fetch_add(1, Ordering::SeqCst);
        Ok(PreparedStatement::new(
            Bytes::copy_from_slice(&id.to_be_bytes()),
            cql,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        driver::DriverErrorKind,
        policy::{ConsistencyLevel, DefaultRetryPolicy, FallthroughRetryPolicy},
    };

    fn options(retry_policy: Arc<dyn crate::policy::RetryPolicy>) -> QueryOptions {
        QueryOptions {
            consistency_level: ConsistencyLevel::Quorum,
            retry_policy,
            tracing: true,
        }
    }

    #[tokio::test]
    async fn records_statements_and_reports_info() {
        let driver = MemoryDriver::new_empty();
        let result = driver
            .execute(
                &Statement::simple("SELECT 1"),
                &options(Arc::new(FallthroughRetryPolicy)),
            )
            .await
            .unwrap();
        assert_eq!(
            result.info().consistency_level,
            Some(ConsistencyLevel::Quorum)
        );
        assert!(result.info().tracing_id.is_some());
        let executed = driver.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].statement.cql(), Some("SELECT 1"));
        assert_eq!(driver.completed(), 1);
    }

    #[tokio::test]
    async fn consults_retry_policy() {
        let failing = || {
            MemoryDriver::new(|_| {
                Err(DriverError::new(
                    DriverErrorKind::ReadTimeout,
                    "replicas too slow",
                ))
            })
        };

        let driver = failing();
        let stmt = Statement::simple("SELECT * FROM t");
        let err = driver
            .execute(&stmt, &options(Arc::new(DefaultRetryPolicy)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DriverErrorKind::ReadTimeout);
        assert_eq!(driver.attempts(), 2);

        let driver = failing();
        driver
            .execute(&stmt, &options(Arc::new(FallthroughRetryPolicy)))
            .await
            .unwrap_err();
        assert_eq!(driver.attempts(), 1);
    }

    #[tokio::test]
    async fn prepared_ids_are_unique() {
        let driver = MemoryDriver::new_empty();
        let a = driver.prepare("INSERT INTO t (a) VALUES (?)").await.unwrap();
        let b = driver.prepare("INSERT INTO t (a) VALUES (?)").await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.cql(), b.cql());
    }
}
