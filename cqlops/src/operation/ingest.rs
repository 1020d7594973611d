use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::debug;

use super::QueryOperation;
use crate::{
    error::Result,
    future::QueryFuture,
    policy::{ExecutionPolicy, fire_fallback},
    result::ResultSet,
    session::Session,
    statement::{PreparedStatement, Statement},
    value::Value,
};

/// Executes one prepared statement once per row of bind values
///
/// Results come back in row order. The waiting paths send one statement at a time; the
/// asynchronous path keeps up to the session's ingest concurrency in flight. The first
/// failure fails the whole operation; rows already written stay written.
#[derive(Debug)]
pub struct IngestOperation {
    session: Session,
    statements: Arc<[Statement]>,
    policy: ExecutionPolicy,
}

impl IngestOperation {
    pub(crate) fn new<I>(session: Session, prepared: &PreparedStatement, rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let statements = rows
            .into_iter()
            .map(|values| Statement::from(prepared.bind(values)))
            .collect();
        Self {
            session,
            statements,
            policy: ExecutionPolicy::default(),
        }
    }

    /// Number of rows to write
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[async_trait]
impl QueryOperation for IngestOperation {
    type Output = Vec<ResultSet>;

    fn session(&self) -> &Session {
        &self.session
    }

    fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    fn policy_mut(&mut self) -> &mut ExecutionPolicy {
        &mut self.policy
    }

    async fn execute(&self) -> Result<Vec<ResultSet>> {
        let options = self.policy.query_options(self.session.policy_defaults());
        let mut results = Vec::with_capacity(self.statements.len());
        for statement in self.statements.iter() {
            results.push(self.session.run(statement, &options).await?);
        }
        Ok(results)
    }

    fn execute_async(&self) -> QueryFuture<Vec<ResultSet>> {
        let options = self.policy.query_options(self.session.policy_defaults());
        let fallback = self.policy.fallback_handler().map(Arc::clone);
        let session = self.session.clone();
        let statements = Arc::clone(&self.statements);
        let concurrency = session.ingest_concurrency().get();

        let (future, completer) = QueryFuture::pending();
        let task = self.session.io_executor().spawn(Box::pin(async move {
            debug!(rows = statements.len(), concurrency, "ingesting rows");
            let outcome = stream::iter(0..statements.len())
                .map(|i| {
                    let session = session.clone();
                    let statements = Arc::clone(&statements);
                    let options = options.clone();
                    async move { session.run(&statements[i], &options).await }
                })
                .buffered(concurrency)
                .try_collect::<Vec<_>>()
                .await;
            if let Err(error) = &outcome {
                fire_fallback(fallback.as_ref(), error);
            }
            completer.complete(outcome);
        }));
        future.attach(task)
    }
}
