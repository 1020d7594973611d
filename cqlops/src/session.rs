//! The session façade: the entry point for building operations
//!
//! A [`Session`] owns the driver, the exception translator and the defaults every operation
//! falls back to. It is cheap to clone; clones share all of that state.
use std::{future::Future, num::NonZeroUsize, sync::Arc};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::{
    driver::{DefaultExceptionTranslator, Driver, DriverError, ExceptionTranslator},
    error::{BoxError, Error, Result},
    executor::Executor,
    operation::{
        IngestOperation, ProcessingOperation, QueryOperation, SelectOperation, UpdateOperation,
    },
    policy::{ConsistencyLevel, DefaultRetryPolicy, PolicyDefaults, QueryOptions, RetryPolicy},
    result::ResultSet,
    statement::{BatchKind, BoundStatement, PreparedStatement, Statement},
    value::Value,
};

/// Bound statements kept in flight by an asynchronous ingest, unless configured otherwise
pub const DEFAULT_INGEST_CONCURRENCY: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no executor was configured and no tokio runtime is running: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Configures and creates a [`Session`]
#[derive(Debug)]
pub struct SessionBuilder {
    driver: Arc<dyn Driver>,
    translator: Arc<dyn ExceptionTranslator>,
    consistency_level: ConsistencyLevel,
    retry_policy: Arc<dyn RetryPolicy>,
    query_tracing: bool,
    io: Option<Arc<dyn Executor>>,
    executor: Option<Arc<dyn Executor>>,
    ingest_concurrency: NonZeroUsize,
}

impl SessionBuilder {
    fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            translator: Arc::new(DefaultExceptionTranslator),
            consistency_level: ConsistencyLevel::default(),
            retry_policy: Arc::new(DefaultRetryPolicy),
            query_tracing: false,
            io: None,
            executor: None,
            ingest_concurrency: NonZeroUsize::new(DEFAULT_INGEST_CONCURRENCY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }

    pub fn with_exception_translator(mut self, translator: Arc<dyn ExceptionTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Consistency level for operations that do not set one
    pub fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency_level = level;
        self
    }

    /// Retry policy for operations that do not set one
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Query tracing for operations that do not set it
    pub fn with_query_tracing(mut self, enabled: bool) -> Self {
        self.query_tracing = enabled;
        self
    }

    /// Where statements are sent from on the asynchronous paths
    pub fn with_io_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.io = Some(executor);
        self
    }

    /// Executor for operations that do not set one
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_ingest_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.ingest_concurrency = concurrency;
        self
    }

    /// Create the session
    ///
    /// Executors that were not configured default to the current tokio runtime, which then
    /// has to exist.
    pub fn build(self) -> Result<Session, BuildError> {
        let (io, executor) = match (self.io, self.executor) {
            (Some(io), Some(executor)) => (io, executor),
            (io, executor) => {
                let current: Arc<dyn Executor> = Arc::new(Handle::try_current()?);
                (
                    io.unwrap_or_else(|| Arc::clone(&current)),
                    executor.unwrap_or(current),
                )
            }
        };

        info!(
            consistency_level = %self.consistency_level,
            retry_policy = ?self.retry_policy,
            query_tracing = self.query_tracing,
            ingest_concurrency = self.ingest_concurrency.get(),
            "session created"
        );

        Ok(Session {
            inner: Arc::new(SessionInner {
                driver: self.driver,
                translator: self.translator,
                defaults: PolicyDefaults {
                    consistency_level: self.consistency_level,
                    retry_policy: self.retry_policy,
                    query_tracing: self.query_tracing,
                },
                io,
                executor,
                ingest_concurrency: self.ingest_concurrency,
            }),
        })
    }
}

#[derive(Debug)]
struct SessionInner {
    driver: Arc<dyn Driver>,
    translator: Arc<dyn ExceptionTranslator>,
    defaults: PolicyDefaults,
    io: Arc<dyn Executor>,
    executor: Arc<dyn Executor>,
    ingest_concurrency: NonZeroUsize,
}

/// Builds operations and runs statements against a [`Driver`]
///
/// Every driver failure is translated into an [`Error`] here, before any caller sees it.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn builder(driver: Arc<dyn Driver>) -> SessionBuilder {
        SessionBuilder::new(driver)
    }

    pub(crate) fn policy_defaults(&self) -> &PolicyDefaults {
        &self.inner.defaults
    }

    pub(crate) fn io_executor(&self) -> &Arc<dyn Executor> {
        &self.inner.io
    }

    pub(crate) fn default_executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.inner.executor)
    }

    pub(crate) fn ingest_concurrency(&self) -> NonZeroUsize {
        self.inner.ingest_concurrency
    }

    /// Send one statement, translating a failure
    pub(crate) async fn run(
        &self,
        statement: &Statement,
        options: &QueryOptions,
    ) -> Result<ResultSet> {
        debug!(
            kind = statement.kind(),
            cql = statement.cql().unwrap_or_default(),
            consistency_level = %options.consistency_level,
            query_tracing = options.tracing,
            "executing statement"
        );
        self.inner
            .driver
            .execute(statement, options)
            .await
            .map_err(|e| self.translate(e))
    }

    fn translate(&self, error: DriverError) -> Error {
        let error = self.inner.translator.translate(error);
        warn!(%error, "statement failed");
        error
    }

    /// Prepare `cql` on the store
    pub async fn prepare(&self, cql: &str) -> Result<PreparedStatement> {
        debug!(cql, "preparing statement");
        self.inner
            .driver
            .prepare(cql)
            .await
            .map_err(|e| self.translate(e))
    }

    /// Bind the values produced by `binder` to `prepared`
    ///
    /// A binder failure is reported as [`Error::Statement`].
    pub fn bind<F>(&self, prepared: &PreparedStatement, binder: F) -> Result<BoundStatement>
    where
        F: FnOnce(&PreparedStatement) -> Result<Vec<Value>, BoxError>,
    {
        let values = binder(prepared).map_err(Error::statement)?;
        Ok(prepared.bind(values))
    }

    /// Run `callback` directly against the driver, translating its failure
    pub async fn execute_with<T, F, Fut>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Driver>) -> Fut + Send,
        Fut: Future<Output = Result<T, DriverError>> + Send,
        T: Send,
    {
        callback(Arc::clone(&self.inner.driver))
            .await
            .map_err(|e| self.translate(e))
    }

    pub fn select(&self, cql: impl Into<String>) -> SelectOperation {
        self.select_statement(Statement::simple(cql))
    }

    pub fn select_statement(&self, statement: impl Into<Statement>) -> SelectOperation {
        SelectOperation::new(self.clone(), statement.into())
    }

    /// Select with a prepared statement and the values `binder` produces for it
    pub fn select_prepared<F>(
        &self,
        prepared: &PreparedStatement,
        binder: F,
    ) -> Result<SelectOperation>
    where
        F: FnOnce(&PreparedStatement) -> Result<Vec<Value>, BoxError>,
    {
        Ok(self.select_statement(self.bind(prepared, binder)?))
    }

    /// Select with the statement `creator` builds
    pub fn select_with<F>(&self, creator: F) -> Result<SelectOperation>
    where
        F: FnOnce() -> Result<Statement, BoxError>,
    {
        Ok(self.select_statement(creator().map_err(Error::statement)?))
    }

    pub fn update(&self, cql: impl Into<String>) -> UpdateOperation {
        self.update_statement(Statement::simple(cql))
    }

    pub fn update_statement(&self, statement: impl Into<Statement>) -> UpdateOperation {
        UpdateOperation::new(self.clone(), statement.into())
    }

    /// Write with a prepared statement and the values `binder` produces for it
    pub fn update_prepared<F>(
        &self,
        prepared: &PreparedStatement,
        binder: F,
    ) -> Result<UpdateOperation>
    where
        F: FnOnce(&PreparedStatement) -> Result<Vec<Value>, BoxError>,
    {
        Ok(self.update_statement(self.bind(prepared, binder)?))
    }

    /// Write with the statement `creator` builds
    pub fn update_with<F>(&self, creator: F) -> Result<UpdateOperation>
    where
        F: FnOnce() -> Result<Statement, BoxError>,
    {
        Ok(self.update_statement(creator().map_err(Error::statement)?))
    }

    /// A logged batch of CQL statements
    pub fn batch_update<I, S>(&self, cqls: I) -> UpdateOperation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.batch_update_statements(BatchKind::Logged, cqls.into_iter().map(Statement::simple))
    }

    pub fn batch_update_statements(
        &self,
        kind: BatchKind,
        statements: impl IntoIterator<Item = Statement>,
    ) -> UpdateOperation {
        self.update_statement(Statement::batch(kind, statements))
    }

    /// Count the rows of `table`
    pub fn count_all_operation(&self, table: &str) -> ProcessingOperation<SelectOperation, i64> {
        self.select(format!("SELECT COUNT(*) FROM {table}")).count()
    }

    pub async fn count_all(&self, table: &str) -> Result<i64> {
        self.count_all_operation(table).execute().await
    }

    /// Remove every row of `table`
    pub fn truncate_operation(&self, table: &str) -> UpdateOperation {
        self.update(format!("TRUNCATE {table}"))
    }

    pub async fn truncate(&self, table: &str) -> Result<ResultSet> {
        self.truncate_operation(table).execute().await
    }

    /// Execute `prepared` once per row of bind values
    pub fn ingest_operation<I>(&self, prepared: &PreparedStatement, rows: I) -> IngestOperation
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        IngestOperation::new(self.clone(), prepared, rows)
    }

    /// Execute `prepared` once per row of bind values, one row at a time
    pub fn ingest<I>(
        &self,
        prepared: &PreparedStatement,
        rows: I,
    ) -> impl Future<Output = Result<Vec<ResultSet>>> + Send + 'static
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let operation = self.ingest_operation(prepared, rows);
        async move { operation.execute().await }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        driver::{DriverErrorKind, memory::MemoryDriver},
        error::DriverFailureKind,
        policy::FallthroughRetryPolicy,
    };

    fn session() -> (Session, Arc<MemoryDriver>) {
        let driver = Arc::new(MemoryDriver::new(|statement| {
            match statement.cql() {
                Some(cql) if cql.starts_with("SELECT COUNT(*)") => {
                    Ok(ResultSet::builder(["count"]).row([3_i64]).build())
                }
                Some(cql) if cql.starts_with("BROKEN") => Err(DriverError::new(
                    DriverErrorKind::Syntax,
                    "no viable alternative at input 'BROKEN'",
                )),
                _ => Ok(ResultSet::empty()),
            }
        }));
        let session = Session::builder(Arc::clone(&driver) as _).build().unwrap();
        (session, driver)
    }

    #[test]
    fn build_without_runtime_fails() {
        let err = Session::builder(Arc::new(MemoryDriver::new_empty()))
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::NoRuntime(_)));
    }

    #[test]
    fn build_with_explicit_executors() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle: Arc<dyn Executor> = Arc::new(runtime.handle().clone());
        let session = Session::builder(Arc::new(MemoryDriver::new_empty()))
            .with_io_executor(Arc::clone(&handle))
            .with_executor(handle)
            .build()
            .unwrap();

        let exists = runtime
            .block_on(session.select("SELECT * FROM t").exists().execute_async().get())
            .unwrap();
        assert!(!exists);
    }

    #[test_log::test(tokio::test)]
    async fn driver_failures_are_translated() {
        let (session, _driver) = session();
        let err = session.update("BROKEN STATEMENT").execute().await.unwrap_err();
        let Error::Driver { kind, message } = err else {
            panic!("expected a driver failure");
        };
        assert_eq!(kind, DriverFailureKind::InvalidQuery);
        assert_eq!(message, "no viable alternative at input 'BROKEN'");
    }

    #[test_log::test(tokio::test)]
    async fn session_defaults_apply() {
        let driver = Arc::new(MemoryDriver::new_empty());
        let session = Session::builder(Arc::clone(&driver) as _)
            .with_consistency_level(ConsistencyLevel::One)
            .with_retry_policy(Arc::new(FallthroughRetryPolicy))
            .with_query_tracing(true)
            .build()
            .unwrap();
        let result = session.select("SELECT * FROM t").execute().await.unwrap();
        assert!(result.info().tracing_id.is_some());

        let options = &driver.executed()[0].options;
        assert_eq!(options.consistency_level, ConsistencyLevel::One);
        assert!(options.tracing);
        assert_eq!(format!("{:?}", options.retry_policy), "FallthroughRetryPolicy");
    }

    #[test_log::test(tokio::test)]
    async fn count_and_truncate() {
        let (session, driver) = session();
        assert_eq!(session.count_all("users").await.unwrap(), 3);
        session.truncate("users").await.unwrap();

        let cqls: Vec<_> = driver
            .executed()
            .into_iter()
            .filter_map(|e| e.statement.cql().map(str::to_string))
            .collect();
        assert_eq!(cqls, ["SELECT COUNT(*) FROM users", "TRUNCATE users"]);
    }

    #[test_log::test(tokio::test)]
    async fn binder_failure_is_a_statement_failure() {
        let (session, driver) = session();
        let prepared = session
            .prepare("SELECT * FROM users WHERE id = ?")
            .await
            .unwrap();

        let err = session
            .select_prepared(&prepared, |_| Err("missing id".into()))
            .unwrap_err();
        assert!(matches!(err, Error::Statement { .. }));

        let operation = session
            .select_prepared(&prepared, |_| Ok(vec![Value::from(7)]))
            .unwrap();
        operation.execute().await.unwrap();
        let Statement::Bound(bound) = &driver.executed()[0].statement else {
            panic!("expected a bound statement");
        };
        assert_eq!(bound.values(), [Value::Int(7)]);
    }

    #[test_log::test(tokio::test)]
    async fn creators_build_lazily() {
        let (session, _driver) = session();
        let operation = session
            .update_with(|| Ok(Statement::simple("DELETE FROM users WHERE id = 1")))
            .unwrap();
        assert_eq!(
            operation.statement().cql(),
            Some("DELETE FROM users WHERE id = 1")
        );

        let err = session
            .select_with(|| Err("unknown table".into()))
            .unwrap_err();
        assert!(matches!(err, Error::Statement { .. }));
    }

    #[test_log::test(tokio::test)]
    async fn batch_update_is_logged() {
        let (session, driver) = session();
        session
            .batch_update(["DELETE FROM a WHERE k = 1", "DELETE FROM b WHERE k = 1"])
            .execute()
            .await
            .unwrap();
        let Statement::Batch { kind, statements } = &driver.executed()[0].statement else {
            panic!("expected a batch");
        };
        assert_eq!(*kind, BatchKind::Logged);
        assert_eq!(statements[1].cql(), Some("DELETE FROM b WHERE k = 1"));
    }

    #[test_log::test(tokio::test)]
    async fn execute_with_translates() {
        let (session, _driver) = session();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_callback = Arc::clone(&calls);
        let prepared = session
            .execute_with(move |driver| async move {
                calls_in_callback.fetch_add(1, Ordering::SeqCst);
                driver.prepare("SELECT * FROM users").await
            })
            .await
            .unwrap();
        assert_eq!(prepared.cql(), "SELECT * FROM users");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = session
            .execute_with(|_| async {
                Err::<(), _>(DriverError::new(DriverErrorKind::NoHostAvailable, "all down"))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Driver {
                kind: DriverFailureKind::Connection,
                ..
            }
        ));
    }
}
