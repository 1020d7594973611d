use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{ProcessingOperation, QueryOperation, StatementCore, statement_operation};
use crate::{
    error::{BoxError, Result},
    future::QueryFuture,
    policy::ExecutionPolicy,
    process::{
        process_as_maps, process_count, process_each, process_exists, process_first_column,
        process_one, process_one_as_map, process_one_first_column, process_one_row, process_rows,
        process_with_extractor,
    },
    result::{ResultSet, Row},
    session::Session,
    statement::Statement,
    value::{FromValue, Value},
};

/// Reads rows with a single statement
///
/// Executes to the raw [`ResultSet`]; the transformer methods decorate it to produce
/// application values instead.
#[derive(Debug)]
pub struct SelectOperation {
    core: StatementCore,
}

statement_operation!(SelectOperation);

impl SelectOperation {
    pub(crate) fn new(session: Session, statement: Statement) -> Self {
        Self {
            core: StatementCore::new(session, statement),
        }
    }

    pub fn statement(&self) -> &Statement {
        &self.core.statement
    }

    /// Take the first row, ignoring any others
    pub fn first_row(self) -> SelectOneOperation {
        SelectOneOperation::new(self, false)
    }

    /// Take the only row; more than one is a [cardinality failure][crate::Error::Cardinality]
    pub fn single_result(self) -> SelectOneOperation {
        SelectOneOperation::new(self, true)
    }

    /// Map every row
    pub fn map<T, F>(self, mapper: F) -> ProcessingOperation<Self, Vec<T>>
    where
        T: Send + 'static,
        F: Fn(&Row) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.process(move |result| process_rows(result, &mapper))
    }

    /// The first column of every row
    pub fn first_column<E>(self) -> ProcessingOperation<Self, Vec<E>>
    where
        E: FromValue + Send + 'static,
    {
        self.process(process_first_column::<E>)
    }

    /// Every row as a column name to value map
    pub fn map_columns(self) -> ProcessingOperation<Self, Vec<IndexMap<String, Value>>> {
        self.process(process_as_maps)
    }

    /// Whether the statement matched any row
    pub fn exists(self) -> ProcessingOperation<Self, bool> {
        self.process(|result| Ok(process_exists(result)))
    }

    /// Read a count from the first column of the first row
    pub fn count(self) -> ProcessingOperation<Self, i64> {
        self.process(process_count)
    }

    /// Hand the whole result to `extractor`
    pub fn transform<T, F>(self, extractor: F) -> ProcessingOperation<Self, T>
    where
        T: Send + 'static,
        F: Fn(ResultSet) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.process(move |result| process_with_extractor(result, &extractor))
    }

    /// Call `handler` on each row in order
    pub fn for_each<F>(self, handler: F) -> ProcessingOperation<Self, ()>
    where
        F: Fn(&Row) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.process(move |result| process_each(result, &handler))
    }
}

/// A select reduced to at most one row
///
/// Created by [`SelectOperation::first_row`] and [`SelectOperation::single_result`]; its
/// own transformers keep the chosen row policy.
#[derive(Debug)]
pub struct SelectOneOperation {
    inner: ProcessingOperation<SelectOperation, Option<Row>>,
    single_result: bool,
}

impl SelectOneOperation {
    fn new(select: SelectOperation, single_result: bool) -> Self {
        Self {
            inner: select.process(move |result| process_one_row(result, single_result)),
            single_result,
        }
    }

    /// `true` if more than one row is a failure rather than ignored
    pub fn is_single_result(&self) -> bool {
        self.single_result
    }

    /// Map the row
    pub fn map<T, F>(self, mapper: F) -> ProcessingOperation<SelectOperation, Option<T>>
    where
        T: Send + 'static,
        F: Fn(&Row) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let single_result = self.single_result;
        self.inner
            .into_delegate()
            .process(move |result| process_one(result, &mapper, single_result))
    }

    /// The first column of the row
    pub fn first_column<E>(self) -> ProcessingOperation<SelectOperation, Option<E>>
    where
        E: FromValue + Send + 'static,
    {
        let single_result = self.single_result;
        self.inner
            .into_delegate()
            .process(move |result| process_one_first_column(result, single_result))
    }

    /// The row as a column name to value map
    pub fn map_columns(
        self,
    ) -> ProcessingOperation<SelectOperation, Option<IndexMap<String, Value>>> {
        let single_result = self.single_result;
        self.inner
            .into_delegate()
            .process(move |result| process_one_as_map(result, single_result))
    }
}

#[async_trait]
impl QueryOperation for SelectOneOperation {
    type Output = Option<Row>;

    fn session(&self) -> &Session {
        self.inner.session()
    }

    fn policy(&self) -> &ExecutionPolicy {
        self.inner.policy()
    }

    fn policy_mut(&mut self) -> &mut ExecutionPolicy {
        self.inner.policy_mut()
    }

    async fn execute(&self) -> Result<Option<Row>> {
        self.inner.execute().await
    }

    fn execute_async(&self) -> QueryFuture<Option<Row>> {
        self.inner.execute_async()
    }

    async fn execute_nonstop(&self, timeout: Duration) -> Result<Option<Row>> {
        self.inner.execute_nonstop(timeout).await
    }
}
