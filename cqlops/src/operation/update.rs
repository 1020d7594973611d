use super::{StatementCore, statement_operation};
use crate::{session::Session, statement::Statement};

/// Writes with a single statement: an insert, update, delete, batch or truncate
///
/// Executes to the raw [`ResultSet`][crate::ResultSet], which for most writes is empty.
#[derive(Debug)]
pub struct UpdateOperation {
    core: StatementCore,
}

statement_operation!(UpdateOperation);

impl UpdateOperation {
    pub(crate) fn new(session: Session, statement: Statement) -> Self {
        Self {
            core: StatementCore::new(session, statement),
        }
    }

    pub fn statement(&self) -> &Statement {
        &self.core.statement
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::{
        QueryOperation,
        driver::memory::MemoryDriver,
        policy::ConsistencyLevel,
        session::Session,
        statement::{BatchKind, Statement},
        value::Value,
    };

    #[test_log::test(tokio::test)]
    async fn write_with_values() {
        let driver = Arc::new(MemoryDriver::new_empty());
        let session = Session::builder(Arc::clone(&driver) as _).build().unwrap();
        let operation = session
            .update_statement(Statement::with_values(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                [Value::from("alice"), Value::from(41)],
            ))
            .with_consistency_level(ConsistencyLevel::EachQuorum);
        let result = operation.execute().await.unwrap();
        assert!(result.is_empty());
        assert_eq!(
            result.info().consistency_level,
            Some(ConsistencyLevel::EachQuorum)
        );
        assert_eq!(
            operation.statement().cql(),
            Some("INSERT INTO users (name, age) VALUES (?, ?)")
        );
    }

    #[test_log::test(tokio::test)]
    async fn batch_is_one_statement() {
        let driver = Arc::new(MemoryDriver::new_empty());
        let session = Session::builder(Arc::clone(&driver) as _).build().unwrap();
        session
            .batch_update_statements(
                BatchKind::Unlogged,
                [
                    Statement::simple("DELETE FROM users WHERE name = 'a'"),
                    Statement::simple("DELETE FROM users WHERE name = 'b'"),
                ],
            )
            .execute_async()
            .await
            .unwrap();

        let executed = driver.executed();
        assert_eq!(executed.len(), 1);
        let Statement::Batch { kind, statements } = &executed[0].statement else {
            panic!("expected a batch");
        };
        assert_eq!(*kind, BatchKind::Unlogged);
        assert_eq!(statements.len(), 2);
    }
}
