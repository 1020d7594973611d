//! Statements handed to the driver
//!
//! Statements are built before an operation is created and are never modified by it.
use std::sync::Arc;

use bytes::Bytes;

use crate::value::Value;

/// How the statements of a batch are applied
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    #[default]
    Logged,
    Unlogged,
    Counter,
}

/// A statement the store has already parsed, identified by the id it returned
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreparedStatement {
    id: Bytes,
    cql: Arc<str>,
}

impl PreparedStatement {
    pub fn new(id: impl Into<Bytes>, cql: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            cql: cql.into(),
        }
    }

    pub fn id(&self) -> &Bytes {
        &self.id
    }

    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// Bind `values` to the markers of this statement, in marker order
    pub fn bind<I, V>(&self, values: I) -> BoundStatement
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        BoundStatement {
            prepared: self.clone(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// A [`PreparedStatement`] together with its bind values
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    prepared: PreparedStatement,
    values: Vec<Value>,
}

impl BoundStatement {
    pub fn prepared(&self) -> &PreparedStatement {
        &self.prepared
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// CQL text, optionally with positional values
    Simple { cql: String, values: Vec<Value> },
    Bound(BoundStatement),
    Batch {
        kind: BatchKind,
        statements: Vec<Statement>,
    },
}

impl Statement {
    pub fn simple(cql: impl Into<String>) -> Self {
        Self::Simple {
            cql: cql.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values<I, V>(cql: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Simple {
            cql: cql.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn batch(kind: BatchKind, statements: impl IntoIterator<Item = Statement>) -> Self {
        Self::Batch {
            kind,
            statements: statements.into_iter().collect(),
        }
    }

    /// The CQL text, `None` for a batch
    pub fn cql(&self) -> Option<&str> {
        match self {
            Self::Simple { cql, .. } => Some(cql),
            Self::Bound(bound) => Some(bound.prepared.cql()),
            Self::Batch { .. } => None,
        }
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Simple { .. } => "simple",
            Self::Bound(_) => "bound",
            Self::Batch { .. } => "batch",
        }
    }
}

impl From<BoundStatement> for Statement {
    fn from(bound: BoundStatement) -> Self {
        Self::Bound(bound)
    }
}

impl From<&str> for Statement {
    fn from(cql: &str) -> Self {
        Self::simple(cql)
    }
}

impl From<String> for Statement {
    fn from(cql: String) -> Self {
        Self::simple(cql)
    }
}
