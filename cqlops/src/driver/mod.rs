//! The seam between operations and the backing store's driver
//!
//! A [`Driver`] sends statements over whatever transport it owns and reports failures with its
//! own [`DriverError`]. Those errors never leave the [`Session`][crate::Session]: an
//! [`ExceptionTranslator`] turns each one into an [`Error`] at the boundary.
use std::fmt::Debug;

use async_trait::async_trait;

use crate::{
    error::{DriverFailureKind, Error},
    policy::QueryOptions,
    result::ResultSet,
    statement::{PreparedStatement, Statement},
};

pub mod memory;

/// Native failure categories reported by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    Unavailable,
    Overloaded,
    ReadTimeout,
    WriteTimeout,
    Syntax,
    Invalid,
    Unauthorized,
    Authentication,
    NoHostAvailable,
    Other,
}

/// A failure as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct DriverError {
    kind: DriverErrorKind,
    message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The backing store's driver
///
/// Dropping a future returned by [`execute`][Driver::execute] is how a caller cancels the
/// request, for drivers that support it.
#[async_trait]
pub trait Driver: Debug + Send + Sync + 'static {
    /// Execute a statement under the given options
    async fn execute(
        &self,
        statement: &Statement,
        options: &QueryOptions,
    ) -> Result<ResultSet, DriverError>;

    /// Prepare a statement on the store
    async fn prepare(&self, cql: &str) -> Result<PreparedStatement, DriverError>;
}

/// Converts driver failures into the crate's [`Error`]
pub trait ExceptionTranslator: Debug + Send + Sync + 'static {
    fn translate(&self, error: DriverError) -> Error;
}

/// Stock mapping from [`DriverErrorKind`] to [`DriverFailureKind`]
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExceptionTranslator;

impl ExceptionTranslator for DefaultExceptionTranslator {
    fn translate(&self, error: DriverError) -> Error {
        let kind = match error.kind {
            DriverErrorKind::Unavailable | DriverErrorKind::Overloaded => {
                DriverFailureKind::Unavailable
            }
            DriverErrorKind::ReadTimeout | DriverErrorKind::WriteTimeout => {
                DriverFailureKind::ServerTimeout
            }
            DriverErrorKind::Syntax | DriverErrorKind::Invalid => DriverFailureKind::InvalidQuery,
            DriverErrorKind::Unauthorized | DriverErrorKind::Authentication => {
                DriverFailureKind::Authentication
            }
            DriverErrorKind::NoHostAvailable => DriverFailureKind::Connection,
            DriverErrorKind::Other => DriverFailureKind::Other,
        };
        Error::Driver {
            kind,
            message: error.message,
        }
    }
}
