//! The error taxonomy surfaced by every execution mode
use std::{fmt::Display, sync::Arc, time::Duration};

/// Boxed error returned by caller supplied row mappers, extractors and binders
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Dynamic error type that can be cloned
pub type DynError = Arc<dyn std::error::Error + Send + Sync>;

/// Broad classification of a failure reported by the backing store
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DriverFailureKind {
    /// Not enough replicas were alive, or the coordinator was overloaded
    Unavailable,
    /// The store gave up waiting on replicas for a read or a write
    ServerTimeout,
    /// The statement was rejected as malformed or invalid
    InvalidQuery,
    /// No connection to any host could be used
    Connection,
    /// The credentials were rejected or lack the needed permission
    Authentication,
    Other,
}

impl Display for DriverFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::ServerTimeout => write!(f, "server timeout"),
            Self::InvalidQuery => write!(f, "invalid query"),
            Self::Connection => write!(f, "connection"),
            Self::Authentication => write!(f, "authentication"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Primary error type for query operations
///
/// Failures are translated once, at the session boundary, and keep their kind as they travel
/// through any number of result transformers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("driver failure ({kind}): {message}")]
    Driver {
        kind: DriverFailureKind,
        message: String,
    },

    #[error("failed to process query result: {source}")]
    Transform {
        #[source]
        source: DynError,
    },

    #[error("no result was available within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("expected at most one row, but the result holds {actual}")]
    Cardinality { actual: usize },

    #[error("failed to build statement: {source}")]
    Statement {
        #[source]
        source: DynError,
    },

    #[error("the operation was cancelled before it produced a result")]
    Cancelled,
}

impl Error {
    pub(crate) fn transform(source: impl Into<BoxError>) -> Self {
        Self::Transform {
            source: Arc::from(source.into()),
        }
    }

    pub(crate) fn statement(source: impl Into<BoxError>) -> Self {
        Self::Statement {
            source: Arc::from(source.into()),
        }
    }

    /// `true` if the backing store reported this failure
    pub fn is_driver_failure(&self) -> bool {
        matches!(self, Self::Driver { .. })
    }

    /// `true` if a bounded wait ran out before the result was available
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_keeps_source() {
        let err = Error::transform("bad row");
        assert_eq!(err.to_string(), "failed to process query result: bad row");
        let source = std::error::Error::source(&err).expect("has a source");
        assert_eq!(source.to_string(), "bad row");
    }

    #[test]
    fn kinds_are_distinguishable() {
        let timeout = Error::Timeout {
            timeout: Duration::from_millis(5),
        };
        let driver = Error::Driver {
            kind: DriverFailureKind::ServerTimeout,
            message: "read timed out".into(),
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_driver_failure());
        assert!(driver.is_driver_failure());
        assert!(!driver.is_timeout());
    }
}
