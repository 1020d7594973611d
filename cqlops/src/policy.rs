//! Per-operation execution policy
use std::{fmt::Display, str::FromStr, sync::Arc};

use tracing::debug;

use crate::{driver::DriverErrorKind, error::Error, executor::Executor};

/// Number of replicas that must acknowledge a read or write
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    #[default]
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl ConsistencyLevel {
    const ALL: [(Self, &'static str); 11] = [
        (Self::Any, "any"),
        (Self::One, "one"),
        (Self::Two, "two"),
        (Self::Three, "three"),
        (Self::Quorum, "quorum"),
        (Self::All, "all"),
        (Self::LocalQuorum, "local_quorum"),
        (Self::EachQuorum, "each_quorum"),
        (Self::Serial, "serial"),
        (Self::LocalSerial, "local_serial"),
        (Self::LocalOne, "local_one"),
    ];

    pub fn as_str(&self) -> &'static str {
        Self::ALL
            .iter()
            .find_map(|(level, name)| (level == self).then_some(*name))
            .unwrap_or("unknown")
    }
}

impl Display for ConsistencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown consistency level '{0}'")]
pub struct ParseConsistencyLevelError(String);

impl FromStr for ConsistencyLevel {
    type Err = ParseConsistencyLevelError;

    /// Accepts the snake case names, in any case, e.g. `local_quorum` or `LOCAL_QUORUM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find_map(|(level, name)| name.eq_ignore_ascii_case(s).then_some(*level))
            .ok_or_else(|| ParseConsistencyLevelError(s.to_owned()))
    }
}

/// What the driver should do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Rethrow,
}

/// Strategy consulted by the driver when an attempt fails
///
/// Operations never retry on their own; they pass the policy down with the statement.
pub trait RetryPolicy: std::fmt::Debug + Send + Sync + 'static {
    /// `attempt` counts the retries already made for this statement, starting at zero
    fn on_failure(&self, kind: DriverErrorKind, attempt: u32) -> RetryDecision;
}

/// Retries a server side timeout or an unavailable coordinator once
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn on_failure(&self, kind: DriverErrorKind, attempt: u32) -> RetryDecision {
        match kind {
            DriverErrorKind::ReadTimeout
            | DriverErrorKind::WriteTimeout
            | DriverErrorKind::Unavailable
                if attempt == 0 =>
            {
                RetryDecision::Retry
            }
            _ => RetryDecision::Rethrow,
        }
    }
}

/// Never retries
#[derive(Debug, Default, Clone, Copy)]
pub struct FallthroughRetryPolicy;

impl RetryPolicy for FallthroughRetryPolicy {
    fn on_failure(&self, _kind: DriverErrorKind, _attempt: u32) -> RetryDecision {
        RetryDecision::Rethrow
    }
}

/// Observes failures on the asynchronous paths
///
/// A fallback handler cannot suppress or alter the error: it is called with the error right
/// before the error is delivered to the caller.
pub trait FallbackHandler: Send + Sync + 'static {
    fn on_failure(&self, error: &Error);
}

impl<F> FallbackHandler for F
where
    F: Fn(&Error) + Send + Sync + 'static,
{
    fn on_failure(&self, error: &Error) {
        self(error)
    }
}

/// Options the driver receives with each statement
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub consistency_level: ConsistencyLevel,
    pub retry_policy: Arc<dyn RetryPolicy>,
    pub tracing: bool,
}

/// Session wide values for every policy field an operation leaves unset
#[derive(Debug, Clone)]
pub(crate) struct PolicyDefaults {
    pub(crate) consistency_level: ConsistencyLevel,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) query_tracing: bool,
}

/// The mutable policy carried by an operation
///
/// Decorating an operation moves it, and its policy, into the decorator. Setters called on any
/// layer therefore reach this single value, and it is read once per execution call.
#[derive(Clone, Default)]
pub struct ExecutionPolicy {
    consistency_level: Option<ConsistencyLevel>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    query_tracing: Option<bool>,
    fallback_handler: Option<Arc<dyn FallbackHandler>>,
    executor: Option<Arc<dyn Executor>>,
}

impl std::fmt::Debug for ExecutionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPolicy")
            .field("consistency_level", &self.consistency_level)
            .field("retry_policy", &self.retry_policy)
            .field("query_tracing", &self.query_tracing)
            .field("fallback_handler", &self.fallback_handler.is_some())
            .field("executor", &self.executor)
            .finish()
    }
}

impl ExecutionPolicy {
    pub fn consistency_level(&self) -> Option<ConsistencyLevel> {
        self.consistency_level
    }

    pub fn set_consistency_level(&mut self, level: ConsistencyLevel) {
        self.consistency_level = Some(level);
    }

    pub fn retry_policy(&self) -> Option<&Arc<dyn RetryPolicy>> {
        self.retry_policy.as_ref()
    }

    pub fn set_retry_policy(&mut self, policy: Arc<dyn RetryPolicy>) {
        self.retry_policy = Some(policy);
    }

    pub fn query_tracing(&self) -> Option<bool> {
        self.query_tracing
    }

    pub fn set_query_tracing(&mut self, enabled: bool) {
        self.query_tracing = Some(enabled);
    }

    pub fn fallback_handler(&self) -> Option<&Arc<dyn FallbackHandler>> {
        self.fallback_handler.as_ref()
    }

    pub fn set_fallback_handler(&mut self, handler: Arc<dyn FallbackHandler>) {
        self.fallback_handler = Some(handler);
    }

    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.executor = Some(executor);
    }

    /// Resolve the options sent with a statement, falling back to the session defaults
    pub(crate) fn query_options(&self, defaults: &PolicyDefaults) -> QueryOptions {
        QueryOptions {
            consistency_level: self
                .consistency_level
                .unwrap_or(defaults.consistency_level),
            retry_policy: self
                .retry_policy
                .as_ref()
                .map_or_else(|| Arc::clone(&defaults.retry_policy), Arc::clone),
            tracing: self.query_tracing.unwrap_or(defaults.query_tracing),
        }
    }
}

/// Hand `error` to the fallback handler, if one is configured
pub(crate) fn fire_fallback(handler: Option<&Arc<dyn FallbackHandler>>, error: &Error) {
    if let Some(handler) = handler {
        debug!(%error, "invoking fallback handler");
        handler.on_failure(error);
    }
}
