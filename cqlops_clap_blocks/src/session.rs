//! Config for the defaults a session hands to its operations.

use std::{num::NonZeroUsize, sync::Arc};

use cqlops::{
    ConsistencyLevel, SessionBuilder,
    policy::{DefaultRetryPolicy, FallthroughRetryPolicy, RetryPolicy},
};

/// Retry policy used by operations that do not set their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RetryPolicyKind {
    /// Retry a server side timeout or an unavailable coordinator once.
    #[default]
    Default,

    /// Never retry.
    Fallthrough,
}

impl RetryPolicyKind {
    pub fn policy(self) -> Arc<dyn RetryPolicy> {
        match self {
            Self::Default => Arc::new(DefaultRetryPolicy),
            Self::Fallthrough => Arc::new(FallthroughRetryPolicy),
        }
    }
}

/// CLI config for session wide operation defaults.
#[derive(Debug, Clone, clap::Parser)]
#[allow(missing_copy_implementations)]
pub struct SessionConfig {
    /// Consistency level for operations that do not set one, e.g. `one` or `local_quorum`.
    #[clap(
        long = "consistency-level",
        env = "CQLOPS_CONSISTENCY_LEVEL",
        default_value_t = ConsistencyLevel::default(),
        action
    )]
    pub consistency_level: ConsistencyLevel,

    /// Retry policy for operations that do not set one.
    #[clap(
        long = "retry-policy",
        env = "CQLOPS_RETRY_POLICY",
        default_value_t = RetryPolicyKind::default(),
        value_enum,
        action
    )]
    pub retry_policy: RetryPolicyKind,

    /// Ask the store to trace statements of operations that do not say otherwise.
    #[clap(long = "query-tracing", env = "CQLOPS_QUERY_TRACING", action)]
    pub query_tracing: bool,

    /// Number of bound statements kept in flight by an asynchronous ingest.
    #[clap(
        long = "ingest-concurrency",
        env = "CQLOPS_INGEST_CONCURRENCY",
        action
    )]
    pub ingest_concurrency: Option<NonZeroUsize>,
}

impl SessionConfig {
    /// Apply these defaults to a session under construction.
    pub fn apply(&self, builder: SessionBuilder) -> SessionBuilder {
        let builder = builder
            .with_consistency_level(self.consistency_level)
            .with_retry_policy(self.retry_policy.policy())
            .with_query_tracing(self.query_tracing);
        match self.ingest_concurrency {
            Some(concurrency) => builder.with_ingest_concurrency(concurrency),
            None => builder,
        }
    }
}
