//! Where post-processing and callback dispatch run
use futures::future::BoxFuture;
use tokio::task::AbortHandle;

/// Accepts a unit of work and schedules it
///
/// The returned [`AbortHandle`] lets a [`QueryFuture`][crate::QueryFuture] stop result delivery
/// when it is cancelled.
pub trait Executor: std::fmt::Debug + Send + Sync + 'static {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> AbortHandle;
}

impl Executor for tokio::runtime::Handle {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> AbortHandle {
        tokio::runtime::Handle::spawn(self, task).abort_handle()
    }
}
