//! A one-shot completion cell and the handle callers hold onto it
//!
//! Every asynchronous execution resolves a single cell exactly once, either with a value or
//! with an [`Error`]. The [`QueryFuture`] handle offers two views onto that cell: awaiting it
//! ([`get`][QueryFuture::get], or `.await` directly), and registering callbacks
//! ([`on_complete`][QueryFuture::on_complete] and friends). Both views observe the same state
//! machine:
//!
//! ```text
//! pending ──resolve──▶ notifying ──queue drained──▶ done ──get──▶ taken
//! ```
//!
//! Callbacks registered while pending run after resolution in registration order; callbacks
//! registered once the outcome is known run immediately on the registering thread. A callback
//! registered while earlier callbacks are still being delivered, i.e. after
//! [`is_done`][QueryFuture::is_done] turned `true` but before the handle can be awaited, joins
//! that delivery instead: it runs on the delivering thread, after the callbacks ahead of it and
//! before any waiter wakes. Registration itself never blocks on a running callback.
//!
//! A panicking callback is logged and skipped; the callbacks after it still run and the handle
//! still reaches its terminal state.
use std::{
    future::IntoFuture,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::Duration,
};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::{sync::Notify, task::AbortHandle};
use tracing::{debug, warn};

use crate::error::{Error, Result};

type Callback<T> = Box<dyn FnOnce(Result<&T, &Error>) + Send>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    /// The outcome is held by whoever is running callbacks; late registrations queue here
    Notifying(Vec<Callback<T>>),
    Done(Result<T>),
    Taken,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    done: Notify,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending(Vec::new())),
            done: Notify::new(),
        }
    }

    /// Move from pending to the terminal state; returns `false` if already resolved
    fn resolve(&self, outcome: Result<T>) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            let State::Pending(callbacks) = &mut *state else {
                return false;
            };
            let callbacks = std::mem::take(callbacks);
            *state = State::Notifying(Vec::new());
            callbacks
        };
        self.notify(outcome, callbacks);
        true
    }

    /// Run `callbacks`, then any that were queued meanwhile, then publish the outcome
    ///
    /// The lock is never held while a callback runs.
    fn notify(&self, outcome: Result<T>, mut callbacks: Vec<Callback<T>>) {
        loop {
            for callback in callbacks.drain(..) {
                if catch_unwind(AssertUnwindSafe(|| callback(outcome.as_ref()))).is_err() {
                    warn!("query future callback panicked");
                }
            }
            let mut state = self.state.lock();
            if let State::Notifying(late) = &mut *state {
                if !late.is_empty() {
                    callbacks = std::mem::take(late);
                    continue;
                }
            }
            *state = State::Done(outcome);
            break;
        }
        self.done.notify_waiters();
    }

    fn register(&self, callback: Callback<T>) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Pending(callbacks) | State::Notifying(callbacks) => {
                callbacks.push(callback);
                return;
            }
            State::Done(_) | State::Taken => {}
        }
        let outcome = match std::mem::replace(&mut *state, State::Notifying(Vec::new())) {
            State::Done(outcome) => outcome,
            other => {
                // taken: the value has been handed out and no handle is left to register on
                *state = other;
                return;
            }
        };
        drop(state);
        self.notify(outcome, vec![callback]);
    }

    fn try_take(&self) -> Option<Result<T>> {
        let mut state = self.state.lock();
        if !matches!(*state, State::Done(_)) {
            return None;
        }
        match std::mem::replace(&mut *state, State::Taken) {
            State::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    fn is_resolved(&self) -> bool {
        !matches!(*self.state.lock(), State::Pending(_))
    }
}

/// Awaitable, cancellable handle on the eventual result of an operation
///
/// Dropping the handle does not stop the operation; use [`cancel`][Self::cancel] for that.
pub struct QueryFuture<T> {
    shared: Arc<Shared<T>>,
    /// Tasks producing this result, including those of upstream operations
    tasks: Vec<AbortHandle>,
}

impl<T> std::fmt::Debug for QueryFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryFuture")
            .field("done", &self.shared.is_resolved())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl<T: Send + 'static> QueryFuture<T> {
    /// Create a pending handle along with the [`Completer`] that resolves it
    pub(crate) fn pending() -> (Self, Completer<T>) {
        let shared = Arc::new(Shared::new());
        let completer = Completer {
            shared: Some(Arc::clone(&shared)),
        };
        (
            Self {
                shared,
                tasks: Vec::new(),
            },
            completer,
        )
    }

    /// Record a task whose abortion should accompany cancellation of this handle
    pub(crate) fn attach(mut self, task: AbortHandle) -> Self {
        self.tasks.push(task);
        self
    }

    pub(crate) fn attach_all(mut self, tasks: impl IntoIterator<Item = AbortHandle>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub(crate) fn tasks(&self) -> impl Iterator<Item = AbortHandle> + '_ {
        self.tasks.iter().cloned()
    }

    /// `true` once the outcome is known
    pub fn is_done(&self) -> bool {
        self.shared.is_resolved()
    }

    /// Stop delivery of the result
    ///
    /// The handle resolves to [`Error::Cancelled`] and the tasks producing it are aborted. This
    /// does not guarantee the store abandons work it already started. Returns `false`, and does
    /// nothing, if the handle was already resolved.
    pub fn cancel(&self) -> bool {
        if !self.shared.resolve(Err(Error::Cancelled)) {
            return false;
        }
        debug!(tasks = self.tasks.len(), "query future cancelled");
        for task in &self.tasks {
            task.abort();
        }
        true
    }

    /// Register a callback for the terminal outcome
    ///
    /// Runs immediately if the outcome is already published; see the
    /// [module docs][crate::future] for registrations that race with delivery.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(Result<&T, &Error>) + Send + 'static,
    {
        self.shared.register(Box::new(callback));
    }

    /// Register a callback that only runs if the handle succeeds
    pub fn on_success<F>(&self, callback: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Ok(value) = outcome {
                callback(value);
            }
        });
    }

    /// Register a callback that only runs if the handle fails
    pub fn on_failure<F>(&self, callback: F)
    where
        F: FnOnce(&Error) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Err(error) = outcome {
                callback(error);
            }
        });
    }

    /// Wait for the outcome and take it
    pub async fn get(self) -> Result<T> {
        loop {
            let notified = self.shared.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self.shared.try_take() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Wait at most `timeout` for the outcome
    ///
    /// Running out of time fails with [`Error::Timeout`] but leaves the operation itself
    /// running; only the wait is abandoned.
    pub async fn get_timeout(self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, self.get()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(?timeout, "gave up waiting for query result");
                Err(Error::Timeout { timeout })
            }
        }
    }
}

impl<T: Send + 'static> IntoFuture for QueryFuture<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.get())
    }
}

/// The resolving side of a [`QueryFuture`]
///
/// If the completer is dropped without resolving, e.g. because its task was aborted or
/// panicked, the handle resolves to [`Error::Cancelled`] so no waiter is left hanging.
pub(crate) struct Completer<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> Completer<T> {
    pub(crate) fn complete(mut self, outcome: Result<T>) {
        if let Some(shared) = self.shared.take() {
            shared.resolve(outcome);
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.resolve(Err(Error::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    #[tokio::test]
    async fn callbacks_fire_once_in_registration_order() {
        let (future, completer) = QueryFuture::<u32>::pending();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            future.on_complete(move |outcome| seen.lock().push((i, *outcome.unwrap())));
        }
        assert!(!future.is_done());
        assert!(seen.lock().is_empty());

        completer.complete(Ok(9));
        assert!(future.is_done());
        assert_eq!(*seen.lock(), vec![(0, 9), (1, 9), (2, 9)]);
        assert_eq!(future.get().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn late_callback_fires_immediately() {
        let (future, completer) = QueryFuture::<&'static str>::pending();
        completer.complete(Err(Error::Cardinality { actual: 2 }));

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_captured = Arc::clone(&fired);
        future.on_failure(move |error| {
            assert!(matches!(error, Error::Cardinality { actual: 2 }));
            fired_captured.fetch_add(1, Ordering::SeqCst);
        });
        let never = Arc::clone(&fired);
        future.on_success(move |_| {
            never.fetch_add(100, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(matches!(
            future.await,
            Err(Error::Cardinality { actual: 2 })
        ));
    }

    #[test]
    fn resolves_at_most_once() {
        let shared = Shared::<i32>::new();
        assert!(shared.resolve(Ok(1)));
        assert!(!shared.resolve(Ok(2)));
        assert!(!shared.resolve(Err(Error::Cancelled)));
        assert_eq!(shared.try_take().unwrap().unwrap(), 1);
        assert!(shared.try_take().is_none());
    }

    #[tokio::test]
    async fn cancel_after_resolution_is_a_noop() {
        let (future, completer) = QueryFuture::<i32>::pending();
        completer.complete(Ok(5));
        assert!(!future.cancel());
        assert_eq!(future.get().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn cancel_aborts_attached_task() {
        let (future, completer) = QueryFuture::<i32>::pending();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            completer.complete(Ok(1));
        });
        let future = future.attach(task.abort_handle());
        assert!(future.cancel());
        assert!(matches!(future.get().await, Err(Error::Cancelled)));
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn dropped_completer_resolves_cancelled() {
        let (future, completer) = QueryFuture::<i32>::pending();
        drop(completer);
        assert!(matches!(future.get().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn waiter_is_woken_by_resolution_on_another_task() {
        let (future, completer) = QueryFuture::<String>::pending();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            completer.complete(Ok("late".to_string()));
        });
        assert_eq!(future.get().await.unwrap(), "late");
    }

    #[tokio::test]
    async fn get_timeout_reports_timeout() {
        let (future, _completer) = QueryFuture::<i32>::pending();
        let err = future
            .get_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn callback_may_register_on_the_same_handle() {
        let (future, completer) = QueryFuture::<i32>::pending();
        let future = Arc::new(future);
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner_future = Arc::clone(&future);
        let inner_order = Arc::clone(&order);
        future.on_complete(move |_| {
            inner_order.lock().push("outer");
            let nested_order = Arc::clone(&inner_order);
            inner_future.on_complete(move |_| nested_order.lock().push("nested"));
        });
        let tail_order = Arc::clone(&order);
        future.on_complete(move |_| tail_order.lock().push("second"));

        completer.complete(Ok(1));
        assert_eq!(*order.lock(), vec!["outer", "second", "nested"]);
    }

    #[tokio::test]
    async fn panicking_callback_does_not_stall_the_handle() {
        let (future, completer) = QueryFuture::<i32>::pending();
        future.on_complete(|_| panic!("callback blew up"));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_captured = Arc::clone(&fired);
        future.on_success(move |value| {
            fired_captured.fetch_add(*value as usize, Ordering::SeqCst);
        });

        tokio::spawn(async move { completer.complete(Ok(3)) })
            .await
            .unwrap();
        assert!(future.is_done());
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(
            future.get_timeout(Duration::from_secs(5)).await.unwrap(),
            3
        );
    }

    #[test]
    fn registration_during_delivery_joins_the_delivering_thread() {
        let (future, completer) = QueryFuture::<i32>::pending();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        future.on_complete(move |_| {
            entered_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });

        let delivering = std::thread::spawn(move || {
            completer.complete(Ok(1));
            std::thread::current().id()
        });
        entered_rx.recv().unwrap();
        assert!(future.is_done());

        let ran_on = Arc::new(Mutex::new(None));
        let ran_on_captured = Arc::clone(&ran_on);
        future.on_complete(move |outcome| {
            assert_eq!(*outcome.unwrap(), 1);
            *ran_on_captured.lock() = Some(std::thread::current().id());
        });
        assert!(ran_on.lock().is_none());

        release_tx.send(()).unwrap();
        let delivering_id = delivering.join().unwrap();
        assert_eq!(*ran_on.lock(), Some(delivering_id));
        assert!(matches!(future.shared.try_take(), Some(Ok(1))));
    }
}
