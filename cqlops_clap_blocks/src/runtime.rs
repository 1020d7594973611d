//! Config for the two tokio runtimes a session runs on.
//!
//! Statements are sent from the `io` runtime. Result processing and callback dispatch run on
//! the `callback` runtime, which by default gets a lower scheduling priority so slow
//! application callbacks do not starve the driver.

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use cqlops::{SessionBuilder, executor::Executor};
use paste::paste;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

/// Scheduler a runtime uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RuntimeFlavor {
    /// Everything runs on one thread, and only while something blocks on the runtime.
    CurrentThread,

    /// Work stealing across a pool of worker threads.
    #[default]
    MultiThread,
}

/// Knobs shared by every runtime config, gathered once parsed.
#[derive(Debug, Clone, Copy)]
struct RuntimeSettings {
    role: &'static str,
    flavor: RuntimeFlavor,
    workers: Option<NonZeroUsize>,
    max_blocking_threads: Option<NonZeroUsize>,
    thread_keep_alive: Option<Duration>,
    niceness: Option<i32>,
}

impl RuntimeSettings {
    fn build(self) -> std::io::Result<Runtime> {
        let mut builder = match self.flavor {
            RuntimeFlavor::CurrentThread => Builder::new_current_thread(),
            RuntimeFlavor::MultiThread => {
                let mut builder = Builder::new_multi_thread();
                let workers = match self.workers {
                    Some(n) => n,
                    None => std::thread::available_parallelism()?,
                };
                builder.worker_threads(workers.get());
                builder
            }
        };
        builder.enable_all();

        let role = self.role;
        let counter = Arc::new(AtomicUsize::new(0));
        builder.thread_name_fn(move || {
            format!("cqlops-{role}-{}", counter.fetch_add(1, Ordering::Relaxed))
        });

        if let Some(n) = self.max_blocking_threads {
            builder.max_blocking_threads(n.get());
        }
        if let Some(keep_alive) = self.thread_keep_alive {
            builder.thread_keep_alive(keep_alive);
        }
        if let Some(niceness) = self.niceness {
            renice_workers(&mut builder, niceness);
        }

        info!(
            role,
            flavor = ?self.flavor,
            workers = self.workers.map(NonZeroUsize::get),
            niceness = self.niceness,
            "building runtime"
        );
        builder.build()
    }
}

#[cfg(unix)]
fn renice_workers(builder: &mut Builder, niceness: i32) {
    // setpriority with `who == 0` applies to the calling thread on linux
    builder.on_thread_start(move || unsafe {
        libc::setpriority(libc::PRIO_PROCESS, 0, niceness);
    });
}

#[cfg(not(unix))]
fn renice_workers(_builder: &mut Builder, niceness: i32) {
    tracing::warn!(niceness, "runtime thread priority is not supported on this platform");
}

/// Declares the clap block for one runtime role.
///
/// Flags are prefixed with the role, e.g. `--io-workers`, and read `CQLOPS_<ROLE>_*` from the
/// environment.
macro_rules! runtime_config {
    (role = $role:ident, niceness = $niceness:expr $(,)?) => {
        paste! {
            #[doc = "CLI config for the `" $role "` runtime."]
            #[derive(Debug, Clone, clap::Parser)]
            #[allow(missing_copy_implementations)]
            pub struct [<$role:camel RuntimeConfig>] {
                #[doc = "Worker threads of the `" $role "` runtime; defaults to one per logical core."]
                #[clap(
                    id = concat!(stringify!($role), "_workers"),
                    long = concat!(stringify!($role), "-workers"),
                    env = concat!("CQLOPS_", stringify!([<$role:upper>]), "_WORKERS"),
                    action
                )]
                pub workers: Option<NonZeroUsize>,

                #[doc = "Scheduler of the `" $role "` runtime."]
                #[clap(
                    id = concat!(stringify!($role), "_flavor"),
                    long = concat!(stringify!($role), "-flavor"),
                    env = concat!("CQLOPS_", stringify!([<$role:upper>]), "_FLAVOR"),
                    default_value_t = RuntimeFlavor::default(),
                    value_enum,
                    action
                )]
                pub flavor: RuntimeFlavor,

                #[doc = "Cap on the blocking pool of the `" $role "` runtime."]
                #[clap(
                    id = concat!(stringify!($role), "_max_blocking_threads"),
                    long = concat!(stringify!($role), "-max-blocking-threads"),
                    env = concat!("CQLOPS_", stringify!([<$role:upper>]), "_MAX_BLOCKING_THREADS"),
                    action
                )]
                pub max_blocking_threads: Option<NonZeroUsize>,

                #[doc = "How long an idle blocking thread of the `" $role "` runtime lingers, e.g. `10s`."]
                #[clap(
                    id = concat!(stringify!($role), "_thread_keep_alive"),
                    long = concat!(stringify!($role), "-thread-keep-alive"),
                    env = concat!("CQLOPS_", stringify!([<$role:upper>]), "_THREAD_KEEP_ALIVE"),
                    value_parser = humantime::parse_duration
                )]
                pub thread_keep_alive: Option<Duration>,

                #[doc = "Niceness applied to each `" $role "` worker as it starts."]
                #[clap(
                    id = concat!(stringify!($role), "_niceness"),
                    long = concat!(stringify!($role), "-niceness"),
                    env = concat!("CQLOPS_", stringify!([<$role:upper>]), "_NICENESS"),
                    default_value = $niceness,
                    action
                )]
                pub niceness: Option<i32>,
            }

            impl [<$role:camel RuntimeConfig>] {
                fn settings(&self) -> RuntimeSettings {
                    RuntimeSettings {
                        role: stringify!($role),
                        flavor: self.flavor,
                        workers: self.workers,
                        max_blocking_threads: self.max_blocking_threads,
                        thread_keep_alive: self.thread_keep_alive,
                        niceness: self.niceness,
                    }
                }

                #[doc = "Start the `" $role "` runtime."]
                pub fn build(&self) -> std::io::Result<Runtime> {
                    self.settings().build()
                }
            }
        }
    };
}

runtime_config!(role = io, niceness = None);
runtime_config!(role = callback, niceness = "10");

/// CLI config for both runtimes of a session.
#[derive(Debug, Clone, clap::Parser)]
#[allow(missing_copy_implementations)]
pub struct SessionRuntimeConfig {
    #[clap(flatten)]
    pub io: IoRuntimeConfig,

    #[clap(flatten)]
    pub callback: CallbackRuntimeConfig,
}

impl SessionRuntimeConfig {
    /// Start both runtimes.
    pub fn build(&self) -> std::io::Result<SessionRuntimes> {
        Ok(SessionRuntimes {
            io: self.io.build()?,
            callback: self.callback.build()?,
        })
    }
}

/// The running runtimes of a session.
///
/// Both shut down when this is dropped, which must not happen from inside either of them.
#[derive(Debug)]
pub struct SessionRuntimes {
    io: Runtime,
    callback: Runtime,
}

impl SessionRuntimes {
    /// Runtime statements are sent from.
    pub fn io(&self) -> &Runtime {
        &self.io
    }

    /// Runtime result processing and callbacks run on.
    pub fn callback(&self) -> &Runtime {
        &self.callback
    }

    /// Point a session under construction at these runtimes.
    pub fn attach(&self, builder: SessionBuilder) -> SessionBuilder {
        let io: Arc<dyn Executor> = Arc::new(self.io.handle().clone());
        let callback: Arc<dyn Executor> = Arc::new(self.callback.handle().clone());
        builder.with_io_executor(io).with_executor(callback)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;
    use cqlops::{QueryOperation, ResultSet, Session, Value, driver::memory::MemoryDriver};

    use super::*;

    fn current_thread_name() -> String {
        std::thread::current()
            .name()
            .unwrap_or_default()
            .to_owned()
    }

    fn single_worker_runtimes() -> SessionRuntimes {
        SessionRuntimeConfig::parse_from(["test", "--io-workers", "1", "--callback-workers", "1"])
            .build()
            .unwrap()
    }

    #[test]
    fn defaults() {
        let config = SessionRuntimeConfig::parse_from(std::iter::empty::<OsString>());
        assert_eq!(config.io.flavor, RuntimeFlavor::MultiThread);
        assert_eq!(config.io.workers, None);
        assert_eq!(config.io.niceness, None);
        assert_eq!(config.callback.niceness, Some(10));
    }

    #[test]
    fn role_prefixed_flags() {
        let config = SessionRuntimeConfig::parse_from([
            "test",
            "--io-workers",
            "3",
            "--io-flavor",
            "current-thread",
            "--callback-thread-keep-alive",
            "5s",
            "--callback-max-blocking-threads",
            "2",
        ]);
        assert_eq!(config.io.workers.map(NonZeroUsize::get), Some(3));
        assert_eq!(config.io.flavor, RuntimeFlavor::CurrentThread);
        assert_eq!(config.callback.thread_keep_alive, Some(Duration::from_secs(5)));
        assert_eq!(config.callback.max_blocking_threads.map(NonZeroUsize::get), Some(2));
        assert_eq!(config.callback.workers, None);
    }

    #[test]
    fn workers_are_named_after_their_role() {
        let runtimes = single_worker_runtimes();
        let io = runtimes
            .io()
            .block_on(async { tokio::spawn(async { current_thread_name() }).await })
            .unwrap();
        let callback = runtimes
            .callback()
            .block_on(async { tokio::spawn(async { current_thread_name() }).await })
            .unwrap();
        assert!(io.starts_with("cqlops-io-"), "{io}");
        assert!(callback.starts_with("cqlops-callback-"), "{callback}");
    }

    #[cfg(unix)]
    #[test]
    fn callback_workers_are_reniced() {
        let runtimes = single_worker_runtimes();
        let niceness = runtimes
            .callback()
            .block_on(async {
                tokio::spawn(async { unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) } }).await
            })
            .unwrap();
        assert_eq!(niceness, 10);
    }

    #[test]
    fn session_sends_on_io_and_processes_on_callback() {
        let runtimes = single_worker_runtimes();
        let driver = Arc::new(MemoryDriver::new(|_| {
            Ok(ResultSet::builder(["sent_from"])
                .row([Value::from(current_thread_name())])
                .build())
        }));
        let session = runtimes
            .attach(Session::builder(driver as _))
            .build()
            .unwrap();

        let (sent_from, processed_on) = runtimes
            .callback()
            .block_on(async {
                session
                    .select("SELECT now() FROM system.local")
                    .process(|result| {
                        let sent_from = result.rows()[0].get::<String>(0).unwrap();
                        Ok((sent_from, current_thread_name()))
                    })
                    .execute_async()
                    .await
            })
            .unwrap();
        assert!(sent_from.starts_with("cqlops-io-"), "{sent_from}");
        assert!(processed_on.starts_with("cqlops-callback-"), "{processed_on}");
    }
}
