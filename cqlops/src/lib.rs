//! Asynchronous operation execution over a Cassandra-style driver
//!
//! This crate sits between application code and a [`Driver`][driver::Driver]. It turns
//! statements into configurable operations that can be executed in four ways, and decorates
//! operations with result transformers that turn raw rows into application values.
//!
//! # Building operations with a [`Session`]
//!
//! A [`Session`] is created once over a driver and hands out operations:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use cqlops::{ConsistencyLevel, QueryOperation, Session, driver::memory::MemoryDriver};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::builder(Arc::new(MemoryDriver::new_empty())).build()?;
//! let names: Vec<String> = session
//!     .select("SELECT name FROM users")
//!     .first_column()
//!     .with_consistency_level(ConsistencyLevel::One)
//!     .execute()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Execution modes
//!
//! See [`QueryOperation`]: waiting for the result, getting a [`QueryFuture`] back right away,
//! delivering the outcome to a [`CallbackHandler`], or waiting for a bounded time without
//! cancelling the statement.
//!
//! # Errors
//!
//! All failures are reported as [`Error`]; driver failures are translated at the session
//! boundary and keep their kind through any number of transformers.
pub mod driver;
pub mod error;
pub mod executor;
pub mod future;
pub mod operation;
pub mod policy;
pub mod process;
pub mod result;
pub mod session;
pub mod statement;
pub mod value;

pub use error::{Error, Result};
pub use future::QueryFuture;
pub use operation::{
    CallbackHandler, IngestOperation, ProcessingOperation, QueryOperation, SelectOneOperation,
    SelectOperation, UpdateOperation,
};
pub use policy::{ConsistencyLevel, ExecutionPolicy};
pub use result::{ResultSet, Row};
pub use session::{Session, SessionBuilder};
pub use statement::{BatchKind, PreparedStatement, Statement};
pub use value::Value;
