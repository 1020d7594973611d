//! Building blocks for [`clap`]-driven configuration of `cqlops` sessions and the runtimes
//! behind them.
pub mod runtime;
pub mod session;
