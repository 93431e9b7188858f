//! Metric definitions for parley.
//!
//! Crates record through the `metrics` facade re-exported here. Nothing is
//! collected until the embedding binary installs a recorder.
//!
//! ```rust,ignore
//! use parley_metrics::{command, counter, labels};
//!
//! counter!(command::EXECUTIONS_TOTAL, labels::AGENT => "pi").increment(1);
//! ```

mod definitions;

pub use definitions::*;

pub use metrics::{counter, gauge, histogram};
