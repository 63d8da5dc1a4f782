//! Splitting of oversized modules into separately linkable partitions.
//!
//! The pipeline runs strictly forward:
//!
//! 1. [`symbols`] and [`graph`] index the module and its references,
//! 2. [`cycles`] finds mutually recursive groups,
//! 3. [`planner`] assigns every definition to exactly one partition,
//! 4. [`materialize`] writes each partition as a standalone module,
//! 5. [`repair`] verifies it and fixes cross-partition linkage once,
//! 6. [`link`] links the partitions in dependency order.
//!
//! [`session::Splitter`] drives all of it from a [`config::SplitConfig`].
pub mod config;
pub mod cycles;
pub mod error;
pub mod graph;
pub mod link;
pub mod materialize;
pub mod planner;
pub mod repair;
pub mod report;
pub mod session;
pub mod symbols;
#[cfg(any(test, feature = "test-utils"))]
pub mod tests_utils;

pub use config::{MaterializeMode, SplitConfig};
pub use error::{SplitError, SplitResult};
pub use session::Splitter;
