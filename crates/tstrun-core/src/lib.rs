//! Fixture-driven regression runner for a compiler under test.
//!
//! A fixture (`*.tst`) holds a source snippet and the compiler output it is
//! expected to produce, separated by [`fixture::DELIMITER`]. The runner splits
//! fixtures into artifacts, invokes the compiler, normalizes what it generated,
//! diffs it against the expectation, and classifies the result.

pub mod config;
pub mod discover;
pub mod error;
pub mod executor;
pub mod fixture;
pub mod normalize;
pub mod process;
pub mod report;

pub use config::RunnerConfig;
pub use error::{Error, Result};
pub use executor::{run_batch, Mode, Outcome};
pub use report::RunReport;

/// Version-pinned identifier of the config file format.
pub const CONFIG_SCHEMA_VERSION: &str = "tstrun.config@0.1.0";
/// Version-pinned identifier of the JSON run report.
pub const REPORT_SCHEMA_VERSION: &str = "tstrun.report@0.1.0";
