//! Clip job coordinator.
//!
//! This crate provides:
//! - Clip catalog parsing
//! - The completion oracle (output-exists check)
//! - The completion handler (persist results, classify failures)
//! - The admission-controlled dispatch loop
//! - Configuration, logging setup and metrics

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod oracle;

pub use catalog::Catalog;
pub use config::{Cli, CoordinatorConfig};
pub use dispatch::{percent_done, Dispatcher, RunSummary};
pub use error::{CatalogError, CoordinatorError, CoordinatorResult};
pub use handler::{CompletionHandler, Reconciliation};
pub use oracle::CompletionOracle;
