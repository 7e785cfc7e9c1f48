//! Shared utilities for intel-rs
//!
//! Currently provides logging initialization used by binaries and examples.

pub mod logging;

pub use logging::init_tracing;
