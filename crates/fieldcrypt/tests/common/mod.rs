//! Shared test utilities for fieldcrypt integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated service runs inside a temp directory
//! - `ConfigBuilder` for building service configurations programmatically
//! - Field transform doubles for driving the pipeline without real keys

pub mod builders;
pub mod doubles;
pub mod harness;

pub use builders::*;
pub use doubles::*;
pub use harness::TestHarness;
