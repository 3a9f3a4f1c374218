//! Shared test utilities for kicad-prism integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with a temporary data directory
//! - Helpers for building git remotes and waiting on jobs

pub mod harness;

pub use harness::TestHarness;
