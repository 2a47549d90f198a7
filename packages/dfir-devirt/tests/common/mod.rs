//! Common test utilities for dfir-devirt
//!
//! Program IR scenarios shared by the integration tests, plus assertions
//! over pass outcomes.

#![allow(dead_code)]

mod assertions;
mod fixtures;

// Re-export all utilities
pub use assertions::*;
pub use fixtures::*;
