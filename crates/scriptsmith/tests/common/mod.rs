//! Shared test utilities for scriptsmith integration tests.
//!
//! - `TestHarness` runs an orchestrator against a temp database with scripted
//!   capabilities
//! - builders for configs and zip archives

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{Gate, ScriptedExecutor, TestHarness};
