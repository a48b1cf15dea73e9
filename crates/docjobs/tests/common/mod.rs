//! Shared test utilities for docjobs integration tests.
//!
//! - `TestHarness` wires an orchestrator over a temp content directory
//! - `stubs` holds scripted converters standing in for real engines

pub mod harness;
pub mod stubs;

pub use harness::{open_persistent, pdf_bytes, TestHarness};
pub use stubs::*;
