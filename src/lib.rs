#![forbid(unsafe_code)]
//! hftest harness
//!
//! Runs the tests baked into a bare-metal test image and reports the
//! results. The image is booted once per test, under QEMU, the Arm FVP
//! model or on a serial-attached board, and judged by the framed log lines
//! it prints.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod driver;
pub mod dtc;
pub mod error;
pub mod protocol;
pub mod report;
pub mod runner;

pub use error::HarnessError;
pub use report::TestCounts;
pub use runner::TestRunner;
