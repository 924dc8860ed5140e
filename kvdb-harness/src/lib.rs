// Copyright (c) The kvdb-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sequential test harness for kvdb storage-engine unit tests.
//!
//! The harness sets up a fresh kvdb instance through the engine CLI, runs a
//! configured list of precompiled unit-test executables strictly one after
//! another, scrapes each test's output for its failure section, and persists
//! the per-test failure sets into a per-build snapshot used to spot
//! regressions across builds. The instance is torn down only when the whole
//! run passed; a failed environment stays around for inspection.
//!
//! Because the test binaries are statically linked, the harness and the
//! binaries can be copied together to a victim machine or a test VM, run
//! there, and the snapshot slurped back.

#![warn(missing_docs)]

mod dispatch;
pub mod errors;
pub mod harness;
mod output;
pub mod parse;
pub mod store;

pub use dispatch::HarnessApp;
pub use errors::{ExpectedError, HarnessExitCode};
pub use output::{OutputContext, OutputWriter, StderrStyles};
