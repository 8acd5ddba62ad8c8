//! # simverify-core
//!
//! Core library for verifying that an app deployment on the iOS Simulator is
//! complete: model assets present, the built bundle carrying them, the
//! simulator booted, the app installed, and the app launching.
//!
//! ## Modules
//!
//! - [`command`] - Subprocess execution with a timeout behind the [`command::CommandRunner`] trait
//! - [`simctl`] - Wrapper around Apple's `xcrun simctl` CLI for simulator control
//! - [`assets`] - Filesystem inspection of model assets and built app bundles
//! - [`config`] - Injected identifiers, paths and timing for a verification target
//! - [`check`] - Check identities, reports and the run summary
//! - [`runner`] - The [`runner::VerificationRunner`] that executes a check sequence
//!
//! ## External Dependencies
//!
//! Checks that talk to the simulator require **Xcode** (for `xcrun simctl`).
//! Without it those checks fail with the spawn error; the filesystem checks
//! still run.
//!
//! ## Example
//!
//! ```no_run
//! use simverify_core::check::Mode;
//! use simverify_core::command::SystemRunner;
//! use simverify_core::config::VerifyConfig;
//! use simverify_core::runner::VerificationRunner;
//!
//! let mut runner = VerificationRunner::new(VerifyConfig::load(), SystemRunner, std::io::stdout());
//! let summary = runner.run(Mode::Basic);
//! println!("{}/{} passed", summary.passed, summary.total);
//! ```

pub mod assets;
pub mod check;
pub mod command;
pub mod config;
pub mod runner;
pub mod simctl;
