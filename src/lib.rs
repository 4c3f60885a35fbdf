//! # fiber-instrument
//!
//! Ahead-of-time instrumentation of compiled classes for fiber execution.
//!
//! ## Architecture
//!
//! - **scan**: class file discovery in a build directory, jar discovery for the classpath
//! - **classfile**: class file parsing (constant pool, methods, call sites)
//! - **classify**: per-class suspendability facts and the suspendable resource lists
//! - **classpath**: class and resource lookup across directories and jars
//! - **database**: two-phase method/class database and the work list
//! - **filter**: inclusion prefixes and the fixed name-based exclusions
//! - **engine**: the rewrite seam and the external-process engine
//! - **instrument**: the pipeline and the rewrite-failure policy
//! - **log_bridge**: leveled logging shared by the pipeline and engines
//! - **report**: run and classification reports
//! - **config**: configuration file and command-line merging
//! - **error**: error types

pub mod classfile;
pub mod classify;
pub mod classpath;
pub mod cli;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod filter;
pub mod instrument;
pub mod log_bridge;
pub mod report;
pub mod scan;

pub use error::{InstrumentError, Result, RewriteFailure};
