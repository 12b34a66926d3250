//! `stellar-ages` library crate.
//!
//! The binary (`stellar-age`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., survey pipelines, notebooks, batch scripts)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod estimator;
pub mod fit;
pub mod grid;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
