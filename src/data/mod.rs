//! Calibration data sources.
//!
//! Real runs ingest a cluster calibration CSV (`io::ingest`); the synthetic
//! sample here exists so the tool works out of the box and so tests have a
//! deterministic population with known age structure.

pub mod sample;

pub use sample::*;
