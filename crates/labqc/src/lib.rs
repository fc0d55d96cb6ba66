//! Quality-control tracking for clinical laboratory equipment.
//!
//! The [`qc`] module holds the Westgard evaluator and the report service built on top of
//! it; the remaining modules carry the configuration, logging and error plumbing shared
//! with the `labqc-api` binary.

pub mod config;
pub mod error;
pub mod qc;
pub mod telemetry;
