//! Test utilities for `s3perf`.
//!
//! This crate provides utilities to facilitate testing of the benchmark's request scheduling. See
//! the modules for all available utilities.

pub mod backend;
pub mod tracing;
