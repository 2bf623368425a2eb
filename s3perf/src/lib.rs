//! Throughput benchmark for S3-compatible object stores.
//!
//! A benchmark consists of stages: an upload stage puts objects into a bucket, a download stage
//! gets them back and verifies their size. Each stage is run by a number of worker threads. Every
//! worker issues asynchronous requests for its own objects and keeps at most a configured number
//! of them outstanding, see [`limiter`]. After every stage the wall time and throughput are
//! printed, see [`report`].
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod abort;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod key;
pub mod limiter;
pub mod observability;
pub mod payload;
pub mod report;
pub mod runner;
pub mod stage;
