//! Measures upload and download throughput against an S3 bucket.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    s3perf::cli::execute()
}
