//! Timing and throughput reports.
//!
//! A [`Report`] is started before a stage runs and finished after it completed. The stage's wall
//! time, including spawning and joining workers, is turned into a [`StageSummary`] and printed.
//! Failed stages are never reported.

use std::fmt;
use std::time::{Duration, Instant};

use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::error::StageError;
use crate::payload::KB;

/// Measurements taken by completion handlers.
#[derive(Default)]
pub struct Metrics {
    /// Number of successfully completed requests.
    pub completed: u64,
    /// Number of payload bytes transferred by completed requests.
    pub bytes: u64,
    /// Request latencies in seconds.
    pub latency: DDSketch,
}

impl Metrics {
    /// Records one successful request.
    pub fn record(&mut self, bytes: u64, latency: Duration) {
        self.completed += 1;
        self.bytes += bytes;
        self.latency.add(latency.as_secs_f64());
    }

    /// Adds the measurements of `other` to these.
    pub fn merge(&mut self, other: &Metrics) {
        self.completed += other.completed;
        self.bytes += other.bytes;
        let merged = self.latency.merge(&other.latency);
        debug_assert!(merged.is_ok(), "latency sketches must share one configuration");
    }

    /// Summarizes the recorded latencies, if any request completed.
    pub fn latency(&self) -> Option<Latency> {
        let sketch = &self.latency;
        if sketch.count() == 0 {
            return None;
        }

        let quantile = |q| {
            let secs = sketch.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs.max(0.0))
        };
        let avg = sketch.sum().unwrap_or_default() / sketch.count() as f64;

        Some(Latency {
            avg: Duration::from_secs_f64(avg.max(0.0)),
            p50: quantile(0.5),
            p90: quantile(0.9),
            p99: quantile(0.99),
        })
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("completed", &self.completed)
            .field("bytes", &self.bytes)
            .field("latency", &self.latency())
            .finish()
    }
}

/// Request latency percentiles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Latency {
    /// Mean latency.
    pub avg: Duration,
    /// Median latency.
    pub p50: Duration,
    /// 90th percentile.
    pub p90: Duration,
    /// 99th percentile.
    pub p99: Duration,
}

/// The outcome of a successfully completed stage or iteration.
#[derive(Debug)]
pub struct StageSummary {
    /// Label printed in front of every report line.
    pub label: String,
    /// Wall time of the stage.
    pub elapsed: Duration,
    /// Number of objects the stage was configured to transfer.
    pub total_objects: u64,
    /// Configured size of every object.
    pub obj_size_kb: u64,
    /// Measurements of the individual requests.
    pub metrics: Metrics,
}

impl StageSummary {
    /// Total configured volume in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_objects * self.obj_size_kb * KB as u64
    }

    /// Total configured volume in megabytes.
    pub fn total_mb(&self) -> f64 {
        (self.obj_size_kb as f64 * self.total_objects as f64) / 1024.0
    }

    /// Throughput in megabytes per second.
    pub fn mb_per_sec(&self) -> f64 {
        self.total_mb() / self.elapsed.as_secs_f64()
    }

    /// Throughput in objects per second.
    pub fn objects_per_sec(&self) -> f64 {
        self.total_objects as f64 / self.elapsed.as_secs_f64()
    }
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.label.bold();
        writeln!(
            f,
            "{label} completed in {:.3} seconds (total: {} objects, {:.2} MB)",
            self.elapsed.as_secs_f64(),
            self.total_objects,
            self.total_mb(),
        )?;
        write!(
            f,
            "{label} throughput: {:.2} MB/sec, {:.2} obj/sec",
            self.mb_per_sec().green(),
            self.objects_per_sec().green(),
        )?;

        if let Some(Latency { avg, p50, p90, p99 }) = self.metrics.latency() {
            writeln!(f)?;
            write!(
                f,
                "{label} latency avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}"
            )?;
        }

        Ok(())
    }
}

/// Measures the wall time of a stage.
#[derive(Debug)]
pub struct Report {
    label: String,
    total_objects: u64,
    obj_size_kb: u64,
    start: Instant,
}

impl Report {
    /// Announces the stage and starts the clock.
    pub fn start(label: impl Into<String>, total_objects: u64, obj_size_kb: u64) -> Self {
        let label = label.into();
        println!("{} starting", label.bold());

        Self {
            label,
            total_objects,
            obj_size_kb,
            start: Instant::now(),
        }
    }

    /// Stops the clock and prints the summary.
    pub fn finish(self, metrics: Metrics) -> StageSummary {
        let summary = StageSummary {
            label: self.label,
            elapsed: self.start.elapsed(),
            total_objects: self.total_objects,
            obj_size_kb: self.obj_size_kb,
            metrics,
        };

        println!("{summary}");
        println!();
        summary
    }
}

/// Runs `stage` wrapped in a [`Report`].
///
/// Nothing but the start line is printed if the stage fails.
pub fn measure<F>(
    label: impl Into<String>,
    total_objects: u64,
    obj_size_kb: u64,
    stage: F,
) -> Result<StageSummary, StageError>
where
    F: FnOnce() -> Result<Metrics, StageError>,
{
    let report = Report::start(label, total_objects, obj_size_kb);
    let metrics = stage()?;
    Ok(report.finish(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(total_objects: u64, obj_size_kb: u64, elapsed: Duration) -> StageSummary {
        StageSummary {
            label: "UPLOAD".into(),
            elapsed,
            total_objects,
            obj_size_kb,
            metrics: Metrics::default(),
        }
    }

    #[test]
    fn computes_throughput() {
        let summary = summary(2048, 512, Duration::from_secs(4));

        assert_eq!(summary.total_mb(), 1024.0);
        assert_eq!(summary.mb_per_sec(), 256.0);
        assert_eq!(summary.objects_per_sec(), 512.0);
        assert_eq!(summary.total_bytes(), 2048 * 512 * 1024);
    }

    #[test]
    fn small_objects_have_fractional_megabytes() {
        let summary = summary(6, 1, Duration::from_millis(500));

        assert_eq!(summary.total_bytes(), 6 * 1024);
        assert_eq!(summary.total_mb(), 6.0 / 1024.0);
        assert_eq!(summary.objects_per_sec(), 12.0);
    }

    #[test]
    fn merges_metrics() {
        let mut a = Metrics::default();
        a.record(1024, Duration::from_millis(10));
        a.record(1024, Duration::from_millis(20));

        let mut b = Metrics::default();
        b.record(1024, Duration::from_millis(30));

        a.merge(&b);
        assert_eq!(a.completed, 3);
        assert_eq!(a.bytes, 3072);
        assert_eq!(a.latency.count(), 3);

        let latency = a.latency().unwrap();
        assert!(latency.avg > Duration::from_millis(19));
        assert!(latency.avg < Duration::from_millis(21));
        assert!(latency.p99 >= latency.p50);
    }

    #[test]
    fn no_latency_without_requests() {
        assert_eq!(Metrics::default().latency(), None);
    }

    #[test]
    fn measure_reports_successful_stage() {
        let summary = measure("  [1] UPLOAD", 6, 1, || {
            let mut metrics = Metrics::default();
            for _ in 0..6 {
                metrics.record(1024, Duration::from_millis(1));
            }
            Ok(metrics)
        })
        .unwrap();

        assert_eq!(summary.label, "  [1] UPLOAD");
        assert_eq!(summary.total_objects, 6);
        assert_eq!(summary.metrics.completed, 6);
        assert!(summary.mb_per_sec() > 0.0);

        let printed = summary.to_string();
        assert!(printed.contains("6 objects"));
        assert!(printed.contains("MB/sec"));
        assert!(printed.contains("p99"));
    }

    #[test]
    fn measure_propagates_failure() {
        let result = measure("DOWNLOAD stage", 6, 1, || {
            Err(StageError::WorkerPanicked { worker: 0 })
        });

        assert!(matches!(result, Err(StageError::WorkerPanicked { worker: 0 })));
    }
}
