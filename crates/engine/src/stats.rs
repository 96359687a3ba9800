//! Latency statistics over transaction attempt durations

use std::time::Duration;

use isoprobe_core::Reporter;
use serde::Serialize;

/// Summary of attempt latencies for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    /// Number of attempts (committed and retried)
    pub count: usize,
    /// Mean attempt latency in milliseconds
    pub mean_ms: f64,
    /// Median in milliseconds
    pub p50_ms: f64,
    /// 90th percentile in milliseconds
    pub p90_ms: f64,
    /// 99th percentile in milliseconds
    pub p99_ms: f64,
    /// Slowest attempt in milliseconds
    pub max_ms: f64,
    /// Attempts per second of wall-clock run time
    pub throughput: f64,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Nearest-rank percentile of a sorted, non-empty slice
fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl LatencyStats {
    /// Compute statistics over `durations`, with `elapsed` the run's
    /// wall-clock time
    pub fn from_durations(durations: &[Duration], elapsed: Duration) -> Self {
        if durations.is_empty() {
            return Self::default();
        }
        let mut sorted = durations.to_vec();
        sorted.sort_unstable();

        let total: Duration = sorted.iter().sum();
        let count = sorted.len();
        let secs = elapsed.as_secs_f64();

        LatencyStats {
            count,
            mean_ms: millis(total) / count as f64,
            p50_ms: millis(percentile(&sorted, 50.0)),
            p90_ms: millis(percentile(&sorted, 90.0)),
            p99_ms: millis(percentile(&sorted, 99.0)),
            max_ms: millis(sorted[count - 1]),
            throughput: if secs > 0.0 { count as f64 / secs } else { 0.0 },
        }
    }

    /// Render through `reporter`
    pub fn report(&self, reporter: &mut dyn Reporter) {
        reporter.header("Latency");
        reporter.print_left("Attempts", &self.count.to_string());
        reporter.print_left("Mean", &format!("{:.2} ms", self.mean_ms));
        reporter.print_left("p50", &format!("{:.2} ms", self.p50_ms));
        reporter.print_left("p90", &format!("{:.2} ms", self.p90_ms));
        reporter.print_left("p99", &format!("{:.2} ms", self.p99_ms));
        reporter.print_left("Max", &format!("{:.2} ms", self.max_ms));
        reporter.print_left("Throughput", &format!("{:.1} attempts/s", self.throughput));
    }
}
