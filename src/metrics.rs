//! Performance metrics and statistics tracking for the risk service.

use crate::types::request::Step;
use crate::types::risk::RiskLevel;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Keep at most this many processing-time samples
const MAX_SAMPLES: usize = 10_000;

/// One counter per wizard step
pub const STEP_COUNT: usize = Step::MAX as usize;

/// Metrics collector for the prediction endpoint
pub struct ServiceMetrics {
    /// Total successful predictions
    pub predictions_served: AtomicU64,
    /// Total failed requests
    pub failures: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<HashMap<String, u64>>,
    /// Successful predictions by wizard step (index 0 = step 1)
    requests_by_step: RwLock<[u64; STEP_COUNT]>,
    /// Predictions by risk level
    predictions_by_level: RwLock<HashMap<RiskLevel, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Risk score distribution in 10-point buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            predictions_served: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            requests_by_step: RwLock::new([0; STEP_COUNT]),
            predictions_by_level: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction; `risk_score` is a percentage
    pub fn record_prediction(
        &self,
        step: u8,
        processing_time: Duration,
        risk_score: f64,
        level: RiskLevel,
    ) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }

        if let Ok(mut by_step) = self.requests_by_step.write() {
            if let Some(slot) = by_step.get_mut(usize::from(step).saturating_sub(1)) {
                *slot += 1;
            }
        }

        let bucket = (risk_score / 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }

        if let Ok(mut by_level) = self.predictions_by_level.write() {
            *by_level.entry(level).or_insert(0) += 1;
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, kind: &str) {
        self.failures.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (predictions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions_served.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        let predictions_by_level = self
            .predictions_by_level
            .read()
            .map(|by_level| {
                by_level
                    .iter()
                    .map(|(level, count)| (level.as_str().to_string(), *count))
                    .collect()
            })
            .unwrap_or_default();

        MetricsSnapshot {
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            failures_by_kind: self
                .failures_by_kind
                .read()
                .map(|m| m.clone())
                .unwrap_or_default(),
            requests_by_step: self.requests_by_step.read().map(|s| *s).unwrap_or_default(),
            predictions_by_level,
            score_distribution: self.score_buckets.read().map(|b| *b).unwrap_or_default(),
            processing: self.get_processing_stats(),
            throughput: self.get_throughput(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let total = snapshot.predictions_served + snapshot.failures;
        let failure_rate = if total > 0 {
            (snapshot.failures as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            READMISSION RISK SERVICE - METRICS SUMMARY        ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Predictions Served:     {:>8}  │  Throughput: {:>6.2} req/s ║",
            snapshot.predictions_served, snapshot.throughput
        );
        info!(
            "║ Failed Requests:        {:>8}  │  Failure Rate: {:>6.1}%   ║",
            snapshot.failures, failure_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            snapshot.processing.mean_us,
            snapshot.processing.p50_us,
            snapshot.processing.p95_us,
            snapshot.processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        for (i, count) in snapshot.requests_by_step.iter().enumerate() {
            info!("║   step {}: {:>8}", i + 1, count);
        }
        for (level, count) in &snapshot.predictions_by_level {
            info!("║   {:10}: {:>8}", level, count);
        }
        for (kind, count) in &snapshot.failures_by_kind {
            info!("║   {:18}: {:>8} failures", kind, count);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Score Distribution:                                     ║");
        let scored: u64 = snapshot.score_distribution.iter().sum();
        for (i, &count) in snapshot.score_distribution.iter().enumerate() {
            let pct = if scored > 0 {
                (count as f64 / scored as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:>3}-{:<3}%: {:>6} ({:>5.1}%) {}",
                i * 10,
                (i + 1) * 10,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable view returned by `GET /metrics`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub predictions_served: u64,
    pub failures: u64,
    pub failures_by_kind: HashMap<String, u64>,
    pub requests_by_step: [u64; STEP_COUNT],
    pub predictions_by_level: HashMap<String, u64>,
    pub score_distribution: [u64; 10],
    pub processing: ProcessingStats,
    pub throughput: f64,
    pub uptime_secs: u64,
}

/// Metrics reporter that logs periodic summaries
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let period = Duration::from_secs(self.interval_secs.max(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = ServiceMetrics::new();

        metrics.record_prediction(1, Duration::from_micros(100), 12.5, RiskLevel::Low);
        metrics.record_prediction(5, Duration::from_micros(300), 55.0, RiskLevel::High);
        metrics.record_failure("malformed_input");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.predictions_served, 2);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.requests_by_step, [1, 0, 0, 0, 1]);
        assert_eq!(snapshot.failures_by_kind.get("malformed_input"), Some(&1));
        assert_eq!(snapshot.predictions_by_level.get("high"), Some(&1));
        assert_eq!(snapshot.score_distribution[1], 1);
        assert_eq!(snapshot.score_distribution[5], 1);
    }

    #[test]
    fn test_every_valid_step_is_counted() {
        let metrics = ServiceMetrics::new();
        for n in 1..=Step::MAX {
            let step = Step::try_from(i64::from(n)).unwrap();
            metrics.record_prediction(step.get(), Duration::from_micros(5), 1.0, RiskLevel::Low);
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_by_step.len(), usize::from(Step::MAX));
        assert!(snapshot.requests_by_step.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_full_score_lands_in_last_bucket() {
        let metrics = ServiceMetrics::new();
        metrics.record_prediction(2, Duration::from_micros(10), 100.0, RiskLevel::High);
        assert_eq!(metrics.snapshot().score_distribution[9], 1);
    }

    #[test]
    fn test_processing_stats() {
        let metrics = ServiceMetrics::new();
        assert_eq!(metrics.get_processing_stats().count, 0);

        for us in [100, 200, 300, 400] {
            metrics.record_prediction(1, Duration::from_micros(us), 1.0, RiskLevel::Low);
        }

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean_us, 250);
        assert_eq!(stats.p50_us, 300);
        assert_eq!(stats.max_us, 400);
    }
}
