//! Request metrics for the prediction service.

use crate::types::prediction::PredictionReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector shared by all requests
pub struct PredictionMetrics {
    /// Requests that produced a prediction
    pub requests_served: AtomicU64,
    /// Requests answered with an error
    pub requests_rejected: AtomicU64,
    /// Total rows scored
    pub rows_scored: AtomicU64,
    /// Rows labeled positive
    pub positive_rows: AtomicU64,
    /// Request processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Combined probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Per-row model agreement (1 - std dev of model probabilities)
    model_agreements: RwLock<Vec<f64>>,
    /// Start time for rate calculation
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl PredictionMetrics {
    pub fn new() -> Self {
        Self {
            requests_served: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            positive_rows: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            model_agreements: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Record a successfully served request
    pub fn record_request(&self, processing_time: Duration, report: &PredictionReport) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        self.rows_scored
            .fetch_add(report.summary.n as u64, Ordering::Relaxed);
        self.positive_rows
            .fetch_add(report.summary.positives as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut buckets) = self.score_buckets.write() {
            for row in &report.rows {
                let bucket = (row.probability * 10.0).clamp(0.0, 9.0) as usize;
                buckets[bucket] += 1;
            }
        }

        let batch: Vec<f64> = report
            .rows
            .iter()
            .filter_map(|row| model_agreement(&row.model_probabilities))
            .collect();
        self.push_agreements(&batch);
    }

    /// Record a request answered with an error
    pub fn record_rejection(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Append one request's per-row agreements under a single lock
    fn push_agreements(&self, batch: &[f64]) {
        if batch.is_empty() {
            return;
        }
        if let Ok(mut agreements) = self.model_agreements.write() {
            agreements.extend_from_slice(batch);
            if agreements.len() > 10000 {
                let excess = agreements.len() - 5000;
                agreements.drain(0..excess);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) => times.clone(),
            Err(_) => return ProcessingStats::default(),
        };
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let pct = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: pct(0.95),
            p99_us: pct(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Average model agreement, 0.0 when never measured
    pub fn get_avg_agreement(&self) -> f64 {
        match self.model_agreements.read() {
            Ok(agreements) if !agreements.is_empty() => {
                agreements.iter().sum::<f64>() / agreements.len() as f64
            }
            _ => 0.0,
        }
    }

    /// Requests per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_served.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Point-in-time view for the metrics endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at.to_rfc3339(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests_served: self.requests_served.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            rows_scored: self.rows_scored.load(Ordering::Relaxed),
            positive_rows: self.positive_rows.load(Ordering::Relaxed),
            throughput_rps: self.get_throughput(),
            processing: self.get_processing_stats(),
            avg_model_agreement: self.get_avg_agreement(),
            score_distribution: self.get_score_distribution(),
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let positive_rate = if snapshot.rows_scored > 0 {
            (snapshot.positive_rows as f64 / snapshot.rows_scored as f64) * 100.0
        } else {
            0.0
        };

        info!(
            requests = snapshot.requests_served,
            rejected = snapshot.requests_rejected,
            rows = snapshot.rows_scored,
            positive_rate = format!("{:.1}%", positive_rate),
            throughput = format!("{:.2} req/s", snapshot.throughput_rps),
            "Prediction metrics summary"
        );
        info!(
            mean_us = snapshot.processing.mean_us,
            p50_us = snapshot.processing.p50_us,
            p95_us = snapshot.processing.p95_us,
            p99_us = snapshot.processing.p99_us,
            max_us = snapshot.processing.max_us,
            agreement = format!("{:.1}%", snapshot.avg_model_agreement * 100.0),
            "Request latency"
        );

        let total: u64 = snapshot.score_distribution.iter().sum();
        for (i, &count) in snapshot.score_distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
            info!(
                "  {:.1}-{:.1}: {:>8} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
    }
}

impl Default for PredictionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 1 - std dev of the per-model probabilities, `None` for fewer than two models
fn model_agreement(model_probabilities: &[f64]) -> Option<f64> {
    if model_probabilities.len() < 2 {
        return None;
    }

    let count = model_probabilities.len() as f64;
    let mean = model_probabilities.iter().sum::<f64>() / count;
    let variance = model_probabilities
        .iter()
        .map(|p| (p - mean).powi(2))
        .sum::<f64>()
        / count;

    Some(1.0 - variance.sqrt().min(1.0))
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

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub started_at: String,
    pub uptime_secs: u64,
    pub requests_served: u64,
    pub requests_rejected: u64,
    pub rows_scored: u64,
    pub positive_rows: u64,
    pub throughput_rps: f64,
    pub processing: ProcessingStats,
    pub avg_model_agreement: f64,
    pub score_distribution: [u64; 10],
}

/// Periodically logs a metrics summary
pub struct MetricsReporter {
    metrics: Arc<PredictionMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PredictionMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
