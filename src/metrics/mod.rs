// Metrics module - Prometheus-compatible metrics tracking
// Counters and latency summaries for the serving and generation paths

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::cache::CacheStats;

/// Histogram represents percentile statistics for latency measurements
#[derive(Debug, Clone, Copy)]
pub struct Histogram {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Metrics struct tracks counters and histograms for Prometheus export
/// Thread-safe via atomic operations and mutexes
pub struct Metrics {
    // Request counters
    request_count: AtomicU64,
    pass_through_count: AtomicU64,
    not_modified_count: AtomicU64,

    // Status code counters (200, 304, 400, ...)
    status_counts: Mutex<HashMap<u16, u64>>,

    // Provider name counters
    provider_counts: Mutex<HashMap<String, u64>>,

    // HTTP method counters (GET, HEAD)
    method_counts: Mutex<HashMap<String, u64>>,

    // Duration tracking (stored in microseconds as u64)
    durations: Mutex<Vec<u64>>,
    transform_durations: Mutex<Vec<u64>>,

    // Generation run counters
    generation_written: AtomicU64,
    generation_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            request_count: AtomicU64::new(0),
            pass_through_count: AtomicU64::new(0),
            not_modified_count: AtomicU64::new(0),
            status_counts: Mutex::new(HashMap::new()),
            provider_counts: Mutex::new(HashMap::new()),
            method_counts: Mutex::new(HashMap::new()),
            durations: Mutex::new(Vec::new()),
            transform_durations: Mutex::new(Vec::new()),
            generation_written: AtomicU64::new(0),
            generation_failed: AtomicU64::new(0),
        }
    }

    /// Increment the count of requests handled under the image prefix
    pub fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the count of requests handed back to the host untouched
    pub fn increment_pass_through(&self) {
        self.pass_through_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the count of conditional requests answered with 304
    pub fn increment_not_modified(&self) {
        self.not_modified_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment counter for a specific HTTP status code
    pub fn increment_status_count(&self, status_code: u16) {
        if let Ok(mut counts) = self.status_counts.lock() {
            *counts.entry(status_code).or_insert(0) += 1;
        }
    }

    /// Increment counter for a specific provider name
    pub fn increment_provider_count(&self, provider: &str) {
        if let Ok(mut counts) = self.provider_counts.lock() {
            *counts.entry(provider.to_string()).or_insert(0) += 1;
        }
    }

    /// Increment counter for a specific HTTP method
    pub fn increment_method_count(&self, method: &str) {
        if let Ok(mut counts) = self.method_counts.lock() {
            *counts.entry(method.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a request duration in milliseconds
    pub fn record_duration(&self, duration_ms: f64) {
        let duration_us = (duration_ms * 1000.0) as u64;
        if let Ok(mut durations) = self.durations.lock() {
            durations.push(duration_us);
        }
    }

    /// Record a transform computation duration in milliseconds
    pub fn record_transform_duration(&self, duration_ms: f64) {
        let duration_us = (duration_ms * 1000.0) as u64;
        if let Ok(mut durations) = self.transform_durations.lock() {
            durations.push(duration_us);
        }
    }

    /// Record artifacts written by a generation run
    pub fn add_generation_written(&self, count: u64) {
        self.generation_written.fetch_add(count, Ordering::Relaxed);
    }

    /// Record per-item failures of a generation run
    pub fn add_generation_failed(&self, count: u64) {
        self.generation_failed.fetch_add(count, Ordering::Relaxed);
    }

    /// Calculate histogram from request duration samples
    pub fn get_duration_histogram(&self) -> Histogram {
        if let Ok(durations) = self.durations.lock() {
            calculate_histogram(&durations)
        } else {
            Histogram {
                p50: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
            }
        }
    }

    #[cfg(test)]
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn get_pass_through_count(&self) -> u64 {
        self.pass_through_count.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn get_not_modified_count(&self) -> u64 {
        self.not_modified_count.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn get_status_count(&self, status_code: u16) -> u64 {
        self.status_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(&status_code).copied())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn get_provider_count(&self, provider: &str) -> u64 {
        self.provider_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(provider).copied())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn get_method_count(&self, method: &str) -> u64 {
        self.method_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(method).copied())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn get_generation_written(&self) -> u64 {
        self.generation_written.load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus text format
    /// Returns metrics as text/plain content for /metrics endpoint
    pub fn export_prometheus(&self, cache: &CacheStats) -> String {
        let mut output = String::new();

        // Request metrics
        output.push_str("# HELP kagami_requests_total Requests handled under the image prefix\n");
        output.push_str("# TYPE kagami_requests_total counter\n");
        output.push_str(&format!(
            "kagami_requests_total {}\n",
            self.request_count.load(Ordering::Relaxed)
        ));

        output.push_str(
            "\n# HELP kagami_pass_through_total Requests outside the prefix handed back to the host\n",
        );
        output.push_str("# TYPE kagami_pass_through_total counter\n");
        output.push_str(&format!(
            "kagami_pass_through_total {}\n",
            self.pass_through_count.load(Ordering::Relaxed)
        ));

        output.push_str(
            "\n# HELP kagami_not_modified_total Conditional requests answered with 304\n",
        );
        output.push_str("# TYPE kagami_not_modified_total counter\n");
        output.push_str(&format!(
            "kagami_not_modified_total {}\n",
            self.not_modified_count.load(Ordering::Relaxed)
        ));

        // Status code metrics
        output.push_str("\n# HELP kagami_requests_by_status_total Requests by status code\n");
        output.push_str("# TYPE kagami_requests_by_status_total counter\n");
        if let Ok(counts) = self.status_counts.lock() {
            for (status, count) in counts.iter() {
                output.push_str(&format!(
                    "kagami_requests_by_status_total{{status=\"{}\"}} {}\n",
                    status, count
                ));
            }
        }

        // Provider metrics
        output.push_str("\n# HELP kagami_requests_by_provider_total Requests by provider\n");
        output.push_str("# TYPE kagami_requests_by_provider_total counter\n");
        if let Ok(counts) = self.provider_counts.lock() {
            for (provider, count) in counts.iter() {
                output.push_str(&format!(
                    "kagami_requests_by_provider_total{{provider=\"{}\"}} {}\n",
                    provider, count
                ));
            }
        }

        // HTTP method metrics
        output.push_str("\n# HELP kagami_requests_by_method_total Requests by method\n");
        output.push_str("# TYPE kagami_requests_by_method_total counter\n");
        if let Ok(counts) = self.method_counts.lock() {
            for (method, count) in counts.iter() {
                output.push_str(&format!(
                    "kagami_requests_by_method_total{{method=\"{}\"}} {}\n",
                    method, count
                ));
            }
        }

        // Transform cache metrics
        output.push_str("\n# HELP kagami_cache_hits_total Transform cache hits\n");
        output.push_str("# TYPE kagami_cache_hits_total counter\n");
        output.push_str(&format!("kagami_cache_hits_total {}\n", cache.hits));

        output.push_str("\n# HELP kagami_cache_misses_total Transform cache misses\n");
        output.push_str("# TYPE kagami_cache_misses_total counter\n");
        output.push_str(&format!("kagami_cache_misses_total {}\n", cache.misses));

        output.push_str("\n# HELP kagami_cache_evictions_total Entries evicted at capacity\n");
        output.push_str("# TYPE kagami_cache_evictions_total counter\n");
        output.push_str(&format!(
            "kagami_cache_evictions_total {}\n",
            cache.evictions
        ));

        output.push_str(
            "\n# HELP kagami_cache_coalesced_waits_total Requests that waited on another caller's transform\n",
        );
        output.push_str("# TYPE kagami_cache_coalesced_waits_total counter\n");
        output.push_str(&format!(
            "kagami_cache_coalesced_waits_total {}\n",
            cache.coalesced_waits
        ));

        output.push_str("\n# HELP kagami_cache_entries Current transform cache entry count\n");
        output.push_str("# TYPE kagami_cache_entries gauge\n");
        output.push_str(&format!("kagami_cache_entries {}\n", cache.entry_count));

        output.push_str("\n# HELP kagami_cache_capacity Transform cache entry capacity\n");
        output.push_str("# TYPE kagami_cache_capacity gauge\n");
        output.push_str(&format!("kagami_cache_capacity {}\n", cache.capacity));

        // Generation metrics
        output.push_str(
            "\n# HELP kagami_generation_written_total Artifacts written by generation runs\n",
        );
        output.push_str("# TYPE kagami_generation_written_total counter\n");
        output.push_str(&format!(
            "kagami_generation_written_total {}\n",
            self.generation_written.load(Ordering::Relaxed)
        ));

        output.push_str(
            "\n# HELP kagami_generation_failed_total Per-item failures in generation runs\n",
        );
        output.push_str("# TYPE kagami_generation_failed_total counter\n");
        output.push_str(&format!(
            "kagami_generation_failed_total {}\n",
            self.generation_failed.load(Ordering::Relaxed)
        ));

        // Request duration summary
        let histogram = self.get_duration_histogram();
        output.push_str("\n# HELP kagami_request_duration_seconds Request duration in seconds\n");
        output.push_str("# TYPE kagami_request_duration_seconds summary\n");
        output.push_str(&format!(
            "kagami_request_duration_seconds{{quantile=\"0.5\"}} {:.3}\n",
            histogram.p50 / 1000.0 // Convert ms to seconds
        ));
        output.push_str(&format!(
            "kagami_request_duration_seconds{{quantile=\"0.9\"}} {:.3}\n",
            histogram.p90 / 1000.0
        ));
        output.push_str(&format!(
            "kagami_request_duration_seconds{{quantile=\"0.95\"}} {:.3}\n",
            histogram.p95 / 1000.0
        ));
        output.push_str(&format!(
            "kagami_request_duration_seconds{{quantile=\"0.99\"}} {:.3}\n",
            histogram.p99 / 1000.0
        ));

        // Transform duration summary
        let transform = if let Ok(durations) = self.transform_durations.lock() {
            calculate_histogram(&durations)
        } else {
            Histogram {
                p50: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
            }
        };
        output.push_str(
            "\n# HELP kagami_transform_duration_seconds Transform computation duration in seconds\n",
        );
        output.push_str("# TYPE kagami_transform_duration_seconds summary\n");
        output.push_str(&format!(
            "kagami_transform_duration_seconds{{quantile=\"0.5\"}} {:.3}\n",
            transform.p50 / 1000.0
        ));
        output.push_str(&format!(
            "kagami_transform_duration_seconds{{quantile=\"0.95\"}} {:.3}\n",
            transform.p95 / 1000.0
        ));
        output.push_str(&format!(
            "kagami_transform_duration_seconds{{quantile=\"0.99\"}} {:.3}\n",
            transform.p99 / 1000.0
        ));

        output
    }
}

/// Calculate percentiles from a vector of samples (in microseconds)
fn calculate_histogram(samples: &[u64]) -> Histogram {
    if samples.is_empty() {
        return Histogram {
            p50: 0.0,
            p90: 0.0,
            p95: 0.0,
            p99: 0.0,
        };
    }

    let mut sorted: Vec<u64> = samples.to_vec();
    sorted.sort_unstable();

    let p50_idx = (sorted.len() as f64 * 0.50) as usize;
    let p90_idx = (sorted.len() as f64 * 0.90) as usize;
    let p95_idx = (sorted.len() as f64 * 0.95) as usize;
    let p99_idx = (sorted.len() as f64 * 0.99) as usize;

    // Convert from microseconds to milliseconds
    Histogram {
        p50: sorted.get(p50_idx.saturating_sub(1)).copied().unwrap_or(0) as f64 / 1000.0,
        p90: sorted.get(p90_idx.saturating_sub(1)).copied().unwrap_or(0) as f64 / 1000.0,
        p95: sorted.get(p95_idx.saturating_sub(1)).copied().unwrap_or(0) as f64 / 1000.0,
        p99: sorted.get(p99_idx.saturating_sub(1)).copied().unwrap_or(0) as f64 / 1000.0,
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
