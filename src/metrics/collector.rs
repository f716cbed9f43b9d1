// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Caller-facing
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub active_requests: IntGauge,

    // Upstream
    pub upstream_duration_seconds: HistogramVec,
    pub failures_total: IntCounterVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("relay_requests_total", "Total number of relayed requests"),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "relay_request_duration_seconds",
                "End-to-end request duration in seconds",
            ),
            &["method"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let active_requests =
            IntGauge::new("relay_active_requests", "Requests currently in flight")?;
        registry.register(Box::new(active_requests.clone()))?;

        let upstream_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "relay_upstream_duration_seconds",
                "Time until the upstream body was fully read",
            ),
            &["status_code"],
        )?;
        registry.register(Box::new(upstream_duration_seconds.clone()))?;

        let failures_total = IntCounterVec::new(
            Opts::new(
                "relay_failures_total",
                "Requests answered with a relay-generated error",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            active_requests,
            upstream_duration_seconds,
            failures_total,
        })
    }

    pub fn record_request(&self, method: &str, status_code: u16, duration: std::time::Duration) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, &status])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(duration.as_secs_f64());
    }

    pub fn record_upstream(&self, status_code: u16, duration: std::time::Duration) {
        let status = status_code.to_string();
        self.upstream_duration_seconds
            .with_label_values(&[status.as_str()])
            .observe(duration.as_secs_f64());
    }

    pub fn record_failure(&self, kind: &str) {
        self.failures_total.with_label_values(&[kind]).inc();
    }

    pub fn increment_active_requests(&self) {
        self.active_requests.inc();
    }

    pub fn decrement_active_requests(&self) {
        self.active_requests.dec();
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_recorded_metrics_are_exported() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        metrics.record_request("GET", 200, Duration::from_millis(12));
        metrics.record_upstream(200, Duration::from_millis(10));
        metrics.record_failure("transport");
        metrics.increment_active_requests();

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains("relay_requests_total{method=\"GET\",status_code=\"200\"} 1"));
        assert!(text.contains("relay_failures_total{kind=\"transport\"} 1"));
        assert!(text.contains("relay_active_requests 1"));
    }
}
