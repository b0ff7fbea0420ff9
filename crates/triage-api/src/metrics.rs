//! Prometheus registry for the triage API: request counters, per-stage
//! latency, and ticket outcome counters fed from completed pipeline runs.
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, Registry, TextEncoder,
};

use triage_core::state::PipelineState;

const LATENCY_PREFIX: &str = "latency_ms.";

pub struct ApiMetrics {
    registry: Registry,
    pub requests_total: IntCounter,
    pub request_failures_total: IntCounter,
    pub tickets_created_total: IntCounter,
    pub duplicates_skipped_total: IntCounter,
    pub stage_latency_ms: HistogramVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total =
            IntCounter::new("triage_requests_total", "Triage requests received")?;
        let request_failures_total = IntCounter::new(
            "triage_request_failures_total",
            "Triage requests that aborted before the terminal stage",
        )?;
        let tickets_created_total =
            IntCounter::new("triage_tickets_created_total", "Tracker entries created")?;
        let duplicates_skipped_total = IntCounter::new(
            "triage_duplicates_skipped_total",
            "Records skipped as near-duplicates of filed tickets",
        )?;
        let stage_latency_ms = HistogramVec::new(
            HistogramOpts::new("triage_stage_latency_ms", "Per-stage latency in milliseconds")
                .buckets(vec![1.0, 5.0, 25.0, 100.0, 500.0, 2000.0, 10000.0]),
            &["stage"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_failures_total.clone()))?;
        registry.register(Box::new(tickets_created_total.clone()))?;
        registry.register(Box::new(duplicates_skipped_total.clone()))?;
        registry.register(Box::new(stage_latency_ms.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_failures_total,
            tickets_created_total,
            duplicates_skipped_total,
            stage_latency_ms,
        })
    }

    /// Fold one finished run's state metrics into the registry.
    pub fn record_run(&self, state: &PipelineState) {
        for (key, value) in &state.metrics {
            if let Some(stage) = key.strip_prefix(LATENCY_PREFIX) {
                if let Some(ms) = value.as_u64() {
                    self.stage_latency_ms
                        .with_label_values(&[stage])
                        .observe(ms as f64);
                }
            }
        }
        let count = |key: &str| {
            state
                .metrics
                .get(key)
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
        };
        self.tickets_created_total.inc_by(count("tickets_created"));
        self.duplicates_skipped_total
            .inc_by(count("duplicates_skipped"));
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_metrics_feed_the_registry() {
        let metrics = ApiMetrics::new().unwrap();
        let mut state = PipelineState::new("r", "i");
        state.set_metric("latency_ms.extract_contract", 12u64);
        state.set_metric("tickets_created", 3u64);
        state.set_metric("duplicates_skipped", 1u64);

        metrics.requests_total.inc();
        metrics.record_run(&state);

        let text = metrics.encode().unwrap();
        assert!(text.contains("triage_requests_total 1"));
        assert!(text.contains("triage_tickets_created_total 3"));
        assert!(text.contains("triage_duplicates_skipped_total 1"));
        assert!(text.contains("triage_stage_latency_ms"));
    }
}
