use crate::annotate::Tier;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

/// Instruments recorded by `InferencePipeline`. Without a registered meter
/// provider these are no-ops.
#[derive(Clone)]
pub struct PipelineMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    detections: Counter<u64>,
    annotation_tiers: Counter<u64>,
}

impl PipelineMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.05, 0.1, 0.2, 0.3, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0, 20.0,
        ];

        Self {
            duration: meter
                .f64_histogram("inference_duration_seconds")
                .with_description("Time to detect, count and annotate one image")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            requests: meter
                .u64_counter("inference_requests_total")
                .with_description("Total inference requests by outcome")
                .build(),
            detections: meter
                .u64_counter("inference_detections_total")
                .with_description("Total detections produced")
                .build(),
            annotation_tiers: meter
                .u64_counter("annotation_tier_total")
                .with_description("Annotated images by writing strategy")
                .build(),
        }
    }

    pub fn record_success(&self, elapsed: Duration, detections: usize, tier: Option<Tier>) {
        self.duration.record(elapsed.as_secs_f64(), &[]);
        self.requests.add(1, &[KeyValue::new("outcome", "ok")]);
        self.detections.add(detections as u64, &[]);

        let tier = tier.map(|t| t.as_str()).unwrap_or("none");
        self.annotation_tiers.add(1, &[KeyValue::new("tier", tier)]);
    }

    pub fn record_failure(&self) {
        self.requests.add(1, &[KeyValue::new("outcome", "error")]);
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new("inference")
    }
}
