//! Prometheus metrics of the reconcile loop

use prometheus::{exponential_buckets, Histogram, HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use resource_graph::{Report, Status};
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::time::Duration;

pub struct Metrics {
    registry: Registry,
    evaluations: IntCounterVec,
    evaluation_seconds: Histogram,
    resources_by_status: IntGaugeVec,
    pruned_total: IntGauge,
    last_success_timestamp: IntGauge,
}

impl Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Metrics")
    }
}

const STATUSES: [&str; 9] = [
    "create", "update", "replace", "read", "same", "delete", "pending", "failed", "blocked",
];

fn status_label(status: &Status) -> &'static str {
    use resource_graph::Action;
    match status {
        Status::Done(Action::Create) => "create",
        Status::Done(Action::Update) => "update",
        Status::Done(Action::Replace) => "replace",
        Status::Done(Action::Read) => "read",
        Status::Done(Action::Same) => "same",
        Status::Done(Action::Delete) => "delete",
        Status::Pending => "pending",
        Status::Failed(_) => "failed",
        Status::Blocked => "blocked",
    }
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("cluster_provisioner".to_string()), None)?;

        let evaluations = IntCounterVec::new(
            Opts::new("evaluations_total", "graph evaluations by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(evaluations.clone()))?;

        // 1s .. ~34m
        let evaluation_seconds = Histogram::with_opts(
            HistogramOpts::new("evaluation_seconds", "wall-clock time of one graph evaluation")
                .buckets(exponential_buckets(1.0, 2.0, 12)?),
        )?;
        registry.register(Box::new(evaluation_seconds.clone()))?;

        let resources_by_status = IntGaugeVec::new(
            Opts::new("resources", "resources by status in the last evaluation"),
            &["status"],
        )?;
        registry.register(Box::new(resources_by_status.clone()))?;

        let pruned_total = IntGauge::new("pruned_resources", "resources deleted by the last evaluation")?;
        registry.register(Box::new(pruned_total.clone()))?;

        let last_success_timestamp = IntGauge::new(
            "last_success_timestamp_seconds",
            "unix time of the last fully successful evaluation",
        )?;
        registry.register(Box::new(last_success_timestamp.clone()))?;

        Ok(Self {
            registry,
            evaluations,
            evaluation_seconds,
            resources_by_status,
            pruned_total,
            last_success_timestamp,
        })
    }

    /// Record the outcome of one evaluation
    pub fn observe(&self, report: &Report, elapsed: Duration) {
        let outcome = if report.is_success() { "success" } else { "failure" };
        self.evaluations.with_label_values(&[outcome]).inc();
        self.evaluation_seconds.observe(elapsed.as_secs_f64());

        let mut counts: BTreeMap<&str, i64> = STATUSES.iter().map(|s| (*s, 0)).collect();
        for status in report.statuses.values() {
            *counts.entry(status_label(status)).or_insert(0) += 1;
        }
        for (status, count) in counts {
            self.resources_by_status.with_label_values(&[status]).set(count);
        }
        self.pruned_total.set(report.pruned.len() as i64);

        if report.is_success() {
            self.last_success_timestamp.set(chrono::Utc::now().timestamp());
        }
    }

    /// Evaluation that could not run at all (e.g. unreadable state)
    pub fn evaluation_error(&self) {
        self.evaluations.with_label_values(&["error"]).inc();
    }

    pub fn encode_as_text(&self) -> Result<Vec<u8>, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::with_capacity(4096);
        encoder.encode(self.registry.gather().as_slice(), &mut buffer)?;
        Ok(buffer)
    }
}
