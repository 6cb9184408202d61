//! Metrics definitions for the content store client and writer.

use shared::metrics_defs::{MetricDef, MetricType};

pub const STORE_REQUEST_DURATION: MetricDef = MetricDef {
    name: "store.request.duration",
    metric_type: MetricType::Histogram,
    description: "Content store request duration in seconds. Tagged with operation, outcome.",
};

pub const STORE_WRITE_ATTEMPTS: MetricDef = MetricDef {
    name: "store.write.attempts",
    metric_type: MetricType::Counter,
    description: "Number of write attempts issued by the conflict-aware writer",
};

pub const STORE_WRITE_CONFLICTS: MetricDef = MetricDef {
    name: "store.write.conflicts",
    metric_type: MetricType::Counter,
    description: "Number of writes rejected with a version conflict",
};

pub const STORE_RETRIES_EXHAUSTED: MetricDef = MetricDef {
    name: "store.write.retries_exhausted",
    metric_type: MetricType::Counter,
    description: "Number of files whose writes still conflicted after the last attempt",
};

pub const ALL_METRICS: &[MetricDef] = &[
    STORE_REQUEST_DURATION,
    STORE_WRITE_ATTEMPTS,
    STORE_WRITE_CONFLICTS,
    STORE_RETRIES_EXHAUSTED,
];
