pub mod metrics_registry;

pub use metrics_registry::{MetricsRegistry, JOB_DURATION_METRIC};
