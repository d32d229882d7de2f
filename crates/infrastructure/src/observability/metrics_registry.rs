//! Metrics registry for the job lifecycle subsystem
//!
//! Owns its own Prometheus recorder instead of installing a global one, so
//! several registries (one per test, for instance) can coexist in a process.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Counter, Gauge,
    Histogram, Unit,
};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use scene_domain::entities::{Job, JobStatus};
use std::collections::HashMap;
use tracing::debug;

pub const JOB_DURATION_METRIC: &str = "scene_job_duration_seconds";

/// Bucket bounds in seconds, from a quick retry up to several hours of processing
const JOB_DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0, 14400.0,
];

struct JobMetrics {
    created_total: Counter,
    dispatched_total: Counter,
    succeeded_total: Counter,
    failed_total: Counter,
    retried_total: Counter,
    cancelled_total: Counter,
    orphaned_total: Counter,
    duration: HashMap<JobStatus, Histogram>,
    by_status: HashMap<JobStatus, Gauge>,
}

impl JobMetrics {
    /// Must run with the registry's recorder installed locally
    fn register() -> Self {
        describe_counter!("scene_jobs_created_total", "Jobs created by the submission path");
        describe_counter!("scene_jobs_dispatched_total", "Executor handles obtained for jobs");
        describe_counter!("scene_jobs_succeeded_total", "Jobs that reached succeeded");
        describe_counter!("scene_jobs_failed_total", "Jobs that reached failed");
        describe_counter!("scene_jobs_retried_total", "Transitions into retrying");
        describe_counter!("scene_jobs_cancelled_total", "Jobs cancelled explicitly");
        describe_counter!("scene_jobs_orphaned_total", "Jobs found stale by the orphan sweep");
        describe_histogram!(
            JOB_DURATION_METRIC,
            Unit::Seconds,
            "Time from job creation to its terminal state"
        );
        describe_gauge!("scene_jobs", "Jobs currently stored, by status");

        Self {
            created_total: counter!("scene_jobs_created_total"),
            dispatched_total: counter!("scene_jobs_dispatched_total"),
            succeeded_total: counter!("scene_jobs_succeeded_total"),
            failed_total: counter!("scene_jobs_failed_total"),
            retried_total: counter!("scene_jobs_retried_total"),
            cancelled_total: counter!("scene_jobs_cancelled_total"),
            orphaned_total: counter!("scene_jobs_orphaned_total"),
            duration: [JobStatus::Succeeded, JobStatus::Failed, JobStatus::Cancelled]
                .into_iter()
                .map(|status| {
                    (
                        status,
                        histogram!(JOB_DURATION_METRIC, "status" => status.as_str()),
                    )
                })
                .collect(),
            by_status: JobStatus::ALL
                .into_iter()
                .map(|status| (status, gauge!("scene_jobs", "status" => status.as_str())))
                .collect(),
        }
    }
}

pub struct MetricsRegistry {
    // Keeps the storage behind every handle alive
    _recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    jobs: JobMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(JOB_DURATION_METRIC.to_string()),
                JOB_DURATION_BUCKETS,
            )?
            .build_recorder();
        let handle = recorder.handle();
        let jobs = metrics::with_local_recorder(&recorder, JobMetrics::register);

        Ok(Self {
            _recorder: recorder,
            handle,
            jobs,
        })
    }

    pub fn record_job_created(&self) {
        self.jobs.created_total.increment(1);
    }

    pub fn record_job_orphaned(&self) {
        self.jobs.orphaned_total.increment(1);
    }

    /// Counts the transition and observes `updated_at - created_at` for terminal states
    pub fn record_transition(&self, job: &Job) {
        match job.status {
            JobStatus::Running => self.jobs.dispatched_total.increment(1),
            JobStatus::Retrying => self.jobs.retried_total.increment(1),
            JobStatus::Succeeded => self.jobs.succeeded_total.increment(1),
            JobStatus::Failed => self.jobs.failed_total.increment(1),
            JobStatus::Cancelled => self.jobs.cancelled_total.increment(1),
            JobStatus::Pending => {}
        }

        if let Some(histogram) = self.jobs.duration.get(&job.status) {
            let seconds = job.duration_seconds().max(0.0);
            histogram.record(seconds);
            debug!(
                job_id = job.id,
                status = %job.status,
                duration_seconds = seconds,
                "Job reached terminal state"
            );
        }
    }

    pub fn update_status_counts(&self, counts: &[(JobStatus, i64)]) {
        for (status, gauge) in &self.jobs.by_status {
            let count = counts
                .iter()
                .find(|(s, _)| s == status)
                .map(|(_, c)| *c)
                .unwrap_or(0);
            gauge.set(count as f64);
        }
    }

    /// Prometheus text exposition
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
