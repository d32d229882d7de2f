//! 任务状态机
//!
//! 合法转换表是唯一的判定依据；`reduce` 把执行器回报折叠成下一步动作，
//! 不依赖存储，重复投递同一回报得到相同结果。

use chrono::{DateTime, Duration, Utc};
use scene_core::{SceneError, SceneResult};

use crate::entities::{ExecutorReport, Job, JobStatus, ReportKind, TaskHandle};

use crate::entities::JobStatus::*;

const TRANSITIONS: &[(JobStatus, JobStatus)] = &[
    (Pending, Running),
    // 首次提交执行器失败
    (Pending, Failed),
    (Pending, Cancelled),
    (Running, Succeeded),
    (Running, Retrying),
    (Running, Failed),
    (Running, Cancelled),
    (Retrying, Running),
    (Retrying, Failed),
    (Retrying, Cancelled),
];

pub const LOST_DETAIL: &str = "lost";

pub struct JobStateMachine;

impl JobStateMachine {
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        TRANSITIONS.contains(&(from, to))
    }

    pub fn allowed_targets(from: JobStatus) -> Vec<JobStatus> {
        TRANSITIONS
            .iter()
            .filter(|(f, _)| *f == from)
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn validate(job_id: i64, from: JobStatus, to: JobStatus) -> SceneResult<()> {
        if Self::can_transition(from, to) {
            Ok(())
        } else {
            Err(SceneError::illegal_transition(job_id, from, to))
        }
    }

    /// 计算转换后的任务记录，原记录不变
    ///
    /// 进入 retrying 时 retry_count 加一；updated_at 不会早于原值。
    pub fn transition(
        job: &Job,
        to: JobStatus,
        error_detail: Option<String>,
        now: DateTime<Utc>,
    ) -> SceneResult<Job> {
        Self::validate(job.id, job.status, to)?;

        let mut next = job.clone();
        next.status = to;
        if to == Retrying {
            next.retry_count += 1;
        }
        if error_detail.is_some() {
            next.error_detail = error_detail;
        }
        next.touch(now);
        Ok(next)
    }

    /// pending/retrying -> running，绑定新的任务句柄
    pub fn start(job: &Job, handle: TaskHandle, now: DateTime<Utc>) -> SceneResult<Job> {
        let mut next = Self::transition(job, Running, None, now)?;
        next.task_id = Some(handle);
        Ok(next)
    }

    /// 重新派发失败计入一次重试
    ///
    /// 预算未耗尽时保持 retrying 并把 retry_count 加一，退避随之翻倍；
    /// 预算耗尽时转为 failed。
    pub fn charge_failed_attempt(
        job: &Job,
        error_detail: String,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> SceneResult<Job> {
        if job.status != Retrying {
            return Err(SceneError::illegal_transition(job.id, job.status, Running));
        }
        if !policy.can_retry(job.retry_count) {
            return Self::transition(job, Failed, Some(error_detail), now);
        }

        let mut next = job.clone();
        next.retry_count += 1;
        next.error_detail = Some(error_detail);
        next.touch(now);
        Ok(next)
    }
}

/// 重试策略，退避时间只由 retry_count 推导
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::seconds(30),
            backoff_max: Duration::seconds(1800),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_seconds: u64, backoff_max_seconds: u64) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::seconds(backoff_base_seconds.min(u32::MAX as u64) as i64),
            backoff_max: Duration::seconds(backoff_max_seconds.min(u32::MAX as u64) as i64),
        }
    }

    pub fn can_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// base * 2^(n-1)，上限 backoff_max
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(30);
        let factor = 1i32 << exponent;
        self.backoff_base
            .checked_mul(factor)
            .map(|d| d.min(self.backoff_max))
            .unwrap_or(self.backoff_max)
    }

    pub fn next_attempt_at(&self, job: &Job) -> DateTime<Utc> {
        job.updated_at + self.backoff(job.retry_count)
    }

    pub fn is_due(&self, job: &Job, now: DateTime<Utc>) -> bool {
        job.status == Retrying && self.next_attempt_at(job) <= now
    }
}

/// 回报折叠后的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// 执行状态转换
    Apply {
        to: JobStatus,
        error_detail: Option<String>,
    },
    /// 只刷新 updated_at
    Touch,
    /// 已处理过或与当前任务无关
    Ignore(&'static str),
    /// 违反状态机
    Reject { to: JobStatus },
}

/// 根据当前状态和回报决定动作
pub fn reduce(
    status: JobStatus,
    retry_count: u32,
    current_task: Option<&TaskHandle>,
    report: &ExecutorReport,
    policy: &RetryPolicy,
) -> Reconciliation {
    if current_task != Some(&report.task_id) {
        return Reconciliation::Ignore("stale task handle");
    }
    if status == Cancelled {
        return Reconciliation::Ignore("job cancelled");
    }

    let failure_target = |detail: Option<String>| Reconciliation::Apply {
        to: if policy.can_retry(retry_count) {
            Retrying
        } else {
            Failed
        },
        error_detail: detail,
    };

    match (report.kind, status) {
        (ReportKind::Progress, Running) => Reconciliation::Touch,
        (ReportKind::Progress, _) => Reconciliation::Ignore("progress outside running"),

        (ReportKind::Success, Running) => Reconciliation::Apply {
            to: Succeeded,
            error_detail: None,
        },
        (ReportKind::Success, Succeeded) => Reconciliation::Ignore("already succeeded"),
        (ReportKind::Success, _) => Reconciliation::Reject { to: Succeeded },

        (ReportKind::Failure, Running) => failure_target(Some(
            report
                .detail
                .clone()
                .unwrap_or_else(|| "failure".to_string()),
        )),
        (ReportKind::Failure, Retrying | Failed) => Reconciliation::Ignore("failure already applied"),
        (ReportKind::Failure, _) => Reconciliation::Reject { to: Failed },

        (ReportKind::Lost, Running) => failure_target(Some(LOST_DETAIL.to_string())),
        (ReportKind::Lost, _) => Reconciliation::Ignore("lost outside running"),
    }
}

/// 对完整任务记录执行 `reduce`
pub fn reduce_job(job: &Job, report: &ExecutorReport, policy: &RetryPolicy) -> Reconciliation {
    reduce(
        job.status,
        job.retry_count,
        job.task_id.as_ref(),
        report,
        policy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SceneMetadata;

    fn running_job(retry_count: u32) -> Job {
        let mut job = Job::new(None, "GOES-16_20260214T120000Z.nc", SceneMetadata::default());
        job.id = 7;
        job.status = Running;
        job.retry_count = retry_count;
        job.task_id = Some(TaskHandle::from("t-1"));
        job
    }

    fn report(kind: ReportKind) -> ExecutorReport {
        ExecutorReport::new(TaskHandle::from("t-1"), kind)
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [Succeeded, Failed, Cancelled] {
            assert!(JobStateMachine::allowed_targets(from).is_empty());
            for to in JobStatus::ALL {
                assert!(JobStateMachine::validate(1, from, to).is_err());
            }
        }
    }

    #[test]
    fn test_non_terminal_states_can_cancel() {
        for from in JobStatus::ACTIVE {
            assert!(JobStateMachine::can_transition(from, Cancelled));
        }
    }

    #[test]
    fn test_illegal_transition_leaves_job_unchanged() {
        let mut job = running_job(0);
        job.status = Succeeded;
        let before = job.clone();
        let err = JobStateMachine::transition(&job, Running, None, Utc::now()).unwrap_err();
        assert!(matches!(err, SceneError::IllegalTransition { id: 7, .. }));
        assert_eq!(job, before);
    }

    #[test]
    fn test_transition_to_retrying_increments_count() {
        let job = running_job(1);
        let next =
            JobStateMachine::transition(&job, Retrying, Some("oom".to_string()), Utc::now()).unwrap();
        assert_eq!(next.retry_count, 2);
        assert_eq!(next.error_detail.as_deref(), Some("oom"));
        assert!(next.updated_at >= job.updated_at);
    }

    #[test]
    fn test_transition_never_moves_updated_at_backwards() {
        let job = running_job(0);
        let past = job.updated_at - Duration::minutes(5);
        let next = JobStateMachine::transition(&job, Succeeded, None, past).unwrap();
        assert_eq!(next.updated_at, job.updated_at);
        assert!(next.updated_at >= next.created_at);
    }

    #[test]
    fn test_start_sets_task_handle() {
        let mut job = running_job(1);
        job.status = Retrying;
        let next = JobStateMachine::start(&job, TaskHandle::from("t-2"), Utc::now()).unwrap();
        assert_eq!(next.status, Running);
        assert_eq!(next.task_id, Some(TaskHandle::from("t-2")));
        assert_eq!(next.retry_count, 1);
    }

    #[test]
    fn test_failed_attempt_consumes_budget() {
        let policy = RetryPolicy::new(2, 10, 60);
        let mut job = running_job(1);
        job.status = Retrying;

        let charged =
            JobStateMachine::charge_failed_attempt(&job, "offline".to_string(), &policy, Utc::now())
                .unwrap();
        assert_eq!(charged.status, Retrying);
        assert_eq!(charged.retry_count, 2);
        assert!(policy.backoff(charged.retry_count) > policy.backoff(job.retry_count));

        let exhausted =
            JobStateMachine::charge_failed_attempt(&charged, "offline".to_string(), &policy, Utc::now())
                .unwrap();
        assert_eq!(exhausted.status, Failed);
        assert_eq!(exhausted.retry_count, 2);
        assert_eq!(exhausted.error_detail.as_deref(), Some("offline"));

        let err = JobStateMachine::charge_failed_attempt(
            &running_job(0),
            "offline".to_string(),
            &policy,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::IllegalTransition { .. }));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new(5, 10, 60);
        assert_eq!(policy.backoff(0), Duration::seconds(10));
        assert_eq!(policy.backoff(1), Duration::seconds(10));
        assert_eq!(policy.backoff(2), Duration::seconds(20));
        assert_eq!(policy.backoff(3), Duration::seconds(40));
        assert_eq!(policy.backoff(4), Duration::seconds(60));
        assert_eq!(policy.backoff(64), Duration::seconds(60));
    }

    #[test]
    fn test_retry_due() {
        let policy = RetryPolicy::new(3, 30, 300);
        let mut job = running_job(1);
        job.status = Retrying;
        assert!(!policy.is_due(&job, job.updated_at + Duration::seconds(29)));
        assert!(policy.is_due(&job, job.updated_at + Duration::seconds(30)));

        job.status = Running;
        assert!(!policy.is_due(&job, job.updated_at + Duration::hours(1)));
    }

    #[test]
    fn test_reduce_success_is_idempotent() {
        let policy = RetryPolicy::default();
        let job = running_job(0);
        let success = report(ReportKind::Success);

        let first = reduce_job(&job, &success, &policy);
        assert_eq!(
            first,
            Reconciliation::Apply {
                to: Succeeded,
                error_detail: None
            }
        );

        let applied = JobStateMachine::transition(&job, Succeeded, None, Utc::now()).unwrap();
        assert!(matches!(
            reduce_job(&applied, &success, &policy),
            Reconciliation::Ignore(_)
        ));
    }

    #[test]
    fn test_reduce_failure_respects_budget() {
        let policy = RetryPolicy::new(2, 1, 10);
        let failure = report(ReportKind::Failure).with_detail("exit 1");

        assert_eq!(
            reduce_job(&running_job(1), &failure, &policy),
            Reconciliation::Apply {
                to: Retrying,
                error_detail: Some("exit 1".to_string())
            }
        );
        assert_eq!(
            reduce_job(&running_job(2), &failure, &policy),
            Reconciliation::Apply {
                to: Failed,
                error_detail: Some("exit 1".to_string())
            }
        );
    }

    #[test]
    fn test_reduce_lost_tags_detail() {
        let policy = RetryPolicy::default();
        match reduce_job(&running_job(0), &report(ReportKind::Lost), &policy) {
            Reconciliation::Apply { to, error_detail } => {
                assert_eq!(to, Retrying);
                assert_eq!(error_detail.as_deref(), Some(LOST_DETAIL));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_reduce_duplicate_failure_is_ignored() {
        let policy = RetryPolicy::default();
        let mut job = running_job(1);
        job.status = Retrying;
        assert!(matches!(
            reduce_job(&job, &report(ReportKind::Failure), &policy),
            Reconciliation::Ignore(_)
        ));
    }

    #[test]
    fn test_reduce_rejects_success_after_failure() {
        let policy = RetryPolicy::default();
        let mut job = running_job(3);
        job.status = Failed;
        assert_eq!(
            reduce_job(&job, &report(ReportKind::Success), &policy),
            Reconciliation::Reject { to: Succeeded }
        );
    }

    #[test]
    fn test_reduce_ignores_stale_handle_and_cancelled() {
        let policy = RetryPolicy::default();
        let job = running_job(0);
        let stale = ExecutorReport::new(TaskHandle::from("t-0"), ReportKind::Success);
        assert!(matches!(
            reduce_job(&job, &stale, &policy),
            Reconciliation::Ignore(_)
        ));

        let mut cancelled = running_job(0);
        cancelled.status = Cancelled;
        assert!(matches!(
            reduce_job(&cancelled, &report(ReportKind::Success), &policy),
            Reconciliation::Ignore(_)
        ));
    }

    #[test]
    fn test_reduce_progress_touches_only_running() {
        let policy = RetryPolicy::default();
        assert_eq!(
            reduce_job(&running_job(0), &report(ReportKind::Progress), &policy),
            Reconciliation::Touch
        );
        let mut job = running_job(0);
        job.status = Succeeded;
        assert!(matches!(
            reduce_job(&job, &report(ReportKind::Progress), &policy),
            Reconciliation::Ignore(_)
        ));
    }
}
