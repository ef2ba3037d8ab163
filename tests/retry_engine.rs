mod common;

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{Duration, TimeZone, Utc};
use common::{init_tracing, TestResult};
use proptest::prelude::*;
use serde_json::json;

use queuewarden::queue::{InMemoryQueue, Job, JobArgs, RETRY_ATTEMPT_KEY, RETRY_STRATEGY_KEY};
use queuewarden::retry::{RetryEngine, RetryOutcome};
use queuewarden_test_utils::{FailingQueue, FixedClock};

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()))
}

fn failed_job(strategy: serde_json::Value, attempt: Option<u64>) -> Job {
    let mut args = JobArgs::new()
        .with(RETRY_STRATEGY_KEY, strategy)
        .with("recipient", "ops@example.com");
    if let Some(attempt) = attempt {
        args.set(RETRY_ATTEMPT_KEY, attempt);
    }
    Job::new("mail", "SendMail", args)
}

#[tokio::test]
async fn zero_delay_goes_back_on_the_queue_tail() -> TestResult {
    init_tracing();
    let queue = InMemoryQueue::new();
    let engine = RetryEngine::new(Arc::new(queue.clone())).with_clock(clock());

    let job = failed_job(json!([0, 60]), None);
    let outcome = engine.handle_failure(&anyhow!("boom"), &job).await;

    assert_eq!(outcome, RetryOutcome::Requeued { attempt: 0 });
    let pending = queue.pending("mail");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].class, "SendMail");
    assert_ne!(pending[0].id, job.id);
    assert_eq!(pending[0].args.retry_attempt()?, 1);
    assert_eq!(pending[0].args.get("recipient"), Some(&json!("ops@example.com")));
    Ok(())
}

#[tokio::test]
async fn positive_delay_schedules_relative_to_the_clock() -> TestResult {
    let queue = InMemoryQueue::new();
    let clock = clock();
    let engine = RetryEngine::new(Arc::new(queue.clone())).with_clock(clock.clone());

    let job = failed_job(json!([0, 60]), Some(1));
    let outcome = engine.handle_failure(&anyhow!("boom"), &job).await;

    let due = clock.0 + Duration::seconds(60);
    assert_eq!(
        outcome,
        RetryOutcome::Scheduled {
            attempt: 1,
            delay_secs: 60,
            at: due
        }
    );
    assert!(queue.pending("mail").is_empty());
    let scheduled = queue.scheduled();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].0, due);
    assert_eq!(scheduled[0].1.args.retry_attempt()?, 2);

    assert_eq!(queue.promote_due(due), 1);
    assert_eq!(queue.pending("mail").len(), 1);
    Ok(())
}

#[tokio::test]
async fn job_without_strategy_is_left_alone() -> TestResult {
    let queue = InMemoryQueue::new();
    let engine = RetryEngine::new(Arc::new(queue.clone()));

    let job = Job::new("mail", "SendMail", JobArgs::new());
    assert_eq!(
        engine.handle_failure(&anyhow!("boom"), &job).await,
        RetryOutcome::NotRetryable
    );
    assert!(queue.pending("mail").is_empty());
    Ok(())
}

#[tokio::test]
async fn broker_errors_are_reported_not_raised() -> TestResult {
    let engine = RetryEngine::new(Arc::new(FailingQueue)).with_clock(clock());

    for job in [failed_job(json!([0]), None), failed_job(json!([5]), None)] {
        match engine.handle_failure(&anyhow!("boom"), &job).await {
            RetryOutcome::Failed { reason } => assert!(reason.contains("broker down"), "{reason}"),
            other => panic!("expected failure outcome, got {other:?}"),
        }
    }
    Ok(())
}

#[tokio::test]
async fn malformed_strategy_is_not_retried() -> TestResult {
    let queue = InMemoryQueue::new();
    let engine = RetryEngine::new(Arc::new(queue.clone()));

    let job = failed_job(json!(["soon"]), None);
    assert!(matches!(
        engine.handle_failure(&anyhow!("boom"), &job).await,
        RetryOutcome::Failed { .. }
    ));
    assert!(queue.pending("mail").is_empty());
    Ok(())
}

proptest! {
    #[test]
    fn exhausted_strategies_never_resubmit(
        strategy in proptest::collection::vec(0u64..3600, 0..6),
        extra in 0u64..10,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let attempt = strategy.len() as u64 + extra;
        let queue = InMemoryQueue::new();
        let engine = RetryEngine::new(Arc::new(queue.clone())).with_clock(clock());
        let job = failed_job(json!(strategy), Some(attempt));

        let outcome = rt.block_on(engine.handle_failure(&anyhow!("boom"), &job));

        if strategy.is_empty() {
            prop_assert_eq!(outcome, RetryOutcome::NotRetryable);
        } else {
            prop_assert_eq!(outcome, RetryOutcome::Exhausted { attempt });
        }
        prop_assert!(queue.pending("mail").is_empty());
        prop_assert!(queue.scheduled().is_empty());
    }

    #[test]
    fn each_attempt_uses_its_own_delay(
        strategy in proptest::collection::vec(0u64..3600, 1..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let attempt = pick.index(strategy.len()) as u64;
        let delay = strategy[attempt as usize];
        let queue = InMemoryQueue::new();
        let clock = clock();
        let engine = RetryEngine::new(Arc::new(queue.clone())).with_clock(clock.clone());
        let job = failed_job(json!(strategy), Some(attempt));

        let outcome = rt.block_on(engine.handle_failure(&anyhow!("boom"), &job));

        if delay == 0 {
            prop_assert_eq!(outcome, RetryOutcome::Requeued { attempt });
            prop_assert_eq!(queue.pending("mail").len(), 1);
        } else {
            let at = clock.0 + Duration::seconds(delay as i64);
            prop_assert_eq!(outcome, RetryOutcome::Scheduled { attempt, delay_secs: delay, at });
            prop_assert_eq!(queue.scheduled().len(), 1);
        }
    }
}
