use std::time::Duration;

use mq::DurableQueue;
use serde_json::json;

use ::common::{FailureReason, JobStatus, WorkItem};
use server::config::ReconcileConfig;
use server::reconcile::reconcile_once;

use crate::common::{CALLBACK_SECRET, TestApp};

fn immediate() -> ReconcileConfig {
    ReconcileConfig {
        stale_queued_secs: 0,
        callback_timeout_secs: 0,
        ..Default::default()
    }
}

async fn run(app: &TestApp, config: &ReconcileConfig) -> server::reconcile::ReconcileReport {
    // Staleness is compared against `now`, so let the clock move past the last write.
    tokio::time::sleep(Duration::from_millis(20)).await;
    reconcile_once(&app.db, app.queue.as_ref(), config, &app.config.submission)
        .await
        .expect("reconcile pass failed")
}

#[tokio::test]
async fn lost_queue_item_is_requeued_from_stored_payload() {
    let app = TestApp::spawn().await;
    let job_id = app.submit_ok("db-123").await;

    // Drop the item as if the queue had lost it.
    let delivery = app
        .queue
        .dequeue(Duration::from_millis(100))
        .await
        .unwrap()
        .unwrap();
    app.queue.ack(&delivery.handle).await.unwrap();
    assert!(app.queue.is_empty().await);

    let report = run(&app, &immediate()).await;
    assert_eq!(report.requeued, 1);

    let delivery = app
        .queue
        .dequeue(Duration::from_millis(100))
        .await
        .unwrap()
        .expect("Job should be back on the queue");
    let item: WorkItem = delivery.decode().unwrap();
    assert_eq!(item.job_id, job_id);
    assert_eq!(item.payload, b"\x89PNG");
    assert_eq!(app.record(job_id).await.status, JobStatus::Queued);
}

#[tokio::test]
async fn item_still_on_queue_is_not_duplicated() {
    let app = TestApp::spawn().await;
    app.submit_ok("db-123").await;

    run(&app, &immediate()).await;

    assert_eq!(app.queue.len().await, 1);
}

#[tokio::test]
async fn fresh_queued_job_is_left_alone() {
    let app = TestApp::spawn().await;
    let job_id = app.submit_ok("db-123").await;
    let before = app.record(job_id).await;

    let report = run(&app, &ReconcileConfig::default()).await;

    assert!(report.is_empty());
    assert_eq!(app.record(job_id).await, before);
}

#[tokio::test]
async fn old_queued_job_times_out() {
    let app = TestApp::spawn().await;
    let job_id = app.submit_ok("db-123").await;

    let config = ReconcileConfig {
        queued_max_age_secs: 0,
        ..immediate()
    };
    let report = run(&app, &config).await;

    assert_eq!(report.queue_timed_out, 1);
    let record = app.record(job_id).await;
    assert_eq!(record.status, JobStatus::Failure);
    assert_eq!(record.result_message.as_deref(), Some(FailureReason::QUEUE_TIMEOUT));
    assert!(record.completed_at.is_some());
    assert!(app.store().payload(job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn silent_dispatched_job_times_out() {
    let app = TestApp::spawn().await;
    let job_id = app.submit_ok("db-123").await;
    app.dispatch(job_id).await;

    let report = run(&app, &immediate()).await;

    assert_eq!(report.callback_timed_out, 1);
    let record = app.record(job_id).await;
    assert_eq!(record.status, JobStatus::Failure);
    assert_eq!(
        record.result_message.as_deref(),
        Some(FailureReason::CALLBACK_TIMEOUT)
    );
}

#[tokio::test]
async fn late_callback_after_timeout_is_ignored() {
    let app = TestApp::spawn().await;
    let job_id = app.submit_ok("db-123").await;
    app.dispatch(job_id).await;
    run(&app, &immediate()).await;

    let res = app
        .post_callback(job_id, &json!({"status": "success"}), Some(CALLBACK_SECRET))
        .await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["applied"], false);
    assert_eq!(app.record(job_id).await.status, JobStatus::Failure);
}

#[tokio::test]
async fn completed_jobs_are_never_touched() {
    let app = TestApp::spawn().await;
    let job_id = app.submit_ok("db-123").await;
    app.dispatch(job_id).await;
    let res = app
        .post_callback(job_id, &json!({"status": "success"}), Some(CALLBACK_SECRET))
        .await;
    assert_eq!(res.status, 200);
    let before = app.record(job_id).await;

    let config = ReconcileConfig {
        queued_max_age_secs: 0,
        ..immediate()
    };
    let report = run(&app, &config).await;

    assert!(report.is_empty());
    assert_eq!(app.record(job_id).await, before);
}
