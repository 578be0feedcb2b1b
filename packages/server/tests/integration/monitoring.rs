use ::common::{FailureReason, JobStatus};
use serde_json::json;

use crate::common::{CALLBACK_SECRET, TestApp, TestOptions, routes};

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_healthy_components() {
        let app = TestApp::spawn().await;

        let res = app.get(routes::HEALTH).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "healthy");
        assert_eq!(res.body["checks"]["database"]["status"], "healthy");
        assert_eq!(res.body["checks"]["queue"]["status"], "healthy");
    }

    #[tokio::test]
    async fn unreachable_queue_is_degraded() {
        let app = TestApp::spawn_with_options(TestOptions {
            unreachable_queue: true,
            ..Default::default()
        })
        .await;

        let res = app.get(routes::HEALTH).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "degraded");
        assert_eq!(res.body["checks"]["database"]["status"], "healthy");
        assert_eq!(res.body["checks"]["queue"]["status"], "unhealthy");
        assert!(res.body["checks"]["queue"]["message"].is_string());
    }

    #[tokio::test]
    async fn closed_database_is_unhealthy() {
        let app = TestApp::spawn().await;
        app.db.close_by_ref().await.expect("Failed to close pool");

        let res = app.get(routes::HEALTH).await;

        assert_eq!(res.status, 503, "{}", res.text);
        assert_eq!(res.body["status"], "unhealthy");
        assert_eq!(res.body["checks"]["database"]["status"], "unhealthy");
        assert_eq!(res.body["checks"]["queue"]["status"], "healthy");
    }
}

#[tokio::test]
async fn stats_report_queue_depth_and_status_counts() {
    let app = TestApp::spawn().await;
    let dispatched = app.submit_ok("db-1").await;
    app.submit_ok("db-2").await;
    app.submit_ok("db-3").await;
    app.dispatch(dispatched).await;

    let res = app.get(routes::STATS).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["queue"]["ready"], 2);
    assert_eq!(res.body["queue"]["pending"], 0);
    assert_eq!(res.body["jobs"]["queued"], 2);
    assert_eq!(res.body["jobs"]["dispatched"], 1);
    assert_eq!(res.body["jobs"]["success"], 0);
    assert_eq!(res.body["jobs"]["failure"], 0);
}

#[tokio::test]
async fn failures_list_only_engine_side_reasons() {
    let app = TestApp::spawn().await;

    let exhausted = app.submit_ok("db-1").await;
    app.store()
        .fail(exhausted, JobStatus::Queued, FailureReason::DISPATCH_EXHAUSTED)
        .await
        .unwrap();

    let timed_out = app.submit_ok("db-2").await;
    app.store()
        .fail(timed_out, JobStatus::Queued, FailureReason::QUEUE_TIMEOUT)
        .await
        .unwrap();

    // Reported by the workflow itself, not by the engine.
    let reported = app.submit_ok("db-3").await;
    let res = app
        .post_callback(
            reported,
            &json!({"status": "failure", "message": "bad input"}),
            Some(CALLBACK_SECRET),
        )
        .await;
    assert_eq!(res.status, 200);

    let res = app.get(routes::FAILURES).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["pagination"]["total"], 2);
    let ids: Vec<&str> = res.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["job_id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&exhausted.to_string().as_str()));
    assert!(ids.contains(&timed_out.to_string().as_str()));

    let res = app
        .get(&format!("{}?reason=dispatch_exhausted", routes::FAILURES))
        .await;
    assert_eq!(res.body["pagination"]["total"], 1);
    assert_eq!(res.body["data"][0]["job_id"], exhausted.to_string());
    assert_eq!(res.body["data"][0]["result_message"], "dispatch_exhausted");
}

#[tokio::test]
async fn failures_paginate() {
    let app = TestApp::spawn().await;
    for i in 0..3 {
        let job_id = app.submit_ok(&format!("db-{i}")).await;
        app.store()
            .fail(job_id, JobStatus::Queued, FailureReason::DISPATCH_EXHAUSTED)
            .await
            .unwrap();
    }

    let res = app
        .get(&format!("{}?page=2&per_page=2", routes::FAILURES))
        .await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["data"].as_array().unwrap().len(), 1);
    assert_eq!(res.body["pagination"]["total"], 3);
    assert_eq!(res.body["pagination"]["total_pages"], 2);
}

#[tokio::test]
async fn failures_reject_out_of_range_page() {
    let app = TestApp::spawn().await;
    let job_id = app.submit_ok("db-1").await;
    app.store()
        .fail(job_id, JobStatus::Queued, FailureReason::DISPATCH_EXHAUSTED)
        .await
        .unwrap();

    let res = app
        .get(&format!("{}?page=18446744073709551615&per_page=100", routes::FAILURES))
        .await;
    assert_eq!(res.status, 400, "{}", res.text);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");

    let res = app.get(&format!("{}?page=1000000", routes::FAILURES)).await;
    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["pagination"]["total"], 1);
    assert!(res.body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_failure_reason_returns_400() {
    let app = TestApp::spawn().await;

    let res = app.get(&format!("{}?reason=bad_input", routes::FAILURES)).await;

    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}
