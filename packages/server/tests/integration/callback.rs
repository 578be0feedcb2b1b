use serde_json::json;
use uuid::Uuid;

use ::common::{FailureReason, JobStatus};

use crate::common::{CALLBACK_SECRET, TestApp, TestOptions};

async fn dispatched_job(app: &TestApp) -> Uuid {
    let job_id = app.submit_ok("db-123").await;
    app.dispatch(job_id).await;
    job_id
}

mod outcomes {
    use super::*;

    #[tokio::test]
    async fn success_callback_completes_job() {
        let app = TestApp::spawn().await;
        let job_id = dispatched_job(&app).await;

        let res = app
            .post_callback(
                job_id,
                &json!({"status": "success", "message": "ok", "result_reference": "doc://A1"}),
                Some(CALLBACK_SECRET),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "success");
        assert_eq!(res.body["applied"], true);

        let record = app.record(job_id).await;
        assert_eq!(record.status, JobStatus::Success);
        assert_eq!(record.result_message.as_deref(), Some("ok"));
        assert_eq!(record.result_reference.as_deref(), Some("doc://A1"));
        assert!(record.completed_at.is_some());
        assert!(record.dispatched_at.is_some());
    }

    #[tokio::test]
    async fn failure_callback_records_message() {
        let app = TestApp::spawn().await;
        let job_id = dispatched_job(&app).await;

        let res = app
            .post_callback(
                job_id,
                &json!({"status": "failure", "message": "unreadable image"}),
                Some(CALLBACK_SECRET),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        let record = app.record(job_id).await;
        assert_eq!(record.status, JobStatus::Failure);
        assert_eq!(record.result_message.as_deref(), Some("unreadable image"));
        assert!(record.result_reference.is_none());
    }

    #[tokio::test]
    async fn callback_may_arrive_before_dispatch_is_recorded() {
        let app = TestApp::spawn().await;
        let job_id = app.submit_ok("db-123").await;

        let res = app
            .post_callback(job_id, &json!({"status": "success"}), Some(CALLBACK_SECRET))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(app.record(job_id).await.status, JobStatus::Success);
    }

    #[tokio::test]
    async fn duplicate_callback_leaves_record_unchanged() {
        let app = TestApp::spawn().await;
        let job_id = dispatched_job(&app).await;

        let first = app
            .post_callback(
                job_id,
                &json!({"status": "success", "message": "first"}),
                Some(CALLBACK_SECRET),
            )
            .await;
        assert_eq!(first.status, 200);
        let before = app.record(job_id).await;

        let second = app
            .post_callback(
                job_id,
                &json!({"status": "failure", "message": "second"}),
                Some(CALLBACK_SECRET),
            )
            .await;

        assert_eq!(second.status, 200, "{}", second.text);
        assert_eq!(second.body["applied"], false);
        assert_eq!(second.body["status"], "success");
        assert_eq!(app.record(job_id).await, before);
    }
}

mod rejections {
    use super::*;

    #[tokio::test]
    async fn bad_token_returns_401_without_mutation() {
        let app = TestApp::spawn().await;
        let job_id = dispatched_job(&app).await;
        let before = app.record(job_id).await;

        for token in [None, Some(""), Some("wrong-secret")] {
            let res = app
                .post_callback(job_id, &json!({"status": "success"}), token)
                .await;
            assert_eq!(res.status, 401, "token {token:?}: {}", res.text);
            assert_eq!(res.body["code"], "UNAUTHORIZED");
        }

        assert_eq!(app.record(job_id).await, before);
    }

    #[tokio::test]
    async fn empty_secret_never_authenticates() {
        let app = TestApp::spawn_with_options(TestOptions {
            callback_secret: String::new(),
            ..Default::default()
        })
        .await;
        let job_id = dispatched_job(&app).await;

        for token in [None, Some("")] {
            let res = app
                .post_callback(job_id, &json!({"status": "success"}), token)
                .await;
            assert_eq!(res.status, 401, "token {token:?}: {}", res.text);
        }

        assert_eq!(app.record(job_id).await.status, JobStatus::Dispatched);
    }

    #[tokio::test]
    async fn bad_token_for_unknown_job_is_401_not_404() {
        let app = TestApp::spawn().await;

        let res = app
            .post_callback(Uuid::now_v7(), &json!({"status": "success"}), Some("nope"))
            .await;

        assert_eq!(res.status, 401);
    }

    #[tokio::test]
    async fn bad_token_is_checked_before_body() {
        let app = TestApp::spawn().await;

        let res = app
            .post_callback(Uuid::now_v7(), &json!({"bogus": true}), Some("nope"))
            .await;

        assert_eq!(res.status, 401);
    }

    #[tokio::test]
    async fn unknown_job_returns_404_and_creates_nothing() {
        let app = TestApp::spawn().await;
        let job_id = Uuid::now_v7();

        let res = app
            .post_callback(job_id, &json!({"status": "success"}), Some(CALLBACK_SECRET))
            .await;

        assert_eq!(res.status, 404, "{}", res.text);
        assert!(app.store().get(job_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_terminal_status_returns_409() {
        let app = TestApp::spawn().await;
        let job_id = dispatched_job(&app).await;

        for status in ["queued", "dispatched"] {
            let res = app
                .post_callback(job_id, &json!({"status": status}), Some(CALLBACK_SECRET))
                .await;
            assert_eq!(res.status, 409, "{status}: {}", res.text);
            assert_eq!(res.body["code"], "INVALID_TRANSITION");
        }

        assert_eq!(app.record(job_id).await.status, JobStatus::Dispatched);
    }

    #[tokio::test]
    async fn reserved_reason_as_message_returns_400() {
        let app = TestApp::spawn().await;
        let job_id = dispatched_job(&app).await;

        for status in ["failure", "success"] {
            let res = app
                .post_callback(
                    job_id,
                    &json!({"status": status, "message": FailureReason::DISPATCH_EXHAUSTED}),
                    Some(CALLBACK_SECRET),
                )
                .await;
            assert_eq!(res.status, 400, "{status}: {}", res.text);
            assert_eq!(res.body["code"], "VALIDATION_ERROR");
        }

        assert_eq!(app.record(job_id).await.status, JobStatus::Dispatched);
        let res = app.get(crate::common::routes::FAILURES).await;
        assert_eq!(res.body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn malformed_body_returns_400() {
        let app = TestApp::spawn().await;
        let job_id = dispatched_job(&app).await;

        let res = app
            .post_callback(job_id, &json!({"status": "done"}), Some(CALLBACK_SECRET))
            .await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert_eq!(app.record(job_id).await.status, JobStatus::Dispatched);
    }
}
