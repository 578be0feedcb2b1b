use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;

use ::common::mq::MessageEnvelope;
use mq::{AckHandle, Delivery, DurableQueue, MemoryQueue, MqError, QueueDepth};
use server::config::{
    AppConfig, CallbackConfig, CorsConfig, DatabaseConfig, MqAppConfig, ReconcileConfig,
    ServerConfig, SubmissionConfig,
};
use server::state::AppState;
use store::{AuditStore, JobRecord, audit_store, init_db};

pub const CALLBACK_SECRET: &str = "test-callback-secret";

pub mod routes {
    pub const JOBS: &str = "/api/v1/jobs";
    pub const STATS: &str = "/api/v1/monitoring/stats";
    pub const FAILURES: &str = "/api/v1/monitoring/failures";
    pub const HEALTH: &str = "/api/v1/health";

    pub fn job(id: impl std::fmt::Display) -> String {
        format!("/api/v1/jobs/{id}")
    }

    pub fn callback(id: impl std::fmt::Display) -> String {
        format!("/api/v1/jobs/{id}/callback")
    }
}

/// Queue whose broker is unreachable. Every call fails.
pub struct UnreachableQueue;

#[async_trait]
impl DurableQueue for UnreachableQueue {
    async fn enqueue(&self, _envelope: MessageEnvelope, _delay: Duration) -> Result<(), MqError> {
        Err(MqError::Connection("connection refused".into()))
    }

    async fn dequeue(&self, _wait: Duration) -> Result<Option<Delivery>, MqError> {
        Err(MqError::Connection("connection refused".into()))
    }

    async fn ack(&self, _handle: &AckHandle) -> Result<bool, MqError> {
        Err(MqError::Connection("connection refused".into()))
    }

    async fn nack(&self, _handle: &AckHandle, _delay: Duration) -> Result<bool, MqError> {
        Err(MqError::Connection("connection refused".into()))
    }

    async fn depth(&self) -> Result<QueueDepth, MqError> {
        Err(MqError::Connection("connection refused".into()))
    }
}

/// Knobs for [`TestApp::spawn_with_options`].
pub struct TestOptions {
    pub submission: SubmissionConfig,
    pub callback_secret: String,
    /// Serve with [`UnreachableQueue`]. `TestApp::queue` stays a working queue
    /// that only the test itself touches.
    pub unreachable_queue: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            submission: SubmissionConfig::default(),
            callback_secret: CALLBACK_SECRET.to_string(),
            unreachable_queue: false,
        }
    }
}

/// A running test server backed by a throwaway SQLite file and an in-memory queue.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub queue: Arc<MemoryQueue>,
    pub config: AppConfig,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.expect("Failed to read response body");
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    pub fn job_id(&self) -> Uuid {
        self.body["job_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(|| panic!("Response has no job_id: {}", self.text))
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(SubmissionConfig::default()).await
    }

    pub async fn spawn_with(submission: SubmissionConfig) -> Self {
        Self::spawn_with_options(TestOptions {
            submission,
            ..Default::default()
        })
        .await
    }

    pub async fn spawn_with_options(options: TestOptions) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let url = format!("sqlite://{}/relay.db?mode=rwc", dir.path().display());
        let database = DatabaseConfig::new(url);
        let db = init_db(&database)
            .await
            .expect("Failed to initialize test database");

        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig::default(),
            },
            database,
            callback: CallbackConfig {
                secret: options.callback_secret,
            },
            mq: MqAppConfig::default(),
            submission: options.submission,
            reconcile: ReconcileConfig {
                enabled: false,
                ..Default::default()
            },
        };

        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30)));
        let served: Arc<mq::Mq> = if options.unreachable_queue {
            Arc::new(UnreachableQueue)
        } else {
            queue.clone()
        };
        let state = AppState {
            db: db.clone(),
            queue: served,
            config: config.clone(),
        };

        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            queue,
            config,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn store(&self) -> AuditStore<'_, DatabaseConnection> {
        audit_store(&self.db)
    }

    pub async fn record(&self, job_id: Uuid) -> JobRecord {
        self.store()
            .get(job_id)
            .await
            .expect("Failed to read audit record")
            .unwrap_or_else(|| panic!("No audit record for {job_id}"))
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    /// Submit a job through the multipart endpoint.
    pub async fn submit(&self, file_name: &str, bytes: &[u8], target: &str) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str("image/png")
            .expect("Failed to set MIME type");
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("target_identifier", target.to_string());

        self.submit_form(form).await
    }

    pub async fn submit_form(&self, form: reqwest::multipart::Form) -> TestResponse {
        let res = self
            .client
            .post(self.url(routes::JOBS))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart request");

        TestResponse::from_response(res).await
    }

    /// Submit a job and assert it was accepted.
    pub async fn submit_ok(&self, target: &str) -> Uuid {
        let res = self.submit("receipt.png", b"\x89PNG", target).await;
        assert_eq!(res.status, 202, "submit failed: {}", res.text);
        res.job_id()
    }

    pub async fn post_callback(
        &self,
        job_id: impl std::fmt::Display,
        body: &Value,
        token: Option<&str>,
    ) -> TestResponse {
        let mut req = self.client.post(self.url(&routes::callback(job_id))).json(body);
        if let Some(token) = token {
            req = req.header(::common::CALLBACK_TOKEN_HEADER, token);
        }

        let res = req.send().await.expect("Failed to send callback request");
        TestResponse::from_response(res).await
    }

    /// Take the job's item off the queue and mark it handed off, as a worker would.
    pub async fn dispatch(&self, job_id: Uuid) {
        let delivery = self
            .queue
            .dequeue(Duration::from_millis(100))
            .await
            .expect("Dequeue failed")
            .expect("Queue is empty");
        assert_eq!(delivery.handle.message_id, job_id.to_string());

        let outcome = self
            .store()
            .mark_dispatched(job_id)
            .await
            .expect("mark_dispatched failed");
        assert!(outcome.is_applied(), "job {job_id} was not queued");
        assert!(self.queue.ack(&delivery.handle).await.unwrap());
    }
}
