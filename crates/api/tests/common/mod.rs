#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use futures::stream::{self, StreamExt};
use http_body_util::BodyExt;
use muse_api::auth::jwt::JwtConfig;
use muse_api::auth::password::hash_password;
use muse_api::config::{CreditConfig, ServerConfig};
use muse_api::router::build_app_router;
use muse_api::state::{AppState, PaymentProviders};
use muse_billing::{
    BillingError, BillingEvent, BillingEventKind, CheckoutRequest, CheckoutSession,
    PaymentProvider,
};
use muse_core::billing::PaymentProviderKind;
use muse_core::prompt::ChatTurn;
use muse_core::types::DbId;
use muse_db::models::user::{CreateUser, User};
use muse_db::repositories::{CreditRepo, RoleRepo, UserRepo};
use muse_events::{AccountMail, EmailError, EventBus, Mailer};
use muse_providers::{
    GpuBackend, GpuInput, GpuJob, GpuTask, LlmBackend, MediaStorage, ProviderError,
    SpeechBackend, TokenStream,
};
use sqlx::PgPool;
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "test_password_123!";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
/// Header the fake payment provider checks instead of a real signature.
pub const FAKE_SIGNATURE_HEADER: &str = "x-test-signature";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// A `ServerConfig` with test secrets and the default credit table.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        public_base_url: "http://api.test".to_string(),
        app_base_url: "http://app.test".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        signup_bonus_nuts: 10,
        chat_context_messages: 20,
        job_timeout_mins: 30,
        jwt: JwtConfig {
            secret: "test-jwt-secret-that-is-long-enough".to_string(),
            access_token_expiry_mins: 15,
            refresh_token_expiry_days: 7,
        },
        credits: CreditConfig::default(),
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Records submissions and answers with `IN_QUEUE` job ids `job-1`, `job-2`...
#[derive(Default)]
pub struct FakeGpu {
    pub submissions: Mutex<Vec<(GpuInput, String)>>,
    next_id: AtomicU64,
    pub fail_submit: AtomicBool,
}

#[async_trait]
impl GpuBackend for FakeGpu {
    async fn submit(&self, input: &GpuInput, webhook_url: &str) -> Result<GpuJob, ProviderError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 500,
                body: "worker pool exhausted".into(),
            });
        }
        self.submissions
            .lock()
            .unwrap()
            .push((input.clone(), webhook_url.to_string()));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GpuJob {
            id: format!("job-{n}"),
            status: "IN_QUEUE".into(),
            ..Default::default()
        })
    }

    async fn status(&self, _task: GpuTask, job_id: &str) -> Result<GpuJob, ProviderError> {
        Ok(GpuJob {
            id: job_id.to_string(),
            status: "IN_PROGRESS".into(),
            ..Default::default()
        })
    }
}

impl FakeGpu {
    /// Webhook URL of the most recent submission.
    pub fn last_webhook_url(&self) -> String {
        self.submissions
            .lock()
            .unwrap()
            .last()
            .map(|(_, url)| url.clone())
            .expect("no GPU submission recorded")
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

/// Replies with a fixed text, streamed word by word.
pub struct FakeLlm {
    pub reply: Mutex<String>,
    pub fail: AtomicBool,
    /// Streamed replies break off with an error after their first token.
    pub cut_stream: AtomicBool,
    pub prompts: Mutex<Vec<Vec<ChatTurn>>>,
}

impl Default for FakeLlm {
    fn default() -> Self {
        Self {
            reply: Mutex::new("Hello there, traveler.".into()),
            fail: AtomicBool::new(false),
            cut_stream: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl FakeLlm {
    fn check(&self, messages: &[ChatTurn]) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 503,
                body: "model overloaded".into(),
            });
        }
        Ok(self.reply.lock().unwrap().clone())
    }
}

#[async_trait]
impl LlmBackend for FakeLlm {
    async fn chat(&self, messages: &[ChatTurn]) -> Result<String, ProviderError> {
        self.check(messages)
    }

    async fn chat_stream(&self, messages: &[ChatTurn]) -> Result<TokenStream, ProviderError> {
        let reply = self.check(messages)?;
        let mut tokens: Vec<Result<String, ProviderError>> = reply
            .split_inclusive(' ')
            .map(|t| Ok(t.to_string()))
            .collect();
        if self.cut_stream.load(Ordering::SeqCst) {
            tokens.truncate(1);
            tokens.push(Err(ProviderError::InvalidResponse("connection reset".into())));
        }
        Ok(stream::iter(tokens).boxed())
    }
}

#[derive(Default)]
pub struct FakeSpeech {
    pub calls: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait]
impl SpeechBackend for FakeSpeech {
    async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), voice_id.map(str::to_string)));
        Ok(b"ID3-fake-mp3".to_vec())
    }
}

/// In-memory CDN serving from `https://cdn.test/`.
#[derive(Default)]
pub struct FakeStorage {
    pub uploads: Mutex<Vec<(String, Vec<u8>, String)>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaStorage for FakeStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ProviderError> {
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_string(), bytes, content_type.to_string()));
        Ok(format!("https://cdn.test/{path}"))
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<(String, AccountMail)>>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, to_email: &str, mail: &AccountMail) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to_email.to_string(), mail.clone()));
        Ok(())
    }
}

impl CapturingMailer {
    /// The `token` query parameter of the last mail sent to `to_email`.
    pub fn last_token_for(&self, to_email: &str) -> String {
        let sent = self.sent.lock().unwrap();
        let (_, mail) = sent
            .iter()
            .rev()
            .find(|(to, _)| to == to_email)
            .expect("no mail sent to address");
        mail.link()
            .split("token=")
            .nth(1)
            .expect("link has no token")
            .to_string()
    }
}

/// Stand-in for Stripe.
///
/// Webhook bodies are JSON of the form
/// `{"id", "type", "kind", "user_id", "plan_id", "subscription_id"}` and are
/// accepted when [`FAKE_SIGNATURE_HEADER`] is `ok`.
#[derive(Default)]
pub struct FakePayments {
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    pub cancellations: Mutex<Vec<(String, bool)>>,
}

#[async_trait]
impl PaymentProvider for FakePayments {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Stripe
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        self.checkouts.lock().unwrap().push(request.clone());
        let session_id = format!("cs_{}_{}", request.user_id, request.plan_id);
        Ok(CheckoutSession {
            provider: "stripe".into(),
            checkout_url: format!("https://pay.test/{session_id}"),
            session_id,
        })
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), BillingError> {
        self.cancellations
            .lock()
            .unwrap()
            .push((provider_subscription_id.to_string(), at_period_end));
        Ok(())
    }

    async fn verify_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<BillingEvent, BillingError> {
        let signed = headers
            .get(FAKE_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            == Some("ok");
        if !signed {
            return Err(BillingError::InvalidSignature);
        }

        let json: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        let subscription_id = json["subscription_id"].as_str().unwrap_or_default().to_string();
        let kind = match json["kind"].as_str() {
            Some("activated") => BillingEventKind::SubscriptionActivated {
                user_id: json["user_id"].as_i64().unwrap_or_default(),
                plan_id: json["plan_id"].as_i64().unwrap_or_default(),
                provider_subscription_id: subscription_id,
            },
            Some("renewed") => BillingEventKind::SubscriptionRenewed {
                provider_subscription_id: subscription_id,
                period_start: None,
                period_end: None,
            },
            Some("payment_failed") => BillingEventKind::PaymentFailed {
                provider_subscription_id: subscription_id,
            },
            Some("canceled") => BillingEventKind::SubscriptionCanceled {
                provider_subscription_id: subscription_id,
                at_period_end: true,
            },
            Some("ended") => BillingEventKind::SubscriptionEnded {
                provider_subscription_id: subscription_id,
            },
            _ => BillingEventKind::Ignored,
        };

        Ok(BillingEvent {
            provider: PaymentProviderKind::Stripe,
            event_id: json["id"].as_str().unwrap_or_default().to_string(),
            event_type: json["type"].as_str().unwrap_or("test.event").to_string(),
            kind,
        })
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// The application plus handles on every fake it talks to.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub pool: PgPool,
    pub gpu: Arc<FakeGpu>,
    pub llm: Arc<FakeLlm>,
    pub speech: Arc<FakeSpeech>,
    pub storage: Arc<FakeStorage>,
    pub mailer: Arc<CapturingMailer>,
    pub payments: Arc<FakePayments>,
}

impl TestApp {
    /// A fresh handle on the router; `oneshot` consumes it.
    pub fn router(&self) -> Router {
        self.app.clone()
    }
}

/// Build the full application with fake providers and the production
/// middleware stack.
pub fn spawn_app(pool: PgPool) -> TestApp {
    let config = test_config();
    let gpu = Arc::new(FakeGpu::default());
    let llm = Arc::new(FakeLlm::default());
    let speech = Arc::new(FakeSpeech::default());
    let storage = Arc::new(FakeStorage::default());
    let mailer = Arc::new(CapturingMailer::default());
    let payments = Arc::new(FakePayments::default());

    let mut providers = PaymentProviders::new();
    providers.register(payments.clone());

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        event_bus: Arc::new(EventBus::default()),
        http: reqwest::Client::new(),
        gpu: gpu.clone(),
        llm: llm.clone(),
        speech: speech.clone(),
        storage: storage.clone(),
        mailer: mailer.clone(),
        payments: Arc::new(providers),
    };

    TestApp {
        app: build_app_router(state.clone(), &config),
        state,
        pool,
        gpu,
        llm,
        speech,
        storage,
        mailer,
        payments,
    }
}

pub fn build_test_app(pool: PgPool) -> Router {
    spawn_app(pool).app
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, None, Some(body)).await
}

pub async fn post_json_auth(app: Router, uri: &str, body: serde_json::Value, token: &str) -> Response {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put_json_auth(app: Router, uri: &str, body: serde_json::Value, token: &str) -> Response {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn patch_json_auth(app: Router, uri: &str, body: serde_json::Value, token: &str) -> Response {
    send(app, Method::PATCH, uri, Some(token), Some(body)).await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response {
    send(app, Method::DELETE, uri, Some(token), None).await
}

/// POST a raw body with extra headers (payment webhooks).
pub async fn post_raw(app: Router, uri: &str, headers: &[(&str, &str)], body: String) -> Response {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    app.oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Assert the status, then return the JSON body.
pub async fn expect_json(response: Response, status: StatusCode) -> serde_json::Value {
    let actual = response.status();
    let json = body_json(response).await;
    assert_eq!(actual, status, "unexpected status, body: {json}");
    json
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Insert an active user with [`TEST_PASSWORD`] and the named role.
pub async fn create_user(pool: &PgPool, username: &str, role: &str) -> User {
    let role_id = RoleRepo::id_for(pool, role)
        .await
        .unwrap()
        .expect("seeded role");
    UserRepo::create(
        pool,
        &CreateUser {
            username: username.to_string(),
            email: format!("{username}@test.com"),
            password_hash: hash_password(TEST_PASSWORD).unwrap(),
            role_id,
        },
    )
    .await
    .unwrap()
}

pub async fn grant_nuts(pool: &PgPool, user_id: DbId, amount: i64) -> i64 {
    CreditRepo::grant(pool, user_id, amount, "test_grant", None)
        .await
        .unwrap()
}

pub async fn nuts_of(pool: &PgPool, user_id: DbId) -> i64 {
    UserRepo::find_by_id(pool, user_id)
        .await
        .unwrap()
        .expect("user exists")
        .nuts
}

/// Log in through the API and return the access token.
pub async fn login(app: Router, username: &str) -> String {
    let body = serde_json::json!({ "login": username, "password": TEST_PASSWORD });
    let json = expect_json(post_json(app, "/api/v1/auth/login", body).await, StatusCode::OK).await;
    json["access_token"].as_str().unwrap().to_string()
}

/// Create a user with the given role and return it with an access token.
pub async fn user_with_token(test: &TestApp, username: &str, role: &str) -> (User, String) {
    let user = create_user(&test.pool, username, role).await;
    let token = login(test.router(), username).await;
    (user, token)
}
