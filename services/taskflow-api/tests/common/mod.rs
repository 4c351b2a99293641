//! Common test utilities for taskflow-api router tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use taskflow_api::ai::{AiError, Subtask, TaskDecomposer};
use taskflow_api::config::Config;
use taskflow_api::{build_router, AppState};
use taskflow_axum::{SessionClaims, SESSION_AUDIENCE};
use taskflow_billing_core::SandboxProvider;
use taskflow_db::memory::MemoryStore;
use taskflow_db::{Repositories, SubscriptionRow, UsageRow};
use taskflow_types::{period_bounds, ResourceType, Tier, UserId};

pub const JWT_SECRET: &str = "taskflow-api-test-secret-32-byte";
pub const WEBHOOK_SECRET: &str = "whsec_sandbox_test";

/// Decomposer that counts calls and either answers or fails
pub struct StubDecomposer {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl StubDecomposer {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskDecomposer for StubDecomposer {
    async fn decompose(
        &self,
        title: &str,
        _description: Option<&str>,
    ) -> Result<Vec<Subtask>, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AiError::Status(502));
        }
        Ok(vec![Subtask {
            title: format!("First step of {title}"),
            description: String::new(),
            estimated_minutes: Some(10),
        }])
    }
}

/// Router over a seeded in-memory store with the sandbox provider
pub struct TestApp {
    pub store: MemoryStore,
    pub repos: Repositories,
    pub sandbox: SandboxProvider,
    pub decomposer: Arc<StubDecomposer>,
    pub router: Router,
}

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "memory://"),
        ("SUPABASE_JWT_SECRET", JWT_SECRET),
        ("PAYMENT_PROVIDER", "sandbox"),
        ("SANDBOX_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("METRICS_ENABLED", "false"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_sandbox(SandboxProvider::new(), false)
    }

    pub fn with_sandbox(sandbox: SandboxProvider, ai_fails: bool) -> Self {
        let store = MemoryStore::seeded();
        let repos = Repositories::memory(store.clone());
        let decomposer = StubDecomposer::new(ai_fails);
        let state = AppState::with_provider(
            test_config(),
            repos.clone(),
            None,
            Arc::new(sandbox.clone()),
        )
        .with_decomposer(decomposer.clone());

        Self {
            store,
            repos,
            sandbox,
            decomposer,
            router: build_router(state, None),
        }
    }

    /// Send a request and return the status and JSON body (`Null` if empty)
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(header::AUTHORIZATION, bearer(user));
        }
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(request.body(body).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// Give `user` an active subscription on `tier`
    pub fn subscribe(&self, user: UserId, tier: Tier) {
        let now = Utc::now();
        self.store.insert_subscription(SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: user.0,
            tier: tier.as_str().into(),
            status: "active".into(),
            billing_cycle: "monthly".into(),
            provider: None,
            provider_subscription_id: None,
            current_period_start: now,
            current_period_end: now + Duration::days(30),
            canceled_at: None,
            created_at: now,
            updated_at: now,
        });
    }

    pub fn set_tasks_used(&self, user: UserId, tasks_used: i64) {
        let (period_start, reset_date) = period_bounds(Utc::now());
        self.store.insert_usage(UsageRow {
            user_id: user.0,
            period_start,
            reset_date,
            tasks_used,
            ai_requests_used: 0,
            notes_used: 0,
            meeting_summaries_used: 0,
            storage_used_mb: 0.0,
        });
    }

    /// Current counter for one resource, zero if no usage row exists
    pub async fn used(&self, user: UserId, resource: ResourceType) -> f64 {
        let (period_start, _) = period_bounds(Utc::now());
        self.repos
            .usage
            .get(user.0, period_start)
            .await
            .unwrap()
            .map(|row| match resource {
                ResourceType::Tasks => row.tasks_used as f64,
                ResourceType::AiRequests => row.ai_requests_used as f64,
                ResourceType::Notes => row.notes_used as f64,
                ResourceType::MeetingSummaries => row.meeting_summaries_used as f64,
                ResourceType::Storage => row.storage_used_mb,
            })
            .unwrap_or(0.0)
    }
}

/// Signed session token header value for `user`
pub fn bearer(user: UserId) -> String {
    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: user.to_string(),
        aud: SESSION_AUDIENCE.to_string(),
        exp: now + 3600,
        iat: Some(now),
        email: Some("user@example.com".into()),
        role: Some("authenticated".into()),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}
