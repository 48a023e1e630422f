//! Router fixtures for handler tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use drip_channels::transport::RecordingTransport;
use drip_channels::InMemoryTemplates;
use drip_core::audit::{capture_audit, CaptureAuditSink};
use drip_core::catalog::{SequenceDefinition, Step, Variant};
use drip_core::config::AppConfig;
use drip_core::types::{Enrollment, SourceData};
use drip_core::SequenceCatalog;
use drip_engine::{SequenceEngine, UnsubscribeTokens};
use drip_store::MemoryStore;

use crate::rest::AppState;
use crate::server::router;

fn sequence(id: &str, trigger: &str, template: &str) -> SequenceDefinition {
    SequenceDefinition {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        trigger: trigger.to_string(),
        active: true,
        variants: [(
            "A".to_string(),
            Variant {
                key: "A".to_string(),
                name: "A".to_string(),
                weight: 1.0,
                steps: vec![Step::new(0, template, "Hello"), Step::new(3, template, "Again")],
            },
        )]
        .into_iter()
        .collect(),
    }
}

pub(crate) struct TestApp {
    pub state: AppState,
    pub store: MemoryStore,
    pub audit: Arc<CaptureAuditSink>,
}

impl TestApp {
    pub const OPERATOR_AUTH: &'static str = "Bearer op-token";
    pub const WEBHOOK_AUTH: &'static str = "Bearer hook-secret";

    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.api.operator_token = "op-token".to_string();
        config.webhooks.secret = "hook-secret".to_string();
        config.unsubscribe.secret = "unsub-secret".to_string();

        let store = MemoryStore::new();
        let audit = capture_audit();
        let catalog = SequenceCatalog::new(vec![
            sequence("welcome_v1", "new_subscriber", "welcome"),
            sequence("quiz_v1", "quiz_completed", "welcome"),
        ])
        .expect("fixture catalog is valid");
        let engine = SequenceEngine::new(Arc::new(store.clone()), Arc::new(catalog))
            .with_renderer(Arc::new(
                InMemoryTemplates::new().with_template("welcome", "<html><body>Hi</body></html>"),
            ))
            .with_transport(Arc::new(RecordingTransport::new()))
            .with_tokens(UnsubscribeTokens::new(&config.unsubscribe.secret))
            .with_audit(audit.clone())
            .with_rng_seed(5);

        Self {
            state: AppState::new(engine, &config),
            store,
            audit,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn enroll(&self, email: &str, sequence_id: &str) -> Enrollment {
        self.state
            .engine
            .enroll(email, "", sequence_id, "test", SourceData::new())
            .await
            .unwrap()
            .expect("enrollment created")
    }
}

pub(crate) fn empty_request(method: &str, uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

pub(crate) fn json_request(
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub(crate) async fn body_text(res: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub(crate) async fn body_json(res: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(res).await).unwrap()
}
