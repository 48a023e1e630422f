//! Shared fixtures for the engine's unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use chrono::{DateTime, Duration, TimeZone, Utc};
use drip_channels::transport::RecordingTransport;
use drip_channels::{OutboundMessage, Transport, TransportError};
use drip_channels::InMemoryTemplates;
use drip_core::audit::{self, CaptureAuditSink};
use drip_core::catalog::{SequenceDefinition, Step, Variant};
use drip_core::clock::{Clock, ManualClock};
use drip_core::types::SourceData;
use drip_core::SequenceCatalog;
use drip_store::{EngineStore, MemoryStore};

use crate::engine::{LinkSettings, SequenceEngine};
use crate::token::UnsubscribeTokens;

pub(crate) const PUBLIC_URL: &str = "https://mc.example.com";
pub(crate) const SECRET: &str = "test-secret";

fn variant(key: &str, weight: f64, steps: Vec<Step>) -> (String, Variant) {
    (
        key.to_string(),
        Variant {
            key: key.to_string(),
            name: format!("Variant {key}"),
            weight,
            steps,
        },
    )
}

fn sequence(
    id: &str,
    trigger: &str,
    active: bool,
    variants: Vec<(String, Variant)>,
) -> SequenceDefinition {
    SequenceDefinition {
        id: id.to_string(),
        name: id.replace('_', " "),
        description: String::new(),
        trigger: trigger.to_string(),
        active,
        variants: variants.into_iter().collect::<BTreeMap<_, _>>(),
    }
}

pub(crate) fn catalog() -> SequenceCatalog {
    let drip_steps = |prefix: &str| {
        vec![
            Step::new(0, &format!("{prefix}_1"), "Welcome to {race_name}"),
            Step::new(2, &format!("{prefix}_2"), "Training for {race_name}"),
            Step::new(5, &format!("{prefix}_3"), "Final call, {unknown}"),
        ]
    };
    let defs = vec![
        sequence(
            "drip_v1",
            "new_subscriber",
            true,
            vec![variant("A", 50.0, drip_steps("a")), variant("B", 50.0, drip_steps("b"))],
        ),
        sequence(
            "solo_v1",
            "quiz_completed",
            true,
            vec![
                variant(
                    "A",
                    100.0,
                    vec![
                        Step::new(0, "a_1", "One"),
                        Step::new(0, "a_2", "Two"),
                        Step::new(4, "a_3", "Three"),
                    ],
                ),
                variant("B", 0.0, vec![Step::new(0, "b_1", "Never")]),
            ],
        ),
        sequence(
            "delayed_v1",
            "delayed",
            true,
            vec![variant("A", 1.0, vec![Step::new(2, "a_1", "Later")])],
        ),
        sequence(
            "other_v1",
            "prep_kit_download",
            true,
            vec![variant("A", 1.0, vec![Step::new(0, "a_1", "Kit"), Step::new(3, "a_2", "Kit 2")])],
        ),
        sequence(
            "inactive_v1",
            "new_subscriber",
            false,
            vec![variant("A", 1.0, vec![Step::new(0, "a_1", "Off")])],
        ),
    ];
    SequenceCatalog::new(defs).expect("fixture catalog is valid")
}

pub(crate) fn templates() -> InMemoryTemplates {
    let templates = InMemoryTemplates::new();
    for prefix in ["a", "b"] {
        for n in 1..=3 {
            templates.insert(
                &format!("{prefix}_{n}"),
                &format!(
                    "<html><body><p>Hi {{first_name}}, {{race_name}} step {n}</p>\
                     <a href=\"https://site.example.com/races\">Races</a></body></html>"
                ),
            );
        }
    }
    templates
}

pub(crate) fn data() -> SourceData {
    SourceData::from([("race_name".to_string(), serde_json::json!("Unbound 200"))])
}

pub(crate) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub(crate) struct Harness {
    pub engine: SequenceEngine,
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<RecordingTransport>,
    pub audit: Arc<CaptureAuditSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(true)
    }

    pub fn without_transport() -> Self {
        Self::build(false)
    }

    fn build(with_transport: bool) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(start()));
        let transport = Arc::new(RecordingTransport::new());
        let audit = audit::capture_audit();

        let mut engine = SequenceEngine::new(Arc::new(store.clone()), Arc::new(catalog()))
            .with_renderer(Arc::new(templates()))
            .with_audit(audit.clone())
            .with_clock(clock.clone())
            .with_tokens(UnsubscribeTokens::new(SECRET))
            .with_links(LinkSettings {
                public_url: PUBLIC_URL.to_string(),
                link_domain: "https://site.example.com".to_string(),
                utm_source: "drip".to_string(),
            })
            .with_rng_seed(11);
        if with_transport {
            engine = engine.with_transport(transport.clone());
        }

        Self {
            engine,
            store,
            clock,
            transport,
            audit,
        }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

/// A change a concurrent request makes to the recipient while a message is in flight.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Interruption {
    Unsubscribe,
    Pause,
}

/// Applies an [`Interruption`] through the engine, then delivers like
/// [`RecordingTransport`].
pub(crate) struct InterruptingTransport {
    pub engine: OnceLock<SequenceEngine>,
    interruption: Interruption,
    inner: RecordingTransport,
}

impl InterruptingTransport {
    pub fn new(interruption: Interruption) -> Arc<Self> {
        Arc::new(Self {
            engine: OnceLock::new(),
            interruption,
            inner: RecordingTransport::new(),
        })
    }

    /// Installs the transport on a clone of `engine` and returns that clone.
    pub fn attach(self: &Arc<Self>, engine: &SequenceEngine) -> SequenceEngine {
        let engine = engine.clone().with_transport(self.clone());
        let _ = self.engine.set(engine.clone());
        engine
    }
}

#[async_trait]
impl Transport for InterruptingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<String, TransportError> {
        let engine = self.engine.get().expect("transport attached");
        match self.interruption {
            Interruption::Unsubscribe => {
                engine.unsubscribe(&message.to).await.expect("unsubscribe");
            }
            Interruption::Pause => {
                let enrollments = engine
                    .store()
                    .list_enrollments_by_email(&message.to)
                    .await
                    .expect("lookup");
                for enrollment in enrollments {
                    engine.pause_enrollment(enrollment.id).await.expect("pause");
                }
            }
        }
        self.inner.send(message).await
    }
}
