use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use drip_channels::{
    FileTemplateRenderer, InMemoryTemplates, ResendTransport, TemplateRenderer, Transport,
};
use drip_core::audit::{self, AuditEntry, AuditSink};
use drip_core::clock::{Clock, SystemClock};
use drip_core::config::AppConfig;
use drip_core::{DripResult, SequenceCatalog};
use drip_store::EngineStore;

use crate::token::UnsubscribeTokens;

/// Where outbound links point.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Base URL of this service; the unsubscribe page lives under it.
    pub public_url: String,
    /// Links starting with this prefix receive UTM parameters.
    pub link_domain: String,
    pub utm_source: String,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:8080".to_string(),
            link_domain: String::new(),
            utm_source: "drip".to_string(),
        }
    }
}

/// Core sequence engine. Cheap to clone; all collaborators are shared handles
/// owned by the surrounding application.
#[derive(Clone)]
pub struct SequenceEngine {
    pub(crate) store: Arc<dyn EngineStore>,
    pub(crate) catalog: Arc<SequenceCatalog>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) renderer: Arc<dyn TemplateRenderer>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) tokens: UnsubscribeTokens,
    pub(crate) links: LinkSettings,
    pub(crate) resume_delay: Duration,
    pub(crate) rng: Arc<Mutex<StdRng>>,
    /// Held for the duration of one batch pass.
    pub(crate) dispatch_lock: Arc<tokio::sync::Mutex<()>>,
    /// Serializes the duplicate check and insert of `enroll`.
    pub(crate) enroll_lock: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for SequenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceEngine")
            .field("sequences", &self.catalog.len())
            .field("transport", &self.transport.is_some())
            .field("links", &self.links)
            .finish()
    }
}

impl SequenceEngine {
    /// Creates an engine with no transport, no templates, and a wall clock.
    pub fn new(store: Arc<dyn EngineStore>, catalog: Arc<SequenceCatalog>) -> Self {
        Self {
            store,
            catalog,
            transport: None,
            renderer: Arc::new(InMemoryTemplates::new()),
            audit: audit::noop_audit(),
            clock: Arc::new(SystemClock),
            tokens: UnsubscribeTokens::default(),
            links: LinkSettings::default(),
            resume_delay: Duration::hours(1),
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
            dispatch_lock: Arc::new(tokio::sync::Mutex::new(())),
            enroll_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Wires every collaborator from configuration.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn EngineStore>,
        catalog: Arc<SequenceCatalog>,
    ) -> DripResult<Self> {
        let mut engine = Self::new(store, catalog)
            .with_renderer(Arc::new(FileTemplateRenderer::new(&config.templates.dir)))
            .with_audit(audit::tracing_audit())
            .with_tokens(UnsubscribeTokens::new(&config.unsubscribe.secret))
            .with_links(LinkSettings {
                public_url: config.unsubscribe.public_url.clone(),
                link_domain: config.tracking.link_domain.clone(),
                utm_source: config.tracking.utm_source.clone(),
            })
            .with_resume_delay(Duration::minutes(config.scheduler.resume_delay_mins));

        if config.email.transport_configured() {
            engine = engine.with_transport(Arc::new(ResendTransport::new(&config.email)?));
        } else {
            info!("No email transport configured, sends will be recorded without delivery");
        }

        info!(
            sequences = engine.catalog.len(),
            templates_dir = %config.templates.dir,
            "Sequence engine initialized"
        );
        Ok(engine)
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_tokens(mut self, tokens: UnsubscribeTokens) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_links(mut self, links: LinkSettings) -> Self {
        self.links = links;
        self
    }

    pub fn with_resume_delay(mut self, delay: Duration) -> Self {
        self.resume_delay = delay;
        self
    }

    /// Seeds variant selection so assignment is reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    pub fn catalog(&self) -> &SequenceCatalog {
        &self.catalog
    }

    pub fn tokens(&self) -> &UnsubscribeTokens {
        &self.tokens
    }

    pub fn store(&self) -> &Arc<dyn EngineStore> {
        &self.store
    }

    /// Writes an audit entry stamped with the engine clock.
    pub fn log_action(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: impl Into<String>,
        details: impl Into<String>,
    ) {
        let mut entry = AuditEntry::new(action, entity_type, entity_id, details);
        entry.at = self.clock.now();
        self.audit.log_action(entry);
    }
}
