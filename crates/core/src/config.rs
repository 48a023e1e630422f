use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `DRIP__` (sections separated by `__`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub unsubscribe: UnsubscribeConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub templates: TemplateConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Bearer token for operator endpoints. Empty disables the check.
    #[serde(default)]
    pub operator_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Delay applied to a resumed enrollment before its next send.
    #[serde(default = "default_resume_delay_mins")]
    pub resume_delay_mins: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Resend API key. Empty means no transport is configured.
    #[serde(default)]
    pub resend_api_key: String,
    #[serde(default = "default_resend_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_email_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeConfig {
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared bearer secret for inbound webhooks. Empty disables the check.
    #[serde(default)]
    pub secret: String,
    /// Requests per client address per minute across the webhook routes.
    #[serde(default = "default_webhook_rate_limit")]
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_templates_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Links starting with this prefix receive UTM parameters.
    #[serde(default = "default_link_domain")]
    pub link_domain: String,
    #[serde(default = "default_utm_source")]
    pub utm_source: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogConfig {
    /// Optional JSON catalog. When unset the built-in sequences are used.
    #[serde(default)]
    pub path: Option<String>,
}

// Default functions
fn default_node_id() -> String {
    "drip-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_scheduler_enabled() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    900
}
fn default_resume_delay_mins() -> i64 {
    60
}
fn default_resend_base_url() -> String {
    "https://api.resend.com".to_string()
}
fn default_from_email() -> String {
    "hello@example.com".to_string()
}
fn default_from_name() -> String {
    "Drip".to_string()
}
fn default_email_timeout_ms() -> u64 {
    10_000
}
fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_webhook_rate_limit() -> u32 {
    30
}
fn default_templates_dir() -> String {
    "templates/emails/sequences".to_string()
}
fn default_link_domain() -> String {
    "https://example.com".to_string()
}
fn default_utm_source() -> String {
    "drip".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            operator_token: String::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            interval_secs: default_interval_secs(),
            resume_delay_mins: default_resume_delay_mins(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            resend_api_key: String::new(),
            api_base_url: default_resend_base_url(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            timeout_ms: default_email_timeout_ms(),
        }
    }
}

impl Default for UnsubscribeConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            public_url: default_public_url(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            rate_limit_per_minute: default_webhook_rate_limit(),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: default_templates_dir(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            link_domain: default_link_domain(),
            utm_source: default_utm_source(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            scheduler: SchedulerConfig::default(),
            email: EmailConfig::default(),
            unsubscribe: UnsubscribeConfig::default(),
            webhooks: WebhookConfig::default(),
            templates: TemplateConfig::default(),
            tracking: TrackingConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl EmailConfig {
    /// A transport is only built when an API key is present.
    pub fn transport_configured(&self) -> bool {
        !self.resend_api_key.trim().is_empty()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("DRIP")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
