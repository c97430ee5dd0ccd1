use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_FIRE_QUEUE: usize = 256;
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Top-level config (stagger.toml + STAGGER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaggerConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Browser origins allowed to call the API (the web form runs on Vite's dev port).
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// OpenAI-compatible chat completions endpoint used to write email bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Falls back to the OPENAI_API_KEY env var when unset.
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on one generation request. Job creation waits on it.
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generator_timeout_secs(),
        }
    }
}

/// Outbound mail relay.
///
/// Without a `relay_url` the gateway runs in dry-run mode: every send is
/// logged and reported as delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    /// Bearer token for the relay.
    pub api_key: Option<String>,
    /// Relays usually insist the From address matches the authenticated
    /// account. When set, this address replaces the requested one and only the
    /// display name is kept.
    pub sender_override: Option<String>,
    #[serde(default = "default_mail_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            api_key: None,
            sender_override: None,
            timeout_secs: default_mail_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Capacity of the trigger fire queue. Fires beyond this are dropped
    /// (and logged); the job picks up again on its next fire.
    #[serde(default = "default_fire_queue")]
    pub fire_queue: usize,
    /// Zone cron expressions are read in: `UTC`, `local` (the host's zone),
    /// a fixed offset such as `+02:00`, or an IANA name like `Europe/Paris`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fire_queue: default_fire_queue(),
            timezone: default_timezone(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_generator_timeout_secs() -> u64 {
    60
}
fn default_mail_timeout_secs() -> u64 {
    30
}
fn default_fire_queue() -> usize {
    DEFAULT_FIRE_QUEUE
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl StaggerConfig {
    /// Load config from a TOML file with STAGGER_* env var overrides.
    ///
    /// Nested keys use a double underscore: `STAGGER_MAIL__RELAY_URL`.
    /// A missing file is not an error; defaults fill every gap.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::StaggerError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("STAGGER_").split("__"))
    }

    /// API key for the generator: config first, then OPENAI_API_KEY.
    pub fn generator_api_key(&self) -> Option<String> {
        self.generator
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.stagger/stagger.toml", home)
}
