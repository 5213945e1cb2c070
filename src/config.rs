use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Runtime configuration, loaded once in `main` and passed explicitly to the
/// components that need it. Nothing reads configuration from ambient global
/// state; in particular the encryption key only travels into `TokenCipher`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    /// Hex-encoded 32-byte AES-256-GCM key for tokens at rest.
    pub encryption_key: String,
    pub loglevel: String,
    pub proxy: Option<Url>,
    pub connect_timeout_secs: u64,
    /// Per-request timeout for provider fetches; a timeout surfaces as
    /// ProviderUnavailable, never a hung caller.
    pub request_timeout_secs: u64,
    pub oauth: OauthConfig,
    pub endpoints: EndpointConfig,
    /// Client to sync when the binary runs a one-shot ingestion pass.
    pub sync_client_id: Option<String>,
    pub sync_lookback_days: u32,
}

/// OAuth application identity, shared across the provider token endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub google_token_url: String,
    pub behavioral_token_url: String,
}

/// Data-query API roots, overridable for staging environments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub web_analytics: String,
    pub search_console: String,
    pub business_listing: String,
    pub behavioral_analytics: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:clientpulse.sqlite".to_string(),
            encryption_key: String::new(),
            loglevel: "info".to_string(),
            proxy: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 15,
            oauth: OauthConfig {
                client_id: String::new(),
                client_secret: String::new(),
                google_token_url: "https://oauth2.googleapis.com/token".to_string(),
                behavioral_token_url: "https://www.clarity.ms/oauth/token".to_string(),
            },
            endpoints: EndpointConfig {
                web_analytics: "https://analyticsdata.googleapis.com/v1beta".to_string(),
                search_console: "https://searchconsole.googleapis.com/webmasters/v3".to_string(),
                business_listing: "https://businessprofileperformance.googleapis.com/v1"
                    .to_string(),
                behavioral_analytics: "https://www.clarity.ms/export-data/api/v1".to_string(),
            },
            sync_client_id: None,
            sync_lookback_days: 28,
        }
    }
}

impl Config {
    /// Defaults merged under `PULSE_`-prefixed environment variables, with
    /// `__` separating nested keys (e.g. `PULSE_OAUTH__CLIENT_ID`).
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("PULSE_").split("__"))
            .extract()
    }
}
