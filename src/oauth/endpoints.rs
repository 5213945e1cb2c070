use crate::config::OauthConfig;
use crate::error::{IsRetryable, PulseError};
use crate::provider::Provider;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use oauth2::{
    Client as OAuth2Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RefreshToken,
    StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenResponse,
    },
};
use std::time::Duration;
use tracing::{info, warn};

/// Result of a token endpoint exchange. `refresh_token` is present on the
/// initial code exchange and on providers that rotate refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Duration,
}

/// Seam between the refresh coordinator and the provider token endpoints;
/// tests substitute a counting fake.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn refresh(
        &self,
        provider: Provider,
        refresh_token: &str,
    ) -> Result<TokenGrant, PulseError>;
}

type RefreshClient = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Real exchanger built on the `oauth2` crate against each provider's token
/// endpoint. The three Google-backed providers share one endpoint; the
/// behavioral provider has its own.
pub struct OauthExchanger {
    http: reqwest::Client,
    cfg: OauthConfig,
}

impl OauthExchanger {
    pub fn new(http: reqwest::Client, cfg: OauthConfig) -> Self {
        Self { http, cfg }
    }

    fn token_url(&self, provider: Provider) -> &str {
        match provider {
            Provider::BehavioralAnalytics => &self.cfg.behavioral_token_url,
            _ => &self.cfg.google_token_url,
        }
    }

    fn build_client(&self, provider: Provider) -> Result<RefreshClient, PulseError> {
        let client = OAuth2Client::new(ClientId::new(self.cfg.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.cfg.client_secret.clone()))
            .set_token_uri(TokenUrl::new(self.token_url(provider).to_string())?);
        Ok(client)
    }
}

#[async_trait]
impl TokenExchanger for OauthExchanger {
    async fn refresh(
        &self,
        provider: Provider,
        refresh_token: &str,
    ) -> Result<TokenGrant, PulseError> {
        let client = self.build_client(provider)?;
        let retry_policy = default_retry_policy();

        let token_result: BasicTokenResponse = (|| async {
            client
                .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
                .request_async(&self.http)
                .await
                .map_err(PulseError::from)
        })
        .retry(retry_policy)
        .when(|e: &PulseError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(provider = %provider, error = %err, "token refresh retrying after {:?}", dur);
        })
        .await?;

        info!(provider = %provider, "access token refreshed");
        Ok(TokenGrant {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
            expires_in: token_result
                .expires_in()
                .unwrap_or(Duration::from_secs(3600)),
        })
    }
}
