use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::db::Storage;
use crate::error::PulseError;
use crate::metrics::{AggregateWindow, aggregate, normalize, score};
use crate::oauth::{OauthExchanger, RefreshCoordinator, TokenExchanger, TokenGrant};
use crate::provider::Provider;
use crate::providers::{
    BehavioralAdapter, BusinessListingAdapter, ProviderAdapter, SearchConsoleAdapter,
    WebAnalyticsAdapter, build_http_client,
};
use crate::types::{DateRange, Dimension};
use crate::vault::{CredentialStatus, CredentialVault};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one end-to-end fetch/normalize/score/persist run.
#[derive(Debug, Serialize)]
pub struct StoreOutcome {
    pub records_stored: usize,
    /// Row-level persistence failures, reported verbatim so the caller can
    /// re-submit just the failed subset.
    pub failures: Vec<(usize, String)>,
}

/// The integration engine's public surface: credential lifecycle plus the
/// fetch → normalize → score → persist → aggregate pipeline.
pub struct Engine {
    storage: Storage,
    vault: CredentialVault,
    refresh: RefreshCoordinator,
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl Engine {
    /// Wire the production components from configuration.
    pub fn new(cfg: &Config, storage: Storage) -> Result<Self, PulseError> {
        let cipher = TokenCipher::new(&cfg.encryption_key)?;
        let vault = CredentialVault::new(storage.clone(), cipher);
        let http = build_http_client(cfg)?;
        let exchanger: Arc<dyn TokenExchanger> =
            Arc::new(OauthExchanger::new(http.clone(), cfg.oauth.clone()));
        let refresh = RefreshCoordinator::new(vault.clone(), exchanger);

        let mut adapters: HashMap<Provider, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(
            Provider::WebAnalytics,
            Arc::new(WebAnalyticsAdapter::new(
                http.clone(),
                cfg.endpoints.web_analytics.clone(),
            )),
        );
        adapters.insert(
            Provider::SearchConsole,
            Arc::new(SearchConsoleAdapter::new(
                http.clone(),
                cfg.endpoints.search_console.clone(),
            )),
        );
        adapters.insert(
            Provider::BusinessListing,
            Arc::new(BusinessListingAdapter::new(
                http.clone(),
                cfg.endpoints.business_listing.clone(),
            )),
        );
        adapters.insert(
            Provider::BehavioralAnalytics,
            Arc::new(BehavioralAdapter::new(
                http,
                cfg.endpoints.behavioral_analytics.clone(),
            )),
        );

        Ok(Self {
            storage,
            vault,
            refresh,
            adapters,
        })
    }

    /// Assemble an engine from pre-built components. Tests use this to
    /// substitute fake adapters and exchangers.
    pub fn with_components(
        storage: Storage,
        vault: CredentialVault,
        refresh: RefreshCoordinator,
        adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
    ) -> Self {
        Self {
            storage,
            vault,
            refresh,
            adapters,
        }
    }

    /// Persist the token grant from a client's first OAuth authorization.
    pub async fn connect_provider(
        &self,
        client_id: &str,
        provider: Provider,
        grant: TokenGrant,
    ) -> Result<(), PulseError> {
        self.refresh
            .store_authorization(client_id, provider, grant)
            .await?;
        info!(client_id, provider = %provider, "provider connected");
        Ok(())
    }

    /// End-to-end ingestion for one provider and date range.
    pub async fn fetch_and_store(
        &self,
        client_id: &str,
        provider: Provider,
        range: DateRange,
        dimensions: Option<&[Dimension]>,
    ) -> Result<StoreOutcome, PulseError> {
        let token = self.refresh.ensure_valid(client_id, provider).await?;
        let adapter = self.adapter(provider)?;
        let raw = adapter.fetch(&token, range, dimensions).await?;
        info!(
            client_id,
            provider = %provider,
            rows = raw.len(),
            "fetched provider rows"
        );

        let mut records = normalize(client_id, raw);
        for record in &mut records {
            record.calculated_score = score(provider, &record.fields);
        }

        let report = self
            .storage
            .persist(&records, provider.profile().write_policy)
            .await;
        if !report.failed.is_empty() {
            warn!(
                client_id,
                provider = %provider,
                failed = report.failed.len(),
                "batch persist had row failures"
            );
        }
        Ok(StoreOutcome {
            records_stored: report.stored,
            failures: report
                .failed
                .into_iter()
                .map(|(idx, e)| (idx, e.to_string()))
                .collect(),
        })
    }

    /// Read-and-reduce over already-persisted records.
    pub async fn get_aggregated(
        &self,
        client_id: &str,
        provider: Provider,
        range: DateRange,
    ) -> Result<AggregateWindow, PulseError> {
        let records = self
            .storage
            .records_in_range(client_id, provider, range)
            .await?;
        Ok(aggregate(provider, &records))
    }

    pub async fn credential_status(
        &self,
        client_id: &str,
        provider: Provider,
    ) -> Result<CredentialStatus, PulseError> {
        self.vault.status(client_id, provider).await
    }

    /// Run `fetch_and_store` for all four providers concurrently. Providers
    /// touch disjoint credential rows and disjoint records, so one failing
    /// provider never aborts the others.
    pub async fn sync_all(
        &self,
        client_id: &str,
        range: DateRange,
    ) -> Vec<(Provider, Result<StoreOutcome, PulseError>)> {
        let tasks = Provider::ALL.map(|provider| async move {
            (
                provider,
                self.fetch_and_store(client_id, provider, range, None).await,
            )
        });
        futures::future::join_all(tasks).await
    }

    fn adapter(&self, provider: Provider) -> Result<Arc<dyn ProviderAdapter>, PulseError> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| PulseError::Validation(format!("no adapter wired for {provider}")))
    }
}
