use crate::error::PulseError;
use crate::oauth::endpoints::{TokenExchanger, TokenGrant};
use crate::provider::Provider;
use crate::vault::{CredentialVault, TokenSet};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tokens within this margin of expiry are refreshed ahead of use, so a
/// fetch never starts with a token about to die mid-request.
const REFRESH_MARGIN_MINS: i64 = 5;

/// Drives refresh-before-expiry against the provider token endpoints.
///
/// Refresh is the only contended resource in the engine: two concurrent
/// callers observing the same expiring token must not both exchange and both
/// write. Each (client, provider) pair gets its own async mutex; after
/// acquiring it the coordinator re-reads the vault and skips the exchange if
/// another caller already won, so the stored token is effectively
/// compare-and-swapped.
pub struct RefreshCoordinator {
    vault: CredentialVault,
    exchanger: Arc<dyn TokenExchanger>,
    locks: Mutex<HashMap<(String, Provider), Arc<Mutex<()>>>>,
}

impl RefreshCoordinator {
    pub fn new(vault: CredentialVault, exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self {
            vault,
            exchanger,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a usable access token for (client, provider), refreshing it
    /// first when it is inside the expiry margin.
    pub async fn ensure_valid(
        &self,
        client_id: &str,
        provider: Provider,
    ) -> Result<String, PulseError> {
        let tokens = self.vault.retrieve(client_id, provider).await?;
        if is_fresh(&tokens, Utc::now()) {
            return Ok(tokens.access_token);
        }

        let key_lock = self.key_lock(client_id, provider).await;
        let result = {
            let _guard = key_lock.lock().await;
            self.refresh_under_lock(client_id, provider).await
        };
        self.release_key_lock(client_id, provider, &key_lock).await;
        result
    }

    async fn refresh_under_lock(
        &self,
        client_id: &str,
        provider: Provider,
    ) -> Result<String, PulseError> {
        // Re-read under the lock: a concurrent caller may have refreshed
        // while this one waited.
        let tokens = self.vault.retrieve(client_id, provider).await?;
        let now = Utc::now();
        if is_fresh(&tokens, now) {
            debug!(client_id, provider = %provider, "token already refreshed by a concurrent caller");
            return Ok(tokens.access_token);
        }

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            if is_expired(&tokens, now) {
                return Err(PulseError::ReauthenticationRequired {
                    provider: provider.to_string(),
                });
            }
            // Inside the margin but not yet expired, and nothing to refresh
            // with: hand back the remaining lifetime.
            return Ok(tokens.access_token);
        };

        let grant = self
            .exchanger
            .refresh(provider, &refresh_token)
            .await
            .map_err(|e| PulseError::RefreshFailed {
                provider: provider.to_string(),
                reason: e.to_string(),
            })?;

        // Providers that rotate refresh tokens return a new one; otherwise
        // the existing refresh token is retained unchanged.
        let renewed = TokenSet {
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.or(Some(refresh_token)),
            expires_at: Some(
                now + ChronoDuration::from_std(grant.expires_in)
                    .unwrap_or_else(|_| ChronoDuration::zero()),
            ),
        };
        self.vault.store(client_id, provider, &renewed).await?;
        info!(client_id, provider = %provider, "refreshed access token stored");
        Ok(renewed.access_token)
    }

    /// Persist the grant from a first OAuth authorization exchange.
    pub async fn store_authorization(
        &self,
        client_id: &str,
        provider: Provider,
        grant: TokenGrant,
    ) -> Result<(), PulseError> {
        let tokens = TokenSet {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: Some(
                Utc::now()
                    + ChronoDuration::from_std(grant.expires_in)
                        .unwrap_or_else(|_| ChronoDuration::zero()),
            ),
        };
        self.vault.store(client_id, provider, &tokens).await
    }

    async fn key_lock(&self, client_id: &str, provider: Provider) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((client_id.to_string(), provider))
            .or_default()
            .clone()
    }

    /// Drop the map entry once the last holder is done, so the map stays
    /// proportional to in-flight refreshes rather than every key ever seen.
    /// Waiters hold their own clones; with the map locked, a strong count of
    /// two means only the map entry and this caller remain.
    async fn release_key_lock(
        &self,
        client_id: &str,
        provider: Provider,
        key_lock: &Arc<Mutex<()>>,
    ) {
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(key_lock) == 2 {
            locks.remove(&(client_id.to_string(), provider));
        }
    }
}

fn is_fresh(tokens: &TokenSet, now: DateTime<Utc>) -> bool {
    match tokens.expires_at {
        // No recorded expiry means a non-expiring token.
        None => true,
        Some(at) => at - now >= ChronoDuration::minutes(REFRESH_MARGIN_MINS),
    }
}

fn is_expired(tokens: &TokenSet, now: DateTime<Utc>) -> bool {
    matches!(tokens.expires_at, Some(at) if at <= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TokenCipher;
    use crate::db;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    struct CountingExchanger {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl TokenExchanger for CountingExchanger {
        async fn refresh(
            &self,
            provider: Provider,
            _refresh_token: &str,
        ) -> Result<TokenGrant, PulseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Widen the race window: both callers observe the stale token
            // before either write can land.
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                return Err(PulseError::Oauth2Server {
                    error: format!("invalid_grant for {provider}"),
                });
            }
            Ok(TokenGrant {
                access_token: "refreshed-token".to_string(),
                refresh_token: None,
                expires_in: Duration::from_secs(3600),
            })
        }
    }

    async fn coordinator(fail: bool) -> (Arc<RefreshCoordinator>, Arc<CountingExchanger>) {
        let storage = db::connect("sqlite::memory:").await.unwrap();
        let vault = CredentialVault::new(storage, TokenCipher::new(TEST_KEY).unwrap());
        let exchanger = Arc::new(CountingExchanger {
            calls: AtomicUsize::new(0),
            fail,
        });
        (
            Arc::new(RefreshCoordinator::new(vault, exchanger.clone())),
            exchanger,
        )
    }

    fn expiring_tokens(mins_left: i64, with_refresh: bool) -> TokenSet {
        TokenSet {
            access_token: "stale-token".to_string(),
            refresh_token: with_refresh.then(|| "refresh-token".to_string()),
            expires_at: Some(Utc::now() + ChronoDuration::minutes(mins_left)),
        }
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_exchange() {
        let (coord, exchanger) = coordinator(false).await;
        coord
            .vault
            .store("c1", Provider::WebAnalytics, &expiring_tokens(60, true))
            .await
            .unwrap();

        let token = coord.ensure_valid("c1", Provider::WebAnalytics).await.unwrap();
        assert_eq!(token, "stale-token");
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_and_stored() {
        let (coord, exchanger) = coordinator(false).await;
        coord
            .vault
            .store("c1", Provider::WebAnalytics, &expiring_tokens(3, true))
            .await
            .unwrap();

        let token = coord.ensure_valid("c1", Provider::WebAnalytics).await.unwrap();
        assert_eq!(token, "refreshed-token");
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);

        let stored = coord.vault.retrieve("c1", Provider::WebAnalytics).await.unwrap();
        assert_eq!(stored.access_token, "refreshed-token");
        // Refresh token retained unchanged.
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-token"));
    }

    #[tokio::test]
    async fn concurrent_callers_refresh_exactly_once() {
        let (coord, exchanger) = coordinator(false).await;
        coord
            .vault
            .store("c1", Provider::SearchConsole, &expiring_tokens(3, true))
            .await
            .unwrap();

        let a = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.ensure_valid("c1", Provider::SearchConsole).await })
        };
        let b = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.ensure_valid("c1", Provider::SearchConsole).await })
        };

        let (ra, rb) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(ra, "refreshed-token");
        assert_eq!(rb, "refreshed-token");
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);

        let stored = coord
            .vault
            .retrieve("c1", Provider::SearchConsole)
            .await
            .unwrap();
        assert_eq!(stored.access_token, "refreshed-token");
        assert!(coord.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn lock_map_entries_are_released_after_use() {
        let (coord, exchanger) = coordinator(false).await;
        for provider in [Provider::WebAnalytics, Provider::SearchConsole] {
            coord
                .vault
                .store("c1", provider, &expiring_tokens(3, true))
                .await
                .unwrap();
            coord.ensure_valid("c1", provider).await.unwrap();
        }
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 2);
        // No refresh in flight, so no retained keys.
        assert!(coord.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn expired_without_refresh_token_requires_reauth() {
        let (coord, exchanger) = coordinator(false).await;
        coord
            .vault
            .store("c1", Provider::BusinessListing, &expiring_tokens(-10, false))
            .await
            .unwrap();

        let err = coord
            .ensure_valid("c1", Provider::BusinessListing)
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::ReauthenticationRequired { .. }));
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_exchange_leaves_stored_tokens_untouched() {
        let (coord, _) = coordinator(true).await;
        coord
            .vault
            .store("c1", Provider::WebAnalytics, &expiring_tokens(2, true))
            .await
            .unwrap();

        let err = coord.ensure_valid("c1", Provider::WebAnalytics).await.unwrap_err();
        assert!(matches!(err, PulseError::RefreshFailed { .. }));

        let stored = coord.vault.retrieve("c1", Provider::WebAnalytics).await.unwrap();
        assert_eq!(stored.access_token, "stale-token");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-token"));
    }

    #[tokio::test]
    async fn no_credential_is_not_found() {
        let (coord, _) = coordinator(false).await;
        let err = coord.ensure_valid("c1", Provider::WebAnalytics).await.unwrap_err();
        assert!(matches!(err, PulseError::CredentialNotFound { .. }));
    }
}
