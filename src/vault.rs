use crate::crypto::TokenCipher;
use crate::db::Storage;
use crate::error::PulseError;
use crate::provider::Provider;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Decrypted credential pair as handed to callers. Plaintext exists only in
/// memory; at rest both values are AES-GCM ciphertext.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub connected: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Encrypted-at-rest storage for per-client, per-provider OAuth token pairs.
///
/// The vault is the only component that touches ciphertext: encryption
/// happens on the write path, decryption exclusively on the read path.
/// Replacement of a pair is transactional, so stale tokens never coexist
/// with fresh ones.
#[derive(Clone)]
pub struct CredentialVault {
    storage: Storage,
    cipher: TokenCipher,
}

impl CredentialVault {
    pub fn new(storage: Storage, cipher: TokenCipher) -> Self {
        Self { storage, cipher }
    }

    /// Replace any stored credentials for (client, provider) with this set.
    pub async fn store(
        &self,
        client_id: &str,
        provider: Provider,
        tokens: &TokenSet,
    ) -> Result<(), PulseError> {
        let access_ct = self.cipher.encrypt(&tokens.access_token)?;
        let refresh_ct = tokens
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;

        self.storage
            .replace_credentials(
                client_id,
                provider,
                &access_ct,
                tokens.expires_at,
                refresh_ct.as_deref(),
            )
            .await?;
        debug!(client_id, provider = %provider, "credential pair stored");
        Ok(())
    }

    /// Decrypted pair, or CredentialNotFound when no access token is stored.
    pub async fn retrieve(
        &self,
        client_id: &str,
        provider: Provider,
    ) -> Result<TokenSet, PulseError> {
        let rows = self.storage.credential_pair(client_id, provider).await?;

        let access = rows
            .iter()
            .find(|r| r.credential_type == "access")
            .ok_or_else(|| PulseError::CredentialNotFound {
                client_id: client_id.to_string(),
                provider: provider.to_string(),
            })?;
        let refresh = rows.iter().find(|r| r.credential_type == "refresh");

        Ok(TokenSet {
            access_token: self.cipher.decrypt(&access.encrypted_value)?,
            refresh_token: refresh
                .map(|r| self.cipher.decrypt(&r.encrypted_value))
                .transpose()?,
            expires_at: access.expires_at,
        })
    }

    /// Connection state without decrypting anything.
    pub async fn status(
        &self,
        client_id: &str,
        provider: Provider,
    ) -> Result<CredentialStatus, PulseError> {
        let rows = self.storage.credential_pair(client_id, provider).await?;
        let access = rows.iter().find(|r| r.credential_type == "access");
        Ok(CredentialStatus {
            connected: access.is_some(),
            expires_at: access.and_then(|r| r.expires_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    async fn memory_vault() -> CredentialVault {
        let storage = db::connect("sqlite::memory:").await.unwrap();
        CredentialVault::new(storage, TokenCipher::new(TEST_KEY).unwrap())
    }

    fn tokens(access: &str, refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        }
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let vault = memory_vault().await;
        vault
            .store("client-1", Provider::WebAnalytics, &tokens("at-1", Some("rt-1")))
            .await
            .unwrap();

        let got = vault
            .retrieve("client-1", Provider::WebAnalytics)
            .await
            .unwrap();
        assert_eq!(got.access_token, "at-1");
        assert_eq!(got.refresh_token.as_deref(), Some("rt-1"));
        assert!(got.expires_at.is_some());
    }

    #[tokio::test]
    async fn missing_credential_is_not_found() {
        let vault = memory_vault().await;
        let err = vault
            .retrieve("client-1", Provider::SearchConsole)
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::CredentialNotFound { .. }));
    }

    #[tokio::test]
    async fn store_replaces_the_whole_pair() {
        let vault = memory_vault().await;
        vault
            .store("client-1", Provider::WebAnalytics, &tokens("old", Some("rt-old")))
            .await
            .unwrap();
        // Second store with no refresh token: the old refresh row must not survive.
        vault
            .store("client-1", Provider::WebAnalytics, &tokens("new", None))
            .await
            .unwrap();

        let got = vault
            .retrieve("client-1", Provider::WebAnalytics)
            .await
            .unwrap();
        assert_eq!(got.access_token, "new");
        assert!(got.refresh_token.is_none());
    }

    #[tokio::test]
    async fn providers_do_not_share_credentials() {
        let vault = memory_vault().await;
        vault
            .store("client-1", Provider::WebAnalytics, &tokens("wa", None))
            .await
            .unwrap();

        assert!(
            vault
                .retrieve("client-1", Provider::BusinessListing)
                .await
                .is_err()
        );
        let status = vault
            .status("client-1", Provider::BusinessListing)
            .await
            .unwrap();
        assert!(!status.connected);
    }

    #[tokio::test]
    async fn values_at_rest_are_ciphertext() {
        let vault = memory_vault().await;
        vault
            .store("client-1", Provider::WebAnalytics, &tokens("plain-token", None))
            .await
            .unwrap();

        let rows = vault
            .storage
            .credential_pair("client-1", Provider::WebAnalytics)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_ne!(rows[0].encrypted_value, "plain-token");
        assert!(!rows[0].encrypted_value.contains("plain-token"));
    }
}
