//! Process-wide custody of the short-lived OAuth token pair.
//!
//! The servlet hands us fresh tokens through the admin surface; when they
//! expire we refresh with the stored refresh token; when neither works the
//! scan is dead in the water until an operator re-runs the servlet.
//!
//! One manager per process, constructed at startup and injected where
//! needed. Cross-process agreement goes through the credentials table, not
//! memory; a stale worker simply refreshes on its next expiry check.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::{CredentialRow, TokenPayload};
use crate::repository::CredentialRepository;
use crate::twitch::{self, ApiError, TwitchApiConfig};
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No credentials on hand; re-run the OAuth servlet")]
    NoCredentials,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Token refresh failed: {0}")]
    Refresh(#[from] ApiError),

    #[error("Credential persistence failed: {0}")]
    Persistence(String),

    #[error("Refreshed expiry {new} does not advance past {previous}")]
    NonMonotonicExpiry {
        previous: DateTime<Utc>,
        new: DateTime<Utc>,
    },
}

/// Durable storage seam for the singleton credential row.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> crate::Result<Option<CredentialRow>>;
    async fn upsert(&self, row: &CredentialRow) -> crate::Result<()>;
}

#[async_trait]
impl CredentialStore for CredentialRepository {
    async fn load(&self) -> crate::Result<Option<CredentialRow>> {
        CredentialRepository::load(self).await
    }

    async fn upsert(&self, row: &CredentialRow) -> crate::Result<()> {
        CredentialRepository::upsert(self, row).await
    }
}

/// Outbound credential triple for API calls.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Serialized keeper of the current token pair and its expiry.
///
/// Every public operation takes the single guard. Operations are infrequent
/// (per scan, per refresh) and never on the hot path, so one mutex is fine.
/// `refresh` deliberately holds the guard across its network call: that is
/// what serializes refreshes when several workers notice expiry at once.
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    /// Endpoint configuration with app identity but no access token.
    api_template: TwitchApiConfig,
    state: Mutex<Option<CredentialRow>>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>, api_template: TwitchApiConfig) -> Self {
        Self {
            store,
            api_template,
            state: Mutex::new(None),
        }
    }

    /// Accept a token payload pushed by the OAuth servlet.
    ///
    /// Validation or persistence failure fails the operation and clears the
    /// in-memory state, forcing the next caller to reload from storage.
    pub async fn ingest_from_servlet(&self, payload: &TokenPayload) -> Result<(), CredentialError> {
        let mut state = self.state.lock().await;

        if let Err(e) = payload.validate() {
            *state = None;
            return Err(e.into());
        }

        let row = CredentialRow::from_payload(payload, Utc::now());
        if let Err(e) = self.store.upsert(&row).await {
            *state = None;
            return Err(CredentialError::Persistence(e.to_string()));
        }

        tracing::info!(expires_at = %row.expires_at, scope = %row.scope, "Tokens received");
        *state = Some(row);
        Ok(())
    }

    /// The current access token, loading from storage on first use and
    /// refreshing transparently once expired.
    pub async fn access_token(&self) -> Result<String, CredentialError> {
        let mut state = self.state.lock().await;

        if state.is_none() {
            *state = self
                .store
                .load()
                .await
                .map_err(|e| CredentialError::Persistence(e.to_string()))?;
        }

        let Some(current) = state.as_ref() else {
            return Err(CredentialError::NoCredentials);
        };

        if current.is_expired(Utc::now()) {
            tracing::info!("Access token expired; refreshing");
            self.refresh_locked(&mut state).await?;
        }

        state
            .as_ref()
            .map(|row| row.access_token.clone())
            .ok_or(CredentialError::NoCredentials)
    }

    /// Refresh using the stored refresh token.
    pub async fn refresh(&self) -> Result<(), CredentialError> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    /// Unconditional refresh, operator-triggered through the admin surface.
    pub async fn force_refresh(&self) -> Result<(), CredentialError> {
        self.refresh().await
    }

    /// The triple outbound API calls need.
    pub async fn credentials(&self) -> Result<Credentials, CredentialError> {
        let access_token = self.access_token().await?;
        Ok(Credentials {
            access_token,
            client_id: self.api_template.client_id.clone(),
            client_secret: self.api_template.client_secret.clone(),
        })
    }

    /// A ready-to-use delegate config carrying a live access token.
    pub async fn api_config(&self) -> Result<TwitchApiConfig, CredentialError> {
        let access_token = self.access_token().await?;
        let mut config = self.api_template.clone();
        config.access_token = access_token;
        Ok(config)
    }

    /// The actual refresh, entered with the guard held. On any failure the
    /// in-memory state is invalidated so later callers retry from storage.
    async fn refresh_locked(
        &self,
        state: &mut Option<CredentialRow>,
    ) -> Result<(), CredentialError> {
        if state.is_none() {
            *state = self
                .store
                .load()
                .await
                .map_err(|e| CredentialError::Persistence(e.to_string()))?;
        }

        let Some(current) = state.take() else {
            return Err(CredentialError::NoCredentials);
        };

        let payload = match twitch::refresh_token(&self.api_template, &current.refresh_token).await
        {
            Ok(payload) => payload,
            Err(e) => return Err(e.into()),
        };
        payload.validate()?;

        let row = CredentialRow::from_payload(&payload, Utc::now());
        if row.expires_at <= current.expires_at {
            return Err(CredentialError::NonMonotonicExpiry {
                previous: current.expires_at,
                new: row.expires_at,
            });
        }

        if let Err(e) = self.store.upsert(&row).await {
            return Err(CredentialError::Persistence(e.to_string()));
        }

        tracing::info!(expires_at = %row.expires_at, "Tokens refreshed");
        *state = Some(row);
        Ok(())
    }
}
