use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{validate_token, ValidationError};

/// The platform reports scope either as a single space-delimited string or as
/// a list of strings, depending on the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeField {
    One(String),
    Many(Vec<String>),
}

impl ScopeField {
    /// Normalize to the space-delimited string form we persist.
    #[must_use]
    pub fn normalize(&self) -> String {
        match self {
            Self::One(s) => s.clone(),
            Self::Many(items) => items.join(" "),
        }
    }
}

impl Default for ScopeField {
    fn default() -> Self {
        Self::One(String::new())
    }
}

/// Token payload as delivered by the OAuth servlet callback and by the
/// platform's refresh grant. Both produce the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPayload {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    #[serde(default)]
    pub scope: ScopeField,
}

impl TokenPayload {
    /// Validate the payload shape: token character sets, positive lifetime,
    /// bearer token type.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_token(&self.access_token)?;
        validate_token(&self.refresh_token)?;
        if self.expires_in <= 0 {
            return Err(ValidationError::Field {
                field: "expires_in".to_string(),
                message: "must be a positive number of seconds".to_string(),
            });
        }
        if !self.token_type.eq_ignore_ascii_case("bearer") {
            return Err(ValidationError::Field {
                field: "token_type".to_string(),
                message: "must be 'bearer'".to_string(),
            });
        }
        Ok(())
    }
}

/// The singleton credential row. At most one exists, enforced by the
/// `enforce_one_row` sentinel column in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRow {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: String,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRow {
    /// Derive a storable row from a validated payload, computing the
    /// absolute expiry from the relative lifetime.
    #[must_use]
    pub fn from_payload(payload: &TokenPayload, now: DateTime<Utc>) -> Self {
        Self {
            access_token: payload.access_token.clone(),
            refresh_token: payload.refresh_token.clone(),
            expires_at: now + chrono::Duration::seconds(payload.expires_in),
            token_type: payload.token_type.to_lowercase(),
            scope: payload.scope.normalize(),
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
