// ============================
// relay-lib/src/auth/verifier.rs
// ============================
//! Bearer-credential verification.
//!
//! The relay never issues credentials; it only verifies tokens minted by the
//! external identity service and extracts the subject's identity from the
//! claims. Verification is a pure check with no retries: a bad credential
//! simply refuses the connection attempt.

use crate::config::AuthSettings;
use crate::error::AuthError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a BugTrail bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier
    pub sub: String,
    /// Email
    pub email: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Authorization roles
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Verified identity of a connecting subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            subject_id: claims.sub,
            email: claims.email,
            display_name: claims.name,
            roles: claims.roles,
        }
    }
}

/// Verifies bearer credentials presented at connection time.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &settings.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        Self {
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
        }
    }

    /// Verify a bearer token and extract the subject's identity.
    ///
    /// # Errors
    /// `AuthError::MissingToken` when no token was supplied,
    /// `AuthError::InvalidToken` when signature or claim validation fails.
    pub fn verify(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|err| {
            tracing::warn!("token verification failed: {err}");
            AuthError::InvalidToken
        })?;

        Ok(Identity::from(data.claims))
    }
}
