/// Access Token Codec
///
/// Signs and verifies short-lived HS256 tokens. Verification needs no store
/// lookup: signature, algorithm and expiry are all checked here.

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::AccessTokenClaims;
use crate::configuration::JwtSettings;
use crate::domain::User;
use crate::error::{AppError, AuthError, ConfigError};

pub struct AccessTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl AccessTokenCodec {
    /// # Errors
    /// Returns a configuration error for an empty secret or a non-positive TTL
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.access_token_secret".to_string()).into());
        }
        if ttl <= Duration::zero() {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_ttl_minutes must be positive".to_string(),
            )
            .into());
        }

        // Only HS256 is accepted; a token claiming any other algorithm fails
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    pub fn from_settings(settings: &JwtSettings) -> Result<Self, AppError> {
        Self::new(&settings.access_token_secret, settings.access_token_ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a fresh access token for `user`
    pub fn sign(&self, user: &User) -> Result<String, AppError> {
        self.sign_claims(&AccessTokenClaims::new(user, self.ttl))
    }

    pub fn sign_claims(&self, claims: &AccessTokenClaims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Validate a token and extract its claims
    ///
    /// # Errors
    /// `AuthError::InvalidToken` for any bad signature, unexpected algorithm,
    /// structural corruption or expiry.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, AppError> {
        decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(reason = %e, "Access token rejected");
                AuthError::InvalidToken.into()
            })
    }
}
