//! Authentication Module
//!
//! Callers identify themselves with an HS256 JWT in the
//! `Authorization: Bearer` header. The token carries the numeric user id
//! and whether the caller may use moderation routes. Issuing tokens is
//! somebody else's job; this module only verifies them.

use crate::constants::{DEFAULT_JWT_CLOCK_SKEW_SECS, MIN_JWT_SECRET_LENGTH};
use crate::error::{ApiError, ApiResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pixels_core::{Identity, UserId, ValidationError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock used for expiry checks, injectable for deterministic tests.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// JWT SECRET
// ============================================================================

/// JWT signing secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// # Errors
    /// `InvalidConfig` if the secret is shorter than [`MIN_JWT_SECRET_LENGTH`].
    pub fn new(secret: String) -> Result<Self, ValidationError> {
        if secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ValidationError::InvalidConfig {
                field: "jwt_secret".to_string(),
                reason: format!("must be at least {} characters", MIN_JWT_SECRET_LENGTH),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: JwtSecret,

    /// JWT algorithm (HS256)
    pub jwt_algorithm: Algorithm,

    /// Tolerance for expiry checks against drifting clocks.
    pub jwt_clock_skew_secs: i64,

    /// Clock for expiry checks (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl AuthConfig {
    pub fn new(jwt_secret: JwtSecret) -> Self {
        Self {
            jwt_secret,
            jwt_algorithm: Algorithm::HS256,
            jwt_clock_skew_secs: DEFAULT_JWT_CLOCK_SKEW_SECS,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn JwtClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Load from environment variables.
    ///
    /// - `PIXELS_JWT_SECRET`: signing secret (required)
    /// - `PIXELS_JWT_CLOCK_SKEW_SECS`: expiry tolerance (default: 60)
    pub fn from_env() -> ApiResult<Self> {
        let secret = std::env::var("PIXELS_JWT_SECRET")
            .map_err(|_| ApiError::internal_error("PIXELS_JWT_SECRET is not set"))?;
        let jwt_secret = JwtSecret::new(secret)
            .map_err(|e| ApiError::internal_error(e.to_string()))?;

        let mut config = Self::new(jwt_secret);
        config.jwt_clock_skew_secs = std::env::var("PIXELS_JWT_CLOCK_SKEW_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_JWT_CLOCK_SKEW_SECS);
        Ok(config)
    }
}

// ============================================================================
// CLAIMS
// ============================================================================

/// Claims carried by a caller's token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id.
    pub sub: i64,
    /// May use moderation routes.
    #[serde(default)]
    pub privileged: bool,
    pub exp: i64,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: UserId(self.sub),
            privileged: self.privileged,
        }
    }
}

// ============================================================================
// TOKEN VALIDATION
// ============================================================================

/// Verify the signature, then check expiry against the configured clock.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let claims = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            jsonwebtoken::errors::ErrorKind::InvalidToken => {
                ApiError::invalid_token("Token is invalid")
            }
            _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
        })?
        .claims;

    let now = config.clock.now_epoch_secs();
    if claims.exp < now - config.jwt_clock_skew_secs {
        return Err(ApiError::token_expired());
    }

    Ok(claims)
}

/// Sign a token for `identity` valid for `ttl_secs`.
pub fn generate_jwt_token(
    config: &AuthConfig,
    identity: Identity,
    ttl_secs: i64,
) -> ApiResult<String> {
    let claims = Claims {
        sub: identity.user_id.0,
        privileged: identity.privileged,
        exp: config.clock.now_epoch_secs() + ttl_secs,
    };
    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    encode(&Header::new(config.jwt_algorithm), &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}
