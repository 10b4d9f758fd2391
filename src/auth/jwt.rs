//! Bearer token primitive shared by both services and the gateway.
//!
//! Tokens are HMAC-SHA-256 signed JWTs with issuer `swift-signals` and
//! audience `users`. Parsing rejects any token whose algorithm field is not
//! HS256, which closes the algorithm-confusion hole. The signing secret is a
//! process-wide immutable value set once at startup; calling [`sign`] before
//! [`init`] is a program error surfaced as `Internal`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::domain::Role;
use crate::errors::{Result, ServiceError};

const ISSUER: &str = "swift-signals";
const AUDIENCE: &str = "users";

/// Token lifetime handed out by `LoginUser`.
pub const TOKEN_TTL: Duration = Duration::hours(72);

static SIGNER: OnceCell<TokenSigner> = OnceCell::new();

/// JWT claims carried by a Swift-Signals bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub role: String,
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

/// Signing and verification state derived from one secret.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenSigner {
    /// Build a signer from a raw secret.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a signed token for the given user, returning the token string
    /// and its expiry instant.
    pub fn sign(
        &self,
        user_id: &str,
        role: Role,
        ttl: Duration,
    ) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let claims = Claims {
            user_id: user_id.to_string(),
            role: role.to_string(),
            iss: ISSUER.to_string(),
            sub: user_id.to_string(),
            aud: vec![AUDIENCE.to_string()],
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
        };

        let token =
            encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|err| {
                ServiceError::internal_with_source("failed to sign token", Box::new(err))
            })?;

        Ok((token, expires_at))
    }

    /// Verify a token string and return its claims.
    ///
    /// Enforces signature, HS256 algorithm, issuer, audience, `exp` in the
    /// future and `nbf` not after now.
    pub fn parse(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| ServiceError::unauthorized("invalid token"))?;
        Ok(data.claims)
    }
}

/// Install the process-wide signing secret. Later calls are ignored so tests
/// sharing a process do not race.
pub fn init(secret: &[u8]) {
    let _ = SIGNER.set(TokenSigner::new(secret));
}

fn signer() -> Result<&'static TokenSigner> {
    SIGNER.get().ok_or_else(|| ServiceError::internal("token signing key not initialised"))
}

/// Sign with the process-wide secret. See [`TokenSigner::sign`].
pub fn sign(user_id: &str, role: Role, ttl: Duration) -> Result<(String, DateTime<Utc>)> {
    signer()?.sign(user_id, role, ttl)
}

/// Parse with the process-wide secret. See [`TokenSigner::parse`].
pub fn parse(token: &str) -> Result<Claims> {
    signer()?.parse(token)
}
