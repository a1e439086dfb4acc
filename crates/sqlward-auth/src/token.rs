//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs. Besides the signature, each user has exactly one
//! live token: the SHA-256 fingerprint of the last issued token is kept in
//! memory keyed by user UUID, and a token whose fingerprint no longer
//! matches is obsolete.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlward_state::{Event, EventKind, Notifier, User};
use tracing::{debug, info};

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User UUID.
    pub uuid: String,
    pub iat: u64,
    pub exp: u64,
    /// Distinguishes tokens issued within the same second.
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: u64,
}

/// Hex SHA-256 of the compact token.
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    fingerprints: RwLock<HashMap<String, String>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl TokenAuthority {
    pub fn new(secret: &str, ttl: Duration) -> AuthResult<Self> {
        if secret.is_empty() {
            return Err(AuthError::Configuration("token secret is empty".into()));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            fingerprints: RwLock::new(HashMap::new()),
            notifier: None,
        })
    }

    /// Fire `TokenIssued` / `TokenRevoked` through `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sign a new token for `user`, replacing any previous one.
    pub fn issue(&self, user: &User) -> AuthResult<IssuedToken> {
        let iat = now_epoch_seconds();
        let claims = Claims {
            uuid: user.uuid.clone(),
            iat,
            exp: iat + self.ttl.as_secs(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let header = Header::new(Algorithm::HS256);
        let token = jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        self.fingerprints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.uuid.clone(), fingerprint(&token));

        info!(user_uuid = %user.uuid, exp = claims.exp, "token issued");
        if let Some(notifier) = &self.notifier {
            notifier.fire(&Event::for_token(EventKind::TokenIssued, &user.uuid));
        }
        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Check signature and expiry only.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(data.claims)
    }

    /// Check that `token` is the live token for `uuid`.
    pub fn check_fingerprint(&self, uuid: &str, token: &str) -> AuthResult<()> {
        let fingerprints = self
            .fingerprints
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match fingerprints.get(uuid) {
            None => Err(AuthError::TokenNotFound),
            Some(stored) if *stored != fingerprint(token) => Err(AuthError::TokenObsolete),
            Some(_) => Ok(()),
        }
    }

    /// Forget the live token of `uuid` (logout). Returns true if one existed.
    pub fn revoke(&self, uuid: &str) -> bool {
        let existed = self
            .fingerprints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uuid)
            .is_some();
        debug!(user_uuid = %uuid, existed, "token revoked");
        if existed {
            if let Some(notifier) = &self.notifier {
                notifier.fire(&Event::for_token(EventKind::TokenRevoked, uuid));
            }
        }
        existed
    }
}
