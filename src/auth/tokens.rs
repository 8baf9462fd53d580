//! Token storage and inspection

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_MARGIN_SECS: u64 = 300;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Stored bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<u64>,
}

impl StoredToken {
    pub fn new(token: String, expires_in_secs: Option<u64>) -> Self {
        let expires_at = expires_in_secs.map(|secs| now_secs() + secs);
        Self { token, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(exp) => now + EXPIRY_MARGIN_SECS >= exp,
            None => false,
        }
    }
}

/// Claims we read from an identity-provider ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdClaims {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<u64>,
}

impl IdClaims {
    /// Stable user id (`user_id` in Firebase tokens, `sub` elsewhere).
    pub fn uid(&self) -> Option<&str> {
        self.user_id.as_deref().or(self.sub.as_deref())
    }

    /// Seconds until `exp`, if present and in the future.
    pub fn expires_in(&self) -> Option<u64> {
        self.exp.and_then(|exp| exp.checked_sub(now_secs()))
    }
}

/// Decode the payload of a JWT without verifying it.
///
/// The backend verifies tokens; the client only needs the user id and expiry.
pub fn decode_claims(jwt: &str) -> Option<IdClaims> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}
