//! Hosted identity provider (Firebase Identity Toolkit REST API)
//!
//! Email/password and Google sign-in return an ID token (used as the bearer
//! token for the backend and the socket) plus a long-lived refresh token.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::tokens::decode_claims;
use crate::error::ClientError;

const IDENTITY_BASE: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
const SERVICE: &str = "identity provider";

/// Tokens and identity returned by a successful sign-in or refresh.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Expiry from the response, falling back to the token's own `exp` claim.
fn expiry(expires_in: Option<&str>, id_token: &str) -> Option<u64> {
    expires_in
        .and_then(|s| s.parse().ok())
        .or_else(|| decode_claims(id_token).and_then(|c| c.expires_in()))
}

impl From<SignInResponse> for AuthTokens {
    fn from(r: SignInResponse) -> Self {
        let expires_in = expiry(r.expires_in.as_deref(), &r.id_token);
        Self {
            user_id: r.local_id,
            email: r.email,
            display_name: r.display_name.filter(|n| !n.is_empty()),
            id_token: r.id_token,
            refresh_token: r.refresh_token,
            expires_in,
        }
    }
}

/// Map provider error codes (`EMAIL_NOT_FOUND`, `WEAK_PASSWORD : ...`) onto
/// the client taxonomy.
fn classify_provider_error(message: &str) -> ClientError {
    let code = message.split(':').next().unwrap_or(message).trim();
    match code {
        "EMAIL_NOT_FOUND"
        | "INVALID_PASSWORD"
        | "INVALID_LOGIN_CREDENTIALS"
        | "USER_DISABLED"
        | "TOKEN_EXPIRED"
        | "INVALID_REFRESH_TOKEN"
        | "INVALID_ID_TOKEN"
        | "USER_NOT_FOUND"
        | "INVALID_IDP_RESPONSE" => ClientError::Auth(code.to_string()),
        "EMAIL_EXISTS" | "INVALID_EMAIL" | "MISSING_PASSWORD" | "MISSING_EMAIL"
        | "WEAK_PASSWORD" => ClientError::Validation(message.to_string()),
        _ => ClientError::third_party(SERVICE, message),
    }
}

/// Client for the identity provider's REST endpoints.
pub struct IdentityClient {
    http: reqwest::Client,
    api_key: String,
}

impl IdentityClient {
    pub fn new(api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ClientError::third_party(
                SERVICE,
                "API key not configured (set [identity] api_key or MENTOR_CHAT_IDENTITY_KEY)",
            )
            .into());
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
        })
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthTokens> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true
        });
        let resp: SignInResponse = self.call("accounts:signInWithPassword", &body).await?;
        Ok(resp.into())
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthTokens> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true
        });
        let resp: SignInResponse = self.call("accounts:signUp", &body).await?;
        Ok(resp.into())
    }

    /// Exchange a Google OAuth access token for a provider session.
    pub async fn sign_in_with_google(&self, access_token: &str) -> Result<AuthTokens> {
        let body = serde_json::json!({
            "postBody": format!("access_token={}&providerId=google.com", access_token),
            "requestUri": "http://localhost",
            "returnIdpCredential": true,
            "returnSecureToken": true
        });
        let resp: SignInResponse = self.call("accounts:signInWithIdp", &body).await?;
        Ok(resp.into())
    }

    /// Trade a refresh token for a fresh ID token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens> {
        let url = format!("{}?key={}", SECURE_TOKEN_URL, self.api_key);
        tracing::debug!("Refreshing ID token");

        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("Token refresh request failed: {}", e)))?;

        let resp: RefreshResponse = parse_response(resp).await?;
        let expires_in = expiry(resp.expires_in.as_deref(), &resp.id_token);
        let email = decode_claims(&resp.id_token).and_then(|c| c.email);
        Ok(AuthTokens {
            user_id: resp.user_id,
            email,
            display_name: None,
            id_token: resp.id_token,
            refresh_token: resp.refresh_token,
            expires_in,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &serde_json::Value) -> Result<T> {
        let url = format!("{}/{}?key={}", IDENTITY_BASE, method, self.api_key);
        tracing::debug!("Identity POST {}", method);

        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("{} request failed: {}", method, e)))?;

        parse_response(resp)
            .await
            .with_context(|| format!("{} failed", method))
    }
}

async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => classify_provider_error(&envelope.error.message),
            Err(_) => ClientError::third_party(SERVICE, format!("HTTP {}: {}", status.as_u16(), body)),
        };
        return Err(err.into());
    }
    resp.json()
        .await
        .map_err(|e| ClientError::third_party(SERVICE, format!("unexpected response: {}", e)).into())
}
