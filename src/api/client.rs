//! Authenticated HTTP client for the platform backend
//!
//! Wraps reqwest::Client with bearer token injection and refresh.

use anyhow::Result;
use futures::future::BoxFuture;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::identity::IdentityClient;
use crate::auth::session::{self, SharedSession};
use crate::config::Config;
use crate::error::ClientError;
use crate::realtime::TokenSource;

/// Client for the backend REST API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SharedSession,
    identity: Option<IdentityClient>,
}

impl ApiClient {
    /// Build a client. Without an identity API key, expired tokens cannot be
    /// refreshed and requests fail with an authentication error instead.
    pub fn new(config: &Config, session: SharedSession) -> Self {
        let identity = IdentityClient::new(&config.identity.api_key).ok();
        Self {
            http: reqwest::Client::new(),
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            session,
            identity,
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Signed-in user id, or an authentication error.
    pub fn user_id(&self) -> Result<String> {
        Ok(session::lock(&self.session).require()?.user_id.clone())
    }

    /// Current bearer token, refreshed through the identity provider when it
    /// is about to expire.
    pub async fn bearer(&self) -> Result<String> {
        let refresh_token = {
            let store = session::lock(&self.session);
            let session = store.require()?;
            if !session.id_token.is_expired() {
                return Ok(session.id_token.token.clone());
            }
            session.refresh_token.clone()
        };

        let (Some(identity), Some(refresh_token)) = (&self.identity, refresh_token) else {
            tracing::warn!("Session token expired and cannot be refreshed");
            return Err(
                ClientError::Auth("Session expired. Run 'mentor-chat login'.".to_string()).into(),
            );
        };

        tracing::info!("Session token expired, refreshing...");
        let tokens = identity.refresh(&refresh_token).await?;
        let fresh = tokens.id_token.clone();
        session::lock(&self.session).update_token(tokens)?;
        Ok(fresh)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// POST without a session (public endpoints such as the contact form).
    /// The response body is ignored.
    pub async fn post_public<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        tracing::debug!("POST {} (public)", url);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("POST {} failed: {}", url, e)))?;
        check_response(resp, &url).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let mut req = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.bearer().await?);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("{} {} failed: {}", method, url, e)))?;
        let resp = check_response(resp, &url).await?;

        resp.json().await.map_err(|e| {
            ClientError::Network(format!("Unexpected response from {}: {}", url, e)).into()
        })
    }
}

/// Map a non-success status onto the error taxonomy.
fn status_error(status: StatusCode, url: &str, body: &str) -> ClientError {
    let detail = if body.trim().is_empty() {
        format!("HTTP {} for {}", status.as_u16(), url)
    } else {
        format!("HTTP {} for {}: {}", status.as_u16(), url, body.trim())
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth(format!(
            "{}. Token may be invalid -- run 'mentor-chat login'.",
            detail
        )),
        StatusCode::NOT_FOUND => ClientError::NotFound(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ClientError::Validation(detail)
        }
        _ => ClientError::Network(detail),
    }
}

/// Check HTTP response status code and return a classified error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(status_error(status, url, &body).into());
    }
    Ok(resp)
}

impl TokenSource for ApiClient {
    fn token(&self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { self.bearer().await.map(Some) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::{Session, SessionStore};
    use crate::auth::tokens::StoredToken;

    #[test]
    fn test_status_mapping() {
        let url = "http://x/api/mentors/9";
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, url, ""),
            ClientError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, url, ""),
            ClientError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, url, ""),
            ClientError::NotFound(_)
        ));
        match status_error(StatusCode::UNPROCESSABLE_ENTITY, url, " bio too long ") {
            ClientError::Validation(msg) => assert!(msg.ends_with(": bio too long")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, url, "upstream"),
            ClientError::Network(_)
        ));
    }

    fn client_with(session: Option<Session>) -> (tempfile::TempDir, ApiClient) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::open_at(dir.path().join("session.toml")).unwrap();
        if let Some(session) = session {
            store.sign_in(session).unwrap();
        }
        let mut config = Config::default();
        config.api.base_url = "http://localhost:5000/".to_string();
        (dir, ApiClient::new(&config, store.into_shared()))
    }

    #[test]
    fn test_bearer_uses_fresh_token() {
        let (_dir, client) = client_with(Some(Session {
            user_id: "u1".to_string(),
            email: None,
            id_token: StoredToken::new("tok".to_string(), Some(3600)),
            refresh_token: Some("r".to_string()),
            profile: None,
        }));
        assert_eq!(client.url("/api/mentors"), "http://localhost:5000/api/mentors");
        assert_eq!(client.user_id().unwrap(), "u1");
        assert_eq!(tokio_test::block_on(client.bearer()).unwrap(), "tok");
    }

    #[test]
    fn test_expired_token_without_identity_key_is_auth_error() {
        let (_dir, client) = client_with(Some(Session {
            user_id: "u1".to_string(),
            email: None,
            id_token: StoredToken {
                token: "old".to_string(),
                expires_at: Some(1),
            },
            refresh_token: Some("r".to_string()),
            profile: None,
        }));
        let err = tokio_test::block_on(client.bearer()).unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(ClientError::Auth(_))
        ));
    }

    #[test]
    fn test_signed_out_is_auth_error() {
        let (_dir, client) = client_with(None);
        let err = client.user_id().unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(ClientError::Auth(_))
        ));
    }

    #[test]
    fn test_token_source_follows_session() {
        let signed_in = |token: &str| Session {
            user_id: "u1".to_string(),
            email: None,
            id_token: StoredToken::new(token.to_string(), Some(3600)),
            refresh_token: Some("r".to_string()),
            profile: None,
        };
        let (_dir, client) = client_with(Some(signed_in("first")));
        assert_eq!(
            tokio_test::block_on(client.token()).unwrap().as_deref(),
            Some("first")
        );

        session::lock(client.session()).sign_in(signed_in("second")).unwrap();
        assert_eq!(
            tokio_test::block_on(client.token()).unwrap().as_deref(),
            Some("second")
        );
    }
}
