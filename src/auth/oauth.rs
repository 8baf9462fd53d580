//! OAuth2 device code flow for Google sign-in
//!
//! A terminal has no browser redirect target, so Google sign-in uses the
//! device flow: the user approves on another device, we poll for the access
//! token, and the identity provider exchanges it for its own session.

use anyhow::{Context, Result};
use oauth2::{
    basic::BasicClient, AuthType, AuthUrl, ClientId, ClientSecret, DeviceAuthorizationUrl, Scope,
    StandardDeviceAuthorizationResponse, TokenResponse, TokenUrl,
};

use crate::config::IdentitySettings;
use crate::error::ClientError;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_DEVICE_URL: &str = "https://oauth2.googleapis.com/device/code";

const SCOPES: [&str; 3] = ["openid", "email", "profile"];

/// Build the OAuth2 client from the identity settings
fn build_client(settings: &IdentitySettings) -> Result<BasicClient> {
    let client_id = settings
        .google_client_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            ClientError::third_party(
                "Google sign-in",
                "no OAuth client configured (set [identity] google_client_id)",
            )
        })?;

    let auth_url = AuthUrl::new(GOOGLE_AUTH_URL.to_string())?;
    let token_url = TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?;
    let device_url = DeviceAuthorizationUrl::new(GOOGLE_DEVICE_URL.to_string())?;

    // Google expects client credentials in the form body, not basic auth.
    Ok(BasicClient::new(
        ClientId::new(client_id.to_string()),
        settings.google_client_secret.clone().map(ClientSecret::new),
        auth_url,
        Some(token_url),
    )
    .set_auth_type(AuthType::RequestBody)
    .set_device_authorization_url(device_url))
}

/// Run the device flow and return a Google access token.
pub async fn google_access_token(settings: &IdentitySettings) -> Result<String> {
    let client = build_client(settings)?;

    tracing::info!("Initiating device code flow...");

    let device_auth_response: StandardDeviceAuthorizationResponse = client
        .exchange_device_code()?
        .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .map_err(|e| ClientError::third_party("Google sign-in", format!("device code: {}", e)))?;

    let verification_url = device_auth_response.verification_uri().as_str();
    let user_code = device_auth_response.user_code().secret();

    println!();
    println!("To sign in with Google, visit: {}", verification_url);
    println!("Enter code:                    {}", user_code);
    println!();

    tracing::info!("Waiting for authentication...");

    let token_response = client
        .exchange_device_access_token(&device_auth_response)
        .request_async(oauth2::reqwest::async_http_client, tokio::time::sleep, None)
        .await
        .context("Google sign-in was not completed")?;

    Ok(token_response.access_token().secret().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_id() {
        let err = build_client(&IdentitySettings::default()).unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(ClientError::ThirdParty { .. })
        ));

        let settings = IdentitySettings {
            api_key: "k".to_string(),
            google_client_id: Some("id.apps.googleusercontent.com".to_string()),
            google_client_secret: None,
        };
        assert!(build_client(&settings).is_ok());
    }
}
