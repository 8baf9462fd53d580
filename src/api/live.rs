//! Session-join credential for live video sessions

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::client::ApiClient;

/// Signed credential the conferencing SDK needs to join a meeting.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCredential {
    pub signature: String,
    #[serde(alias = "apiKey", default)]
    pub sdk_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignatureRequest<'a> {
    meeting_number: &'a str,
    /// 0 = attendee, 1 = host
    role: u8,
}

pub async fn request_join_credential(
    client: &ApiClient,
    meeting_number: &str,
    role: u8,
) -> Result<JoinCredential> {
    client
        .post(
            "/api/meetings/signature",
            &SignatureRequest {
                meeting_number,
                role,
            },
        )
        .await
        .context("Failed to obtain meeting credential")
}
