//! User profile endpoints
//!
//! The backend profile is authoritative; the session keeps a snapshot so the
//! UI can show the user's name and role without a round trip.

use anyhow::{Context, Result};

use super::client::ApiClient;
use crate::auth::session;
use crate::error::{self, ClientError};
use crate::models::{ProfileUpdate, UserProfile};

pub async fn fetch_profile(client: &ApiClient, user_id: &str) -> Result<UserProfile> {
    client
        .get(&format!("/api/users/{}", user_id))
        .await
        .with_context(|| format!("Failed to load profile {}", user_id))
}

/// Fetch the signed-in user's profile and refresh the session snapshot.
pub async fn sync_own_profile(client: &ApiClient) -> Result<UserProfile> {
    let me = client.user_id()?;
    let profile = fetch_profile(client, &me).await?;
    session::lock(client.session()).set_profile(profile.clone())?;
    Ok(profile)
}

/// Push a profile to the backend and store what it returns.
pub async fn push_profile(client: &ApiClient, profile: &UserProfile) -> Result<UserProfile> {
    let stored: UserProfile = client
        .put(&format!("/api/users/{}", profile.id), profile)
        .await
        .context("Failed to save profile")?;
    session::lock(client.session()).set_profile(stored.clone())?;
    Ok(stored)
}

/// Make sure the backend has a profile for a freshly signed-in user.
///
/// A missing profile (first sign-in) is created from the identity data.
pub async fn ensure_profile(
    client: &ApiClient,
    email: Option<&str>,
    display_name: Option<&str>,
) -> Result<UserProfile> {
    match sync_own_profile(client).await {
        Ok(profile) => Ok(profile),
        Err(e) if matches!(error::classify(&e), Some(ClientError::NotFound(_))) => {
            tracing::info!("No profile yet, creating one");
            let email = email.unwrap_or_default();
            let profile = UserProfile {
                id: client.user_id()?,
                email: email.to_string(),
                display_name: display_name
                    .map(str::to_string)
                    .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string()),
                role: Default::default(),
                bio: None,
                skills: Vec::new(),
                avatar_url: None,
            };
            push_profile(client, &profile).await
        }
        Err(e) => Err(e),
    }
}

/// Apply a partial update to the signed-in user's profile.
pub async fn update_profile(client: &ApiClient, update: &ProfileUpdate) -> Result<UserProfile> {
    let mut profile = sync_own_profile(client).await?;
    update.apply_to(&mut profile);
    push_profile(client, &profile).await
}

/// Show or edit the signed-in user's profile (prints to stdout).
pub async fn profile_command(client: &ApiClient, update: &ProfileUpdate) -> Result<()> {
    let profile = if update.is_empty() {
        sync_own_profile(client).await?
    } else {
        let profile = update_profile(client, update).await?;
        println!("Profile updated.");
        profile
    };

    print_profile(&profile);
    Ok(())
}

fn print_profile(profile: &UserProfile) {
    println!("Name:   {}", profile.display_name);
    println!("Email:  {}", profile.email);
    println!("Role:   {:?}", profile.role);
    println!("ID:     {}", profile.id);
    if !profile.skills.is_empty() {
        println!("Skills: {}", profile.skills.join(", "));
    }
    if let Some(ref bio) = profile.bio {
        println!();
        println!("{}", bio);
    }
}
