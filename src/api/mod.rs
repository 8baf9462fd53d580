//! Backend REST API

pub mod chat;
pub mod client;
pub mod contact_form;
pub mod live;
pub mod mentors;
pub mod profile;

use std::sync::Arc;

use anyhow::Result;

pub use client::ApiClient;

use crate::auth::session::SessionStore;
use crate::config::Config;
use crate::error::ClientError;
use crate::models::{Message, MentorApplication, ProfileUpdate};
use crate::realtime::{self, RealtimeConfig};

/// Client built from the on-disk configuration and session.
pub fn connect() -> Result<ApiClient> {
    let config = Config::load()?;
    let session = SessionStore::open()?.into_shared();
    Ok(ApiClient::new(&config, session))
}

/// List contacts with unread counts
pub async fn list_contacts() -> Result<()> {
    chat::list_contacts(&connect()?).await
}

/// Read the thread with a peer
pub async fn read_messages(peer_id: &str, limit: usize) -> Result<()> {
    chat::read_messages(&connect()?, peer_id, limit).await
}

/// Real-time connection parameters for the signed-in user.
fn realtime_config(config: &Config, client: &ApiClient) -> Result<RealtimeConfig> {
    Ok(RealtimeConfig {
        url: config.socket_url().to_string(),
        user_id: client.user_id()?,
    })
}

/// Send one message over the real-time channel
pub async fn send_message(peer_id: &str, content: &str) -> Result<()> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ClientError::Validation("message is empty".into()).into());
    }

    let config = Config::load()?;
    let client = ApiClient::new(&config, SessionStore::open()?.into_shared());
    let rt = realtime_config(&config, &client)?;
    let token = client.bearer().await?;
    let message = Message::outgoing(&rt.user_id, peer_id, content);

    realtime::send_once(&rt, Some(&token), &message).await?;
    println!("Message sent to {}.", peer_id);
    Ok(())
}

/// Print live chat events for the signed-in user
pub async fn listen() -> Result<()> {
    let config = Config::load()?;
    let client = ApiClient::new(&config, SessionStore::open()?.into_shared());
    let rt = realtime_config(&config, &client)?;
    // Fail before connecting when signed out.
    client.bearer().await?;
    realtime::listen(rt, Arc::new(client)).await
}

/// Show or update the signed-in user's profile
pub async fn profile(update: ProfileUpdate) -> Result<()> {
    profile::profile_command(&connect()?, &update).await
}

/// Browse the mentor directory
pub async fn list_mentors(skill: Option<&str>, available_only: bool) -> Result<()> {
    mentors::list_mentors(&connect()?, skill, available_only).await
}

/// Show one mentor
pub async fn show_mentor(id: &str) -> Result<()> {
    mentors::show_mentor(&connect()?, id).await
}

/// Apply to become a mentor
pub async fn become_mentor(application: MentorApplication) -> Result<()> {
    let client = connect()?;
    let mentor = mentors::apply(&client, &application).await?;
    // The role change lands on the profile; refresh the snapshot.
    if let Err(e) = profile::sync_own_profile(&client).await {
        tracing::warn!("Could not refresh profile after application: {:#}", e);
    }
    println!("Application submitted. Mentor ID: {}", mentor.id);
    Ok(())
}

/// Submit the public contact form
pub async fn contact_us(name: &str, email: &str, message: &str) -> Result<()> {
    let form = contact_form::ContactForm::new(name, email, message);
    contact_form::submit(&connect()?, &form).await
}
