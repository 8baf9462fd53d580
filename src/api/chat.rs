//! Chat history endpoints
//!
//! The backend owns message storage; this side only reads the roster and
//! thread history. Sending goes over the real-time channel.

use anyhow::{Context, Result};

use super::client::ApiClient;
use crate::models::{Contact, Message};

/// Contact roster for the signed-in user, as the backend orders it.
pub async fn fetch_contacts(client: &ApiClient) -> Result<Vec<Contact>> {
    let me = client.user_id()?;
    client
        .get(&format!("/api/chat/contacts/{}", me))
        .await
        .context("Failed to load contacts")
}

/// Full message history with `peer_id`, oldest first.
pub async fn fetch_history(client: &ApiClient, peer_id: &str) -> Result<Vec<Message>> {
    let me = client.user_id()?;
    let mut history: Vec<Message> = client
        .get(&format!("/api/chat/messages/{}/{}", me, peer_id))
        .await
        .with_context(|| format!("Failed to load messages with {}", peer_id))?;
    // Stable sort keeps server order for equal timestamps.
    history.sort_by_key(|m| m.timestamp);
    Ok(history)
}

/// List contacts (prints to stdout).
pub async fn list_contacts(client: &ApiClient) -> Result<()> {
    let contacts = fetch_contacts(client).await?;

    println!("\nContacts:");
    println!("{:-<60}", "");

    if contacts.is_empty() {
        println!("  (no conversations yet)");
        return Ok(());
    }

    for contact in &contacts {
        if contact.unread_count > 0 {
            println!("{} ({} unread)", contact.label(), contact.unread_count);
        } else {
            println!("{}", contact.label());
        }
        println!("  ID: {}", contact.id);

        if let Some(ref time) = contact.last_message_timestamp {
            println!("  Last: {}", time.format("%Y-%m-%d %H:%M"));
        }
        if let Some(ref preview) = contact.last_message_text {
            if !preview.trim().is_empty() {
                println!("  {}", preview.trim());
            }
        }

        println!();
    }

    Ok(())
}

/// Print the most recent `limit` messages with a peer.
pub async fn read_messages(client: &ApiClient, peer_id: &str, limit: usize) -> Result<()> {
    let me = client.user_id()?;
    let history = fetch_history(client, peer_id).await?;

    if history.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    let skip = history.len().saturating_sub(limit);
    for msg in history.iter().skip(skip) {
        let who = if msg.is_from(&me) { "you" } else { msg.sender_id.as_str() };
        println!(
            "[{}] {}: {}",
            msg.timestamp.format("%Y-%m-%d %H:%M"),
            who,
            msg.content
        );
    }

    Ok(())
}
