//! Authentication module
//!
//! Signs users in with the hosted identity provider (email/password or
//! Google via the OAuth2 device flow) and keeps the resulting session in a
//! `SessionStore`.

pub mod identity;
pub mod oauth;
pub mod session;
pub mod tokens;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::api::{profile, ApiClient};
use crate::config::Config;
use crate::error::{self, ClientError};
use identity::IdentityClient;
use session::{Session, SessionStore};
use tokens::decode_claims;

/// How the user wants to sign in.
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub email: Option<String>,
    pub google: bool,
    pub signup: bool,
    pub force: bool,
}

/// Sign in and create the backend profile on first use
pub async fn login(opts: LoginOptions) -> Result<()> {
    let config = Config::load()?;
    let store = SessionStore::open()?.into_shared();

    if !opts.force {
        if let Some(current) = session::lock(&store).current() {
            if !current.id_token.is_expired() || current.refresh_token.is_some() {
                println!(
                    "Already signed in as {}. Use --force to sign in again.",
                    current.display_name()
                );
                return Ok(());
            }
        }
    }

    let identity = IdentityClient::new(&config.identity.api_key)?;

    let tokens = if opts.google {
        let access_token = oauth::google_access_token(&config.identity).await?;
        identity.sign_in_with_google(&access_token).await?
    } else {
        let email = match opts.email {
            Some(email) => email,
            None => tokio::task::spawn_blocking(|| prompt_line("Email: ")).await??,
        };
        let email = email.trim().to_string();
        if email.is_empty() {
            return Err(ClientError::Validation("email is required".to_string()).into());
        }
        let password = tokio::task::spawn_blocking(|| read_password("Password: ")).await??;
        if password.is_empty() {
            return Err(ClientError::Validation("password is required".to_string()).into());
        }

        if opts.signup {
            identity.sign_up(&email, &password).await?
        } else {
            identity.sign_in_with_password(&email, &password).await?
        }
    };

    let email = tokens.email.clone();
    let display_name = tokens.display_name.clone();
    session::lock(&store).sign_in(Session::from_tokens(tokens))?;

    let client = ApiClient::new(&config, store.clone());
    match profile::ensure_profile(&client, email.as_deref(), display_name.as_deref()).await {
        Ok(profile) => println!("Signed in as {} ({:?}).", profile.display_name, profile.role),
        Err(e) => {
            tracing::warn!("Profile sync after sign-in failed: {:#}", e);
            println!("Signed in, but the profile could not be loaded.");
            println!("  {}", error::notice(&e));
        }
    }
    Ok(())
}

/// Clear the stored session
pub async fn logout() -> Result<()> {
    let mut store = SessionStore::open()?;
    if store.current().is_none() {
        println!("Not signed in.");
        return Ok(());
    }
    store.sign_out()?;
    println!("Logged out.");
    Ok(())
}

fn format_epoch(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Display current auth status
pub async fn status() -> Result<()> {
    let store = SessionStore::open()?;
    println!("Session file: {}", store.path().display());

    let Some(session) = store.current() else {
        println!("Session:     none");
        println!("\nRun 'mentor-chat login' to authenticate.");
        return Ok(());
    };

    println!("User ID:     {}", session.user_id);
    if let Some(ref email) = session.email {
        println!("Email:       {}", email);
    }

    if session.id_token.is_expired() {
        println!("ID token:    expired");
    } else {
        println!("ID token:    valid");
    }
    // Prefer the token's own expiry over the locally computed one.
    let claims = decode_claims(&session.id_token.token);
    if let Some(exp) = claims.as_ref().and_then(|c| c.exp).or(session.id_token.expires_at) {
        println!("  expires_at: {}", format_epoch(exp));
    }
    if let Some(uid) = claims.as_ref().and_then(|c| c.uid()) {
        if uid != session.user_id {
            println!("  warning: token subject {} differs from session user", uid);
        }
    }

    match session.refresh_token {
        Some(_) => println!("Refresh tok: present"),
        None => println!("Refresh tok: none"),
    }
    match session.profile {
        Some(ref p) => println!("Profile:     {} ({:?})", p.display_name, p.role),
        None => println!("Profile:     not cached"),
    }

    Ok(())
}

/// Show the signed-in user, fetching the profile if none is cached
pub async fn whoami() -> Result<()> {
    let config = Config::load()?;
    let store = SessionStore::open()?.into_shared();
    let cached = session::lock(&store).require()?.profile.clone();

    let profile = match cached {
        Some(profile) => profile,
        None => {
            let client = ApiClient::new(&config, store.clone());
            profile::sync_own_profile(&client).await?
        }
    };

    println!("Name:  {}", profile.display_name);
    println!("Email: {}", profile.email);
    println!("Role:  {:?}", profile.role);
    println!("ID:    {}", profile.id);
    Ok(())
}

fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Read a password without echoing it.
fn read_password(prompt: &str) -> Result<String> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
    use crossterm::terminal;

    eprint!("{}", prompt);
    io::stderr().flush()?;

    terminal::enable_raw_mode()?;
    let result = (|| -> Result<String> {
        let mut password = String::new();
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            match key.code {
                KeyCode::Enter => return Ok(password),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Err(ClientError::Validation("sign-in cancelled".to_string()).into());
                }
                KeyCode::Backspace => {
                    password.pop();
                }
                KeyCode::Char(c) => password.push(c),
                _ => {}
            }
        }
    })();
    terminal::disable_raw_mode()?;
    eprintln!();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_epoch() {
        assert_eq!(format_epoch(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_epoch(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }
}
