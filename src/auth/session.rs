//! Signed-in session: owned by one `SessionStore`, persisted as a side effect
//!
//! The store is the source of truth while the program runs. Every write is
//! mirrored to `session.toml` and published to subscribers, so components
//! showing the user's name or role stay in sync without polling the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::identity::AuthTokens;
use super::tokens::StoredToken;
use crate::config::Config;
use crate::error::ClientError;
use crate::models::UserProfile;

/// The persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub id_token: StoredToken,
    pub refresh_token: Option<String>,
    /// Cached snapshot of the backend profile.
    pub profile: Option<UserProfile>,
}

impl Session {
    pub fn from_tokens(tokens: AuthTokens) -> Self {
        Self {
            user_id: tokens.user_id,
            email: tokens.email,
            id_token: StoredToken::new(tokens.id_token, tokens.expires_in),
            refresh_token: Some(tokens.refresh_token),
            profile: None,
        }
    }

    /// Best available name for display.
    pub fn display_name(&self) -> &str {
        self.profile
            .as_ref()
            .map(|p| p.display_name.as_str())
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.user_id)
    }
}

/// Session store shared between the UI and background tasks.
pub type SharedSession = Arc<Mutex<SessionStore>>;

/// Lock a shared store, recovering from a poisoned mutex.
pub fn lock(shared: &SharedSession) -> MutexGuard<'_, SessionStore> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct SessionStore {
    path: PathBuf,
    current: Option<Session>,
    tx: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Open the store at the default location.
    pub fn open() -> Result<Self> {
        Self::open_at(Config::session_path()?)
    }

    /// Open the store backed by `path`. An unreadable file counts as signed out.
    pub fn open_at(path: PathBuf) -> Result<Self> {
        let current = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read session file")?;
            match toml::from_str::<Session>(&content) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable session file: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let (tx, _) = watch::channel(current.clone());
        Ok(Self { path, current, tx })
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// The session, or an authentication error telling the user to sign in.
    pub fn require(&self) -> Result<&Session> {
        self.current.as_ref().ok_or_else(|| {
            ClientError::Auth("Not signed in. Run 'mentor-chat login'.".to_string()).into()
        })
    }

    pub fn user_id(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.user_id.as_str())
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.current.as_ref().and_then(|s| s.profile.as_ref())
    }

    /// Receive every future change to the session.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    pub fn sign_in(&mut self, session: Session) -> Result<()> {
        tracing::info!("Signed in as {}", session.user_id);
        self.commit(Some(session))
    }

    /// Store refreshed tokens. A refresh for a different user is rejected.
    pub fn update_token(&mut self, tokens: AuthTokens) -> Result<()> {
        let mut session = self.require()?.clone();
        if session.user_id != tokens.user_id {
            return Err(ClientError::Auth(format!(
                "Refreshed token belongs to {} (expected {})",
                tokens.user_id, session.user_id
            ))
            .into());
        }
        session.id_token = StoredToken::new(tokens.id_token, tokens.expires_in);
        session.refresh_token = Some(tokens.refresh_token);
        if tokens.email.is_some() {
            session.email = tokens.email;
        }
        self.commit(Some(session))
    }

    /// Replace the cached profile snapshot.
    pub fn set_profile(&mut self, profile: UserProfile) -> Result<()> {
        let mut session = self.require()?.clone();
        session.profile = Some(profile);
        self.commit(Some(session))
    }

    /// Forget the session and delete the file.
    pub fn sign_out(&mut self) -> Result<()> {
        self.commit(None)
    }

    fn commit(&mut self, next: Option<Session>) -> Result<()> {
        match next {
            Some(ref session) => self.persist(session)?,
            None => {
                if self.path.exists() {
                    fs::remove_file(&self.path).context("Failed to remove session file")?;
                }
            }
        }
        self.current = next;
        self.tx.send_replace(self.current.clone());
        Ok(())
    }

    fn persist(&self, session: &Session) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(session).context("Failed to serialize session")?;
        fs::write(&self.path, content).context("Failed to write session file")?;

        // Set restrictive permissions on session file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms).context("Failed to set session permissions")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn tokens(user: &str, id_token: &str) -> AuthTokens {
        AuthTokens {
            user_id: user.to_string(),
            email: Some(format!("{}@example.com", user)),
            display_name: None,
            id_token: id_token.to_string(),
            refresh_token: format!("refresh-{}", id_token),
            expires_in: Some(3600),
        }
    }

    fn profile(id: &str, name: &str) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            display_name: name.to_string(),
            role: Role::Mentee,
            bio: None,
            skills: vec!["rust".to_string()],
            avatar_url: None,
        }
    }

    #[test]
    fn test_sign_in_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg/session.toml");

        let mut store = SessionStore::open_at(path.clone()).unwrap();
        assert!(store.current().is_none());
        assert!(store.require().is_err());

        store
            .sign_in(Session::from_tokens(tokens("u1", "tok-1")))
            .unwrap();
        store.set_profile(profile("u1", "Uma")).unwrap();
        assert!(path.exists());

        let reopened = SessionStore::open_at(path.clone()).unwrap();
        let session = reopened.current().unwrap();
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.id_token.token, "tok-1");
        assert_eq!(session.display_name(), "Uma");
        assert_eq!(reopened.profile().unwrap().skills, vec!["rust"]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_sign_out_removes_file_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        let mut store = SessionStore::open_at(path.clone()).unwrap();
        let mut rx = store.subscribe();

        store
            .sign_in(Session::from_tokens(tokens("u1", "tok-1")))
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().user_id, "u1");

        store.sign_out().unwrap();
        assert!(!path.exists());
        assert!(rx.borrow_and_update().is_none());
        assert!(store.user_id().is_none());
    }

    #[test]
    fn test_update_token_keeps_profile() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::open_at(dir.path().join("s.toml")).unwrap();
        store
            .sign_in(Session::from_tokens(tokens("u1", "old")))
            .unwrap();
        store.set_profile(profile("u1", "Uma")).unwrap();

        store.update_token(tokens("u1", "new")).unwrap();
        let session = store.current().unwrap();
        assert_eq!(session.id_token.token, "new");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-new"));
        assert_eq!(session.display_name(), "Uma");

        assert!(store.update_token(tokens("intruder", "x")).is_err());
        assert_eq!(store.current().unwrap().id_token.token, "new");
    }

    #[test]
    fn test_corrupt_file_means_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let store = SessionStore::open_at(path).unwrap();
        assert!(store.current().is_none());
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut session = Session::from_tokens(tokens("u1", "t"));
        assert_eq!(session.display_name(), "u1@example.com");
        session.email = None;
        assert_eq!(session.display_name(), "u1");
        session.profile = Some(profile("u1", ""));
        assert_eq!(session.display_name(), "u1");
    }
}
