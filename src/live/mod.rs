//! Live video sessions
//!
//! The backend signs a join credential; a `MeetingSdk` implementation does
//! the actual conferencing. The shipped implementation hands a web-client
//! join URL to an external program.

use anyhow::{Context, Result};
use base64::Engine;
use futures::future::BoxFuture;
use tokio::process::{Child, Command};

use crate::api::{self, live::request_join_credential, ApiClient};
use crate::auth::session;
use crate::config::{Config, LiveSettings};
use crate::error::ClientError;

const SDK: &str = "meeting SDK";

/// Role requested in the join credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingRole {
    Attendee,
    Host,
}

impl MeetingRole {
    fn code(self) -> u8 {
        match self {
            MeetingRole::Attendee => 0,
            MeetingRole::Host => 1,
        }
    }
}

/// A validated request to join a meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub meeting_number: String,
    pub passcode: String,
    pub role: MeetingRole,
}

impl JoinRequest {
    /// Normalize and validate user input. Spaces and dashes in the meeting
    /// number are ignored.
    pub fn new(meeting_number: &str, passcode: &str, role: MeetingRole) -> Result<Self, ClientError> {
        let digits: String = meeting_number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if !(9..=11).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ClientError::Validation(format!(
                "meeting number must be 9 to 11 digits (got '{}')",
                meeting_number
            )));
        }
        if passcode.trim().is_empty() {
            return Err(ClientError::Validation("passcode is required".to_string()));
        }
        Ok(Self {
            meeting_number: digits,
            passcode: passcode.trim().to_string(),
            role,
        })
    }
}

/// Everything an SDK needs to join.
#[derive(Debug, Clone)]
pub struct JoinParams {
    pub meeting_number: String,
    pub passcode: String,
    pub display_name: String,
    pub signature: String,
    pub sdk_key: Option<String>,
}

/// Conferencing backend.
pub trait MeetingSdk {
    fn join(&mut self, params: &JoinParams) -> Result<()>;

    /// Resolve when the session ends on the SDK side.
    fn wait(&mut self) -> BoxFuture<'_, Result<()>>;

    fn leave(&mut self) -> Result<()>;
}

/// Fill `{meeting}`, `{passcode}` and `{name}` into a join URL template.
pub fn build_join_url(template: &str, params: &JoinParams) -> String {
    let passcode: String = url::form_urlencoded::byte_serialize(params.passcode.as_bytes()).collect();
    let name = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(params.display_name.as_bytes());
    template
        .replace("{meeting}", &params.meeting_number)
        .replace("{passcode}", &passcode)
        .replace("{name}", &name)
}

/// Opens the web client through an external program (a browser opener by
/// default) and passes the credential in its environment.
pub struct ExternalLauncher {
    template: String,
    program: String,
    child: Option<Child>,
}

impl ExternalLauncher {
    pub fn new(settings: &LiveSettings) -> Self {
        Self {
            template: settings.join_url_template.clone(),
            program: settings.launcher.clone(),
            child: None,
        }
    }
}

impl MeetingSdk for ExternalLauncher {
    fn join(&mut self, params: &JoinParams) -> Result<()> {
        let url = build_join_url(&self.template, params);
        tracing::info!("Launching {} for meeting {}", self.program, params.meeting_number);

        let child = Command::new(&self.program)
            .arg(&url)
            .env("MEETING_SIGNATURE", &params.signature)
            .env("MEETING_SDK_KEY", params.sdk_key.as_deref().unwrap_or_default())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClientError::third_party(SDK, format!("failed to start {}: {}", self.program, e)))?;

        self.child = Some(child);
        Ok(())
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let Some(child) = self.child.as_mut() else {
                return Err(ClientError::third_party(SDK, "not joined").into());
            };
            let status = child.wait().await.context("Failed to wait for launcher")?;
            if !status.success() {
                return Err(ClientError::third_party(SDK, format!("launcher exited with {}", status)).into());
            }
            // Openers like xdg-open exit once the browser has the URL; the
            // session then lives in the browser and only Ctrl-C ends it here.
            tracing::debug!("Launcher handed off the session");
            std::future::pending::<()>().await;
            Ok(())
        })
    }

    fn leave(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                // Already exited.
                tracing::debug!("Launcher not killed: {}", e);
            }
        }
        Ok(())
    }
}

/// Join, wait for the session to end (or Ctrl-C), then always leave.
pub async fn run_session<S: MeetingSdk>(sdk: &mut S, params: &JoinParams) -> Result<()> {
    sdk.join(params)?;

    let outcome = tokio::select! {
        result = sdk.wait() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, leaving meeting");
            Ok(())
        }
    };

    let left = sdk.leave();
    outcome.and(left)
}

/// Fetch a join credential and run the session with `sdk`.
pub async fn join<S: MeetingSdk>(
    client: &ApiClient,
    sdk: &mut S,
    request: &JoinRequest,
    display_name: &str,
) -> Result<()> {
    let credential =
        request_join_credential(client, &request.meeting_number, request.role.code()).await?;

    let params = JoinParams {
        meeting_number: request.meeting_number.clone(),
        passcode: request.passcode.clone(),
        display_name: display_name.to_string(),
        signature: credential.signature,
        sdk_key: credential.sdk_key,
    };
    run_session(sdk, &params).await
}

/// `live` command: join a meeting through the configured launcher.
pub async fn live(meeting: &str, passcode: &str, host: bool) -> Result<()> {
    let role = if host { MeetingRole::Host } else { MeetingRole::Attendee };
    let request = JoinRequest::new(meeting, passcode, role)?;

    let config = Config::load()?;
    let client = api::connect()?;
    let display_name = session::lock(client.session())
        .require()?
        .display_name()
        .to_string();

    let mut launcher = ExternalLauncher::new(&config.live);
    println!("Joining meeting {}... (Ctrl-C to leave)", request.meeting_number);
    join(&client, &mut launcher, &request, &display_name).await?;
    println!("Left meeting.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> JoinParams {
        JoinParams {
            meeting_number: "123456789".to_string(),
            passcode: "a b&c".to_string(),
            display_name: "Dana".to_string(),
            signature: "sig".to_string(),
            sdk_key: None,
        }
    }

    #[test]
    fn test_join_request_validation() {
        let req = JoinRequest::new("123 456-7890", " pass ", MeetingRole::Host).unwrap();
        assert_eq!(req.meeting_number, "1234567890");
        assert_eq!(req.passcode, "pass");

        assert!(JoinRequest::new("12345678", "p", MeetingRole::Attendee).is_err());
        assert!(JoinRequest::new("123456789012", "p", MeetingRole::Attendee).is_err());
        assert!(JoinRequest::new("12345678a", "p", MeetingRole::Attendee).is_err());
        match JoinRequest::new("123456789", "  ", MeetingRole::Attendee) {
            Err(ClientError::Validation(msg)) => assert!(msg.contains("passcode")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_build_join_url() {
        let url = build_join_url(
            "https://web.example.com/wc/{meeting}/join?pwd={passcode}&un={name}",
            &params(),
        );
        assert_eq!(
            url,
            "https://web.example.com/wc/123456789/join?pwd=a+b%26c&un=RGFuYQ"
        );
    }

    #[derive(Default)]
    struct FakeSdk {
        calls: Vec<&'static str>,
        fail_wait: bool,
    }

    impl MeetingSdk for FakeSdk {
        fn join(&mut self, _params: &JoinParams) -> Result<()> {
            self.calls.push("join");
            Ok(())
        }

        fn wait(&mut self) -> BoxFuture<'_, Result<()>> {
            self.calls.push("wait");
            let fail = self.fail_wait;
            Box::pin(async move {
                if fail {
                    Err(ClientError::third_party(SDK, "dropped").into())
                } else {
                    Ok(())
                }
            })
        }

        fn leave(&mut self) -> Result<()> {
            self.calls.push("leave");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_session_always_leaves() {
        let mut sdk = FakeSdk::default();
        run_session(&mut sdk, &params()).await.unwrap();
        assert_eq!(sdk.calls, vec!["join", "wait", "leave"]);

        let mut failing = FakeSdk {
            fail_wait: true,
            ..Default::default()
        };
        assert!(run_session(&mut failing, &params()).await.is_err());
        assert_eq!(failing.calls, vec!["join", "wait", "leave"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launcher_reports_failed_program() {
        let mut launcher = ExternalLauncher::new(&LiveSettings {
            join_url_template: "x/{meeting}".to_string(),
            launcher: "false".to_string(),
        });
        launcher.join(&params()).unwrap();
        let err = launcher.wait().await.unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(ClientError::ThirdParty { .. })
        ));
        launcher.leave().unwrap();
    }
}
