//! mentor-chat - terminal client for the mentorship platform
//!
//! Direct chat with mentors and mentees, the mentor directory, profile
//! management and live-session launch, from the command line or a TUI.

mod api;
mod auth;
mod config;
mod error;
mod live;
mod models;
mod realtime;
mod sync;
mod tui;

use std::fs::{self, File};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::models::{MentorApplication, ProfileUpdate, Role};

#[derive(Parser)]
#[command(name = "mentor-chat")]
#[command(about = "Terminal client for the mentorship platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in (email/password or Google)
    Login {
        /// Account email; prompted for when omitted
        #[arg(short, long)]
        email: Option<String>,

        /// Sign in with a Google account (device code flow)
        #[arg(long, conflicts_with_all = ["email", "signup"])]
        google: bool,

        /// Create a new account instead of signing in
        #[arg(long)]
        signup: bool,

        /// Sign in again even if a session exists
        #[arg(short, long)]
        force: bool,
    },

    /// Sign out and delete the stored session
    Logout,

    /// Show current authentication status
    Status,

    /// Show the signed-in user's profile
    Whoami,

    /// Show or update your profile
    Profile {
        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Short biography
        #[arg(long)]
        bio: Option<String>,

        /// Comma-separated skills
        #[arg(long, value_delimiter = ',')]
        skills: Option<Vec<String>>,

        /// mentee or mentor
        #[arg(long)]
        role: Option<Role>,
    },

    /// Browse the mentor directory
    Mentors {
        /// Only mentors with this expertise
        #[arg(short, long)]
        skill: Option<String>,

        /// Only mentors accepting mentees
        #[arg(short, long)]
        available: bool,
    },

    /// Show one mentor
    Mentor {
        /// Mentor ID (from `mentors` output)
        id: String,
    },

    /// Apply to become a mentor
    BecomeMentor {
        /// Headline, e.g. "Senior Rust engineer"
        #[arg(long)]
        title: String,

        /// What you can help with
        #[arg(long)]
        bio: String,

        /// Comma-separated areas of expertise
        #[arg(long, value_delimiter = ',', required = true)]
        expertise: Vec<String>,
    },

    /// List chat contacts
    Contacts,

    /// Read the conversation with a contact
    Read {
        /// Peer user ID (from `contacts` output)
        peer_id: String,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Send a message
    Send {
        /// Peer user ID
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,
    },

    /// Print live chat events until Ctrl-C
    Listen,

    /// Send a message to the platform team (no sign-in needed)
    ContactUs {
        /// Your name
        #[arg(long)]
        name: String,

        /// Reply address
        #[arg(long)]
        email: String,

        /// Message body
        message: String,
    },

    /// Join a live mentoring session
    Live {
        /// Meeting number
        #[arg(short, long)]
        meeting: String,

        /// Meeting passcode
        #[arg(short, long)]
        passcode: String,

        /// Join as host
        #[arg(long)]
        host: bool,
    },

    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },

    /// Launch the terminal user interface
    Tui,
}

/// Logs go to stderr, except in the TUI where they would corrupt the screen.
fn init_logging(verbose: bool, to_file: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());

    if to_file {
        let dir = Config::data_dir()?;
        fs::create_dir_all(&dir).context("Failed to create data directory")?;
        let file = File::options()
            .create(true)
            .append(true)
            .open(dir.join("mentor-chat.log"))
            .context("Failed to open log file")?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
    Ok(())
}

fn init_config() -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() {
        println!("Config already exists at {}", path.display());
    } else {
        Config::default().save_to(&path)?;
        println!("Wrote default config to {}", path.display());
    }
    Ok(())
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Login {
            email,
            google,
            signup,
            force,
        } => {
            auth::login(auth::LoginOptions {
                email,
                google,
                signup,
                force,
            })
            .await
        }
        Commands::Logout => auth::logout().await,
        Commands::Status => auth::status().await,
        Commands::Whoami => auth::whoami().await,
        Commands::Profile {
            name,
            bio,
            skills,
            role,
        } => {
            api::profile(ProfileUpdate {
                display_name: name,
                bio,
                skills,
                role,
            })
            .await
        }
        Commands::Mentors { skill, available } => {
            api::list_mentors(skill.as_deref(), available).await
        }
        Commands::Mentor { id } => api::show_mentor(&id).await,
        Commands::BecomeMentor {
            title,
            bio,
            expertise,
        } => {
            api::become_mentor(MentorApplication {
                title,
                bio,
                expertise,
            })
            .await
        }
        Commands::Contacts => api::list_contacts().await,
        Commands::Read { peer_id, limit } => api::read_messages(&peer_id, limit).await,
        Commands::Send { to, message } => {
            tracing::info!("Sending message...");
            api::send_message(&to, &message).await
        }
        Commands::Listen => api::listen().await,
        Commands::ContactUs {
            name,
            email,
            message,
        } => api::contact_us(&name, &email, &message).await,
        Commands::Live {
            meeting,
            passcode,
            host,
        } => live::live(&meeting, &passcode, host).await,
        Commands::Config { init } => {
            if init {
                init_config()?;
            }
            config::show()
        }
        Commands::Tui => tui::run().await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, matches!(cli.command, Commands::Tui)) {
        eprintln!("{}", error::notice(&e));
        std::process::exit(1);
    }

    if let Err(e) = dispatch(cli.command).await {
        tracing::debug!("Command failed: {:?}", e);
        eprintln!("{}", error::notice(&e));
        std::process::exit(1);
    }
}
