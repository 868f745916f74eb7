//! CampusDesk CLI - terminal front end for CampusDesk sessions.
//!
//! Stands in for the browser presentation layer: it restores the stored
//! session, logs in and out through the session façade, and reacts to the
//! navigation events the façade emits.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use campusdesk_core::{
    Config, HttpAuthBackend, LoginCredentials, SessionEvent, SessionManager, SessionState,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "Usage: campusdesk <status | login [username] | logout | watch>";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr (filtered by `RUST_LOG`, default `warn`) and to a daily
/// rolling file under the data directory. The returned guard flushes the
/// file writer and must be held for the life of the program.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "campusdesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    let log_dir = config.data_dir().ok().map(|dir| dir.join("logs"));
    let _log_guard = init_tracing(log_dir.as_deref());
    info!(storage = ?config.storage, api = %config.api_base_url, "CampusDesk CLI starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");

    let store = config.credential_store()?;
    let backend = HttpAuthBackend::new(config.api_base_url.clone())
        .context("Failed to create HTTP client")?;
    let (session, mut events) =
        SessionManager::new(store, Arc::new(backend), config.landing_path.clone());

    let state = session.initialize().await;

    match command {
        "status" => print_state(&state)?,
        "login" => login(&session, &mut config, args.get(1).cloned()).await?,
        "logout" => {
            session.logout().await;
            drain_events(&mut events);
        }
        "watch" => watch(&session, &mut events).await?,
        other => {
            eprintln!("Unknown command: {}\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_state(state: &SessionState) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

async fn login(session: &SessionManager, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username
        .or_else(|| std::env::var("CAMPUSDESK_USERNAME").ok())
        .or_else(|| config.last_username.clone())
    {
        Some(name) if !name.is_empty() => name,
        _ => prompt_username()?,
    };
    let password = match std::env::var("CAMPUSDESK_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    eprintln!("Authenticating...");
    match session.login(&LoginCredentials::new(username.clone(), password)).await {
        Ok(profile) => {
            config.last_username = Some(username);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            eprintln!(
                "Logged in as {} ({})",
                profile.display_name.as_deref().unwrap_or(&profile.user_id),
                profile.role
            );
            print_state(&session.state())
        }
        Err(e) => {
            let message = session
                .state()
                .error_message
                .as_ref()
                .map(|info| info.message.clone())
                .unwrap_or_else(|| e.to_string());
            Err(anyhow::anyhow!(message))
        }
    }
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

/// Print session events until the session ends
async fn watch(
    session: &SessionManager,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> Result<()> {
    if !session.state().is_authenticated {
        eprintln!("Not logged in.");
        return Ok(());
    }
    eprintln!("Session active; waiting for expiry...");

    while let Some(event) = events.recv().await {
        let done = handle_event(&event);
        if done {
            break;
        }
    }
    Ok(())
}

fn drain_events(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        handle_event(&event);
    }
}

/// React to a session event; returns true once navigation away from the
/// session has been requested.
fn handle_event(event: &SessionEvent) -> bool {
    match event {
        SessionEvent::Expired => {
            eprintln!("Session expired. Please log in again.");
            false
        }
        SessionEvent::Navigate { path } => {
            println!("-> {}", path);
            true
        }
    }
}
