//! Session actions: the interactive two-step login, logout, and status.
//!
//! This layer is the driving side of the auth state machine: it renders
//! state and errors, and owns the prompt loop. Protocol decisions stay in
//! `crate::auth`.

use crate::auth::store::{load_or_create_device_id, FileSessionStore};
use crate::auth::{AuthSession, AuthState};
use crate::cli::globals::GlobalArgs;
use crate::client::health::{HealthMonitor, HealthStatus, DEFAULT_POLL_PERIOD};
use crate::client::ApiClient;
use crate::error::Error;
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::io::{BufRead, Write};

/// Failed code entries tolerated before the attempt is abandoned.
const MAX_OTP_TRIES: u32 = 3;

fn build_client(globals: &GlobalArgs) -> Result<(ApiClient<FileSessionStore>, FileSessionStore)> {
    let store = FileSessionStore::new(&globals.state_dir);
    let device_id = load_or_create_device_id(&globals.state_dir)?;
    let client = ApiClient::new(globals.api_url.clone(), device_id, store.clone())?;
    Ok((client, store))
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    std::io::stderr().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read input")?;

    Ok(line.trim().to_string())
}

/// Run the interactive login flow.
///
/// # Errors
/// Returns an error when the backend is offline, input cannot be read, or
/// the attempt is exhausted or cancelled.
pub async fn login(username: Option<String>, globals: &GlobalArgs) -> Result<()> {
    let (client, store) = build_client(globals)?;
    let monitor = HealthMonitor::new(&globals.api_url)?;
    let session = AuthSession::new(client, store, monitor.handle());

    if session.restore_session() == AuthState::Authenticated {
        println!("Already signed in. Run `sentinela logout` to end the session first.");
        return Ok(());
    }

    if monitor.check_once().await != HealthStatus::Online {
        bail!("security engine offline, please wait for the backend to start");
    }
    // keep the snapshot fresh while the user types
    monitor.start(DEFAULT_POLL_PERIOD);

    let username = match username {
        Some(username) => username,
        None => prompt("Username")?,
    };
    let password = SecretString::from(prompt("Password")?);

    let provisioning = session.submit_credentials(&username, &password).await?;

    eprintln!();
    eprintln!("Two-factor verification (step 2 of 2)");
    if let Some(uri) = &provisioning.otpauth_uri {
        eprintln!("Provision your authenticator app with: {uri}");
    }
    if let Some(secret) = &provisioning.secret {
        eprintln!("Manual entry secret: {secret}");
    }
    eprintln!("A QR image is available from the backend provisioning endpoint.");
    eprintln!();

    let mut tries = 0;
    while tries < MAX_OTP_TRIES {
        let code = prompt("One-time code (empty to go back)")?;

        if code.is_empty() {
            session.cancel();
            monitor.stop();
            println!("Login cancelled.");
            return Ok(());
        }

        match session.submit_otp(&code).await {
            Ok(()) => {
                monitor.stop();
                println!("Session established. Welcome, {username}.");
                return Ok(());
            }
            Err(err @ Error::Validation(_)) => {
                // malformed code; does not burn a backend attempt
                eprintln!("{err}");
            }
            Err(err @ (Error::Rejected(_) | Error::Connectivity(_))) => {
                tries += 1;
                eprintln!("{err}");
            }
            Err(err) => {
                session.cancel();
                monitor.stop();
                return Err(err.into());
            }
        }
    }

    session.cancel();
    monitor.stop();
    bail!("too many failed verification attempts, start over with `sentinela login`");
}

/// End the session and clear the persisted token.
///
/// # Errors
/// Returns an error when the token slot cannot be cleared.
pub async fn logout(globals: &GlobalArgs) -> Result<()> {
    let (client, store) = build_client(globals)?;
    let monitor = HealthMonitor::new(&globals.api_url)?;
    let session = AuthSession::new(client, store, monitor.handle());

    session.restore_session();
    session.logout()?;
    println!("Signed out.");

    Ok(())
}

/// Print session, backend, and client status.
///
/// # Errors
/// Returns an error when the client cannot be constructed.
pub async fn status(globals: &GlobalArgs) -> Result<()> {
    let (client, store) = build_client(globals)?;
    let monitor = HealthMonitor::new(&globals.api_url)?;
    let backend = monitor.check_once().await;

    let session = AuthSession::new(client.clone(), store, monitor.handle());
    let state = session.restore_session();

    println!("sentinela {} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH);
    println!("backend:  {} ({})", backend.as_str(), globals.api_url);
    println!("session:  {}", state.as_str());
    println!("device:   {}", client.device_id());

    Ok(())
}

/// Probe backend liveness once and report the result.
///
/// # Errors
/// Returns an error when the monitor cannot be constructed; an offline
/// backend is a reported status, not an error.
pub async fn health(globals: &GlobalArgs) -> Result<()> {
    let monitor = HealthMonitor::new(&globals.api_url)?;
    let status = monitor.check_once().await;
    println!("{}", status.as_str());

    if status != HealthStatus::Online {
        std::process::exit(1);
    }

    Ok(())
}
