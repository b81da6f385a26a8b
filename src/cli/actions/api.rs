//! Authenticated API actions: registration, projects, audit log, and the
//! steganography endpoints. Thin wrappers that render JSON results; a 401
//! expires the local session before the error is reported.

use crate::auth::store::{load_or_create_device_id, FileSessionStore};
use crate::auth::AuthSession;
use crate::cli::globals::GlobalArgs;
use crate::client::health::HealthMonitor;
use crate::client::ApiClient;
use crate::error::Error;
use anyhow::{Context, Result};
use base64ct::{Base64, Encoding};
use secrecy::SecretString;
use serde_json::Value;
use std::path::Path;

struct Ctx {
    client: ApiClient<FileSessionStore>,
    session: AuthSession<ApiClient<FileSessionStore>, FileSessionStore>,
}

fn build(globals: &GlobalArgs) -> Result<Ctx> {
    let store = FileSessionStore::new(&globals.state_dir);
    let device_id = load_or_create_device_id(&globals.state_dir)?;
    let client = ApiClient::new(globals.api_url.clone(), device_id, store.clone())?;
    let monitor = HealthMonitor::new(&globals.api_url)?;
    let session = AuthSession::new(client.clone(), store, monitor.handle());
    session.restore_session();

    Ok(Ctx { client, session })
}

/// Resolve an API result, expiring the local session on a 401.
fn settle<T>(result: Result<T, Error>, ctx: &Ctx) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(Error::SessionExpired) => {
            ctx.session.expire()?;
            anyhow::bail!("session expired, sign in again with `sentinela login`")
        }
        Err(err) => Err(err.into()),
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(_) => println!("{value}"),
    }
}

fn read_image_base64(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Base64::encode_string(&bytes))
}

/// Register a new user account, prompting for the initial password.
///
/// # Errors
/// Returns an error when input cannot be read or the backend declines.
pub async fn register(
    username: String,
    email: String,
    department: Option<String>,
    globals: &GlobalArgs,
) -> Result<()> {
    let ctx = build(globals)?;

    eprint!("Password for {username}: ");
    use std::io::{BufRead, Write};
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read input")?;
    let password = SecretString::from(line.trim().to_string());

    let result = ctx
        .client
        .register(&username, &password, &email, department.as_deref())
        .await;
    settle(result, &ctx)?;

    println!("User registered successfully.");
    Ok(())
}

/// List projects the session is scoped to.
///
/// # Errors
/// Returns an error when the call fails or the session is expired.
pub async fn projects(globals: &GlobalArgs) -> Result<()> {
    let ctx = build(globals)?;
    let result = ctx.client.projects().await;
    print_json(&settle(result, &ctx)?);
    Ok(())
}

/// Fetch the access audit log.
///
/// # Errors
/// Returns an error when the call fails or the session is expired.
pub async fn audit(globals: &GlobalArgs) -> Result<()> {
    let ctx = build(globals)?;
    let result = ctx.client.audit_logs().await;
    print_json(&settle(result, &ctx)?);
    Ok(())
}

/// Embed a message into a cover image.
///
/// # Errors
/// Returns an error when the file cannot be read, the call fails, or the
/// session is expired.
pub async fn stego_hide(cover: &Path, message: &str, globals: &GlobalArgs) -> Result<()> {
    let ctx = build(globals)?;
    let cover_image = read_image_base64(cover)?;
    let result = ctx.client.stego_hide(&cover_image, message).await;
    print_json(&settle(result, &ctx)?);
    Ok(())
}

/// Extract a hidden message from a stego image.
///
/// # Errors
/// Returns an error when the file cannot be read, the call fails, or the
/// session is expired.
pub async fn stego_extract(image: &Path, globals: &GlobalArgs) -> Result<()> {
    let ctx = build(globals)?;
    let stego_image = read_image_base64(image)?;
    let result = ctx.client.stego_extract(&stego_image).await;
    let body = settle(result, &ctx)?;

    // surface just the message when the backend wraps it
    match body.get("message").and_then(Value::as_str) {
        Some(message) => println!("{message}"),
        None => print_json(&body),
    }

    Ok(())
}
