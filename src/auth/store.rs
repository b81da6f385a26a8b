//! Durable persistence for the bearer session token.
//!
//! One store object owns one token slot under one canonical path. Both the
//! auth session and the API client receive the same injected store, so login
//! and logout always read and clear the same slot.

use crate::error::Error;
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Filename of the single token slot inside the state directory.
const TOKEN_FILE: &str = "session_token";
/// Filename of the per-installation device identifier.
const DEVICE_ID_FILE: &str = "device_id";

/// Opaque bearer token issued by the backend after MFA verification.
#[derive(Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    #[must_use]
    pub fn new(raw: String) -> Self {
        Self(SecretString::from(raw))
    }

    /// Reveal the raw token. Callers must only use this to build the
    /// `Authorization` header or to write the persisted slot.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken([redacted])")
    }
}

/// Single-slot token persistence. All operations are synchronous.
pub trait SessionStore {
    /// Current token, or `None` when no session is persisted.
    fn get(&self) -> Option<SessionToken>;

    /// Overwrite the slot unconditionally.
    ///
    /// # Errors
    /// Returns `Error::Store` when the slot cannot be written.
    fn set(&self, token: &SessionToken) -> Result<(), Error>;

    /// Empty the slot. Clearing an already-empty slot is not an error.
    ///
    /// # Errors
    /// Returns `Error::Store` when the slot cannot be removed.
    fn clear(&self) -> Result<(), Error>;
}

/// Token slot backed by a file in the client state directory, surviving
/// process restarts. Written with mode 0600 on unix.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(TOKEN_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<SessionToken> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(SessionToken::new(trimmed.to_string()))
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!("unreadable session slot {}: {err}", self.path.display());
                None
            }
        }
    }

    fn set(&self, token: &SessionToken) -> Result<(), Error> {
        write_private(&self.path, token.expose())
    }

    fn clear(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Store(format!(
                "failed to clear {}: {err}",
                self.path.display()
            ))),
        }
    }
}

/// In-memory token slot for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    slot: std::sync::Arc<std::sync::Mutex<Option<String>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<SessionToken> {
        self.slot
            .lock()
            .ok()?
            .as_ref()
            .map(|raw| SessionToken::new(raw.clone()))
    }

    fn set(&self, token: &SessionToken) -> Result<(), Error> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::Store("poisoned memory slot".to_string()))?;
        *slot = Some(token.expose().to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::Store("poisoned memory slot".to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// Default state directory: `$SENTINELA_STATE_DIR` if set, otherwise
/// `~/.config/sentinela`.
///
/// # Errors
/// Returns `Error::Config` when no home directory can be determined.
pub fn default_state_dir() -> Result<PathBuf, Error> {
    if let Ok(dir) = std::env::var("SENTINELA_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join("sentinela"))
        .ok_or_else(|| Error::Config("could not determine home directory".to_string()))
}

/// Stable per-installation device identifier, created on first use and
/// persisted next to the token slot.
///
/// # Errors
/// Returns `Error::Store` when the identifier cannot be read or written.
pub fn load_or_create_device_id(state_dir: &Path) -> Result<String, Error> {
    let path = state_dir.join(DEVICE_ID_FILE);

    match fs::read_to_string(&path) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(Error::Store(format!(
                "failed to read {}: {err}",
                path.display()
            )))
        }
    }

    let device_id = format!("sec-{}", Uuid::new_v4());
    write_private(&path, &device_id)?;

    Ok(device_id)
}

fn write_private(path: &Path, contents: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::Store(format!("failed to create {}: {err}", parent.display())))?;
    }

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|err| Error::Store(format!("failed to open {}: {err}", path.display())))?;
        file.write_all(contents.as_bytes())
            .map_err(|err| Error::Store(format!("failed to write {}: {err}", path.display())))?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)
            .map_err(|err| Error::Store(format!("failed to write {}: {err}", path.display())))?;
    }

    Ok(())
}
