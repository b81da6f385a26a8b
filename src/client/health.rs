//! Backend liveness polling.
//!
//! The monitor probes `GET /auth/health` and publishes a tri-state snapshot
//! through a cloneable handle. The auth session reads the snapshot to gate
//! login submission; it never waits on the monitor.

use crate::client::{endpoint_url, APP_USER_AGENT};
use crate::error::Error;
use reqwest::Client;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;
use url::Url;

/// Default polling period.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(5);

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HealthStatus {
    /// No probe has completed yet.
    Checking = 0,
    Online = 1,
    Offline = 2,
}

impl HealthStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Online,
            2 => Self::Offline,
            _ => Self::Checking,
        }
    }
}

/// Cloneable snapshot of the latest probe result.
#[derive(Debug, Clone)]
pub struct HealthHandle(Arc<AtomicU8>);

impl HealthHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(HealthStatus::Checking as u8)))
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, status: HealthStatus) {
        self.0.store(status as u8, Ordering::Relaxed);
    }
}

pub struct HealthMonitor {
    http: Client,
    health_url: Url,
    handle: HealthHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// Build a monitor probing `<base>/auth/health`.
    ///
    /// # Errors
    /// Returns `Error::Config` when the probe URL or HTTP client cannot be
    /// constructed.
    pub fn new(base_url: &Url) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .connect_timeout(PROBE_TIMEOUT)
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|err| Error::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            health_url: endpoint_url(base_url, "/auth/health")?,
            handle: HealthHandle::new(),
            task: Mutex::new(None),
        })
    }

    /// Handle for readers of the latest snapshot.
    #[must_use]
    pub fn handle(&self) -> HealthHandle {
        self.handle.clone()
    }

    /// Probe once, update the snapshot, and return the result. Transport
    /// failures read as `Offline`; this never errors.
    pub async fn check_once(&self) -> HealthStatus {
        probe(&self.http, &self.health_url, &self.handle).await
    }

    /// Schedule recurring probes. Calling `start` while a poller is already
    /// running is a no-op.
    pub fn start(&self, period: Duration) {
        let mut slot = match self.task.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };

        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let http = self.http.clone();
        let url = self.health_url.clone();
        let handle = self.handle.clone();

        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                probe(&http, &url, &handle).await;
            }
        }));
    }

    /// Cancel the recurring probe. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut slot = match self.task.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(task) = slot.take() {
            task.abort();
        }
    }

    /// True while a poller task is scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        match self.task.lock() {
            Ok(slot) => slot.as_ref().is_some_and(|task| !task.is_finished()),
            Err(_) => false,
        }
    }
}

// The interval task must not outlive the host view.
impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pre-seeded handle for state machine tests.
#[cfg(test)]
pub(crate) fn test_handle(status: HealthStatus) -> HealthHandle {
    let handle = HealthHandle::new();
    handle.set(status);
    handle
}

async fn probe(http: &Client, url: &Url, handle: &HealthHandle) -> HealthStatus {
    let status = match http.get(url.clone()).send().await {
        Ok(response) if response.status().is_success() => HealthStatus::Online,
        Ok(response) => {
            debug!("health probe returned {}", response.status());
            HealthStatus::Offline
        }
        Err(err) => {
            debug!("health probe failed: {err}");
            HealthStatus::Offline
        }
    };

    handle.set(status);
    status
}
