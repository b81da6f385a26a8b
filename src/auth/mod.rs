//! Login session state machine.
//!
//! Flow Overview:
//! - `submit_credentials` gates on backend health and non-empty input, binds
//!   the attempt to a fresh PKCE challenge, and asks the identity backend to
//!   provision MFA for the user.
//! - `submit_otp` verifies the 6-digit code and, on success, persists the
//!   issued bearer token through the injected store.
//! - `cancel`, `logout`, and `expire` drop back to `Unauthenticated`;
//!   `restore_session` re-derives the state from the persisted token alone.
//!
//! Credentials and MFA are separate states so a leaked password never alone
//! yields access; each step is independently retriable and cancellable. Every
//! submission carries an attempt id, and results that land after the attempt
//! was cancelled or superseded are discarded without touching state.
//!
//! State lives behind a mutex that is never held across an await, so a
//! driving layer holding the session in an `Arc` may cancel while a
//! submission's network call is still in flight.

pub mod pkce;
pub mod store;

use crate::client::health::{HealthHandle, HealthStatus};
use crate::error::Error;
use pkce::Challenge;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Mutex, OnceLock};
use store::{SessionStore, SessionToken};
use tracing::{debug, info};

fn otp_shape() -> &'static Regex {
    static OTP: OnceLock<Regex> = OnceLock::new();
    OTP.get_or_init(|| Regex::new(r"^\d{6}$").expect("static pattern"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// Credentials accepted locally; MFA provisioning call in flight.
    CredentialsEntered,
    /// Waiting for the one-time code.
    MfaPending,
    Authenticated,
}

impl AuthState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::CredentialsEntered => "credentials-entered",
            Self::MfaPending => "mfa-pending",
            Self::Authenticated => "authenticated",
        }
    }
}

/// MFA provisioning artifacts returned by the backend.
#[derive(Debug, Clone)]
pub struct MfaProvisioning {
    /// Data-URL QR image for authenticator apps.
    pub qr_image: String,
    /// otpauth:// URI, when the backend provides one.
    pub otpauth_uri: Option<String>,
    /// Raw base32 secret for manual entry, when provided.
    pub secret: Option<String>,
}

/// State of one login attempt, alive from credential submission until
/// success, failure, or cancellation.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub username: String,
    pub provisioning: MfaProvisioning,
    /// PKCE challenge bound to this attempt; never reused across attempts.
    pub challenge: Challenge,
    attempt: u64,
}

/// Network boundary to the identity backend.
///
/// Implementations map their failures into the shared taxonomy: transport
/// problems and non-2xx during provisioning are `Connectivity`; an explicit
/// rejection of the one-time code is `Rejected`.
#[allow(async_fn_in_trait)]
pub trait IdentityGateway {
    /// Initiate MFA provisioning for a user.
    async fn mfa_setup(&self, username: &str) -> Result<MfaProvisioning, Error>;

    /// Verify a one-time code and obtain the session token.
    async fn mfa_verify(&self, username: &str, code: &str) -> Result<SessionToken, Error>;
}

struct Inner {
    state: AuthState,
    pending: Option<PendingLogin>,
    /// Bumped on every submission and every cancellation; an in-flight
    /// result is only applied while its attempt id is still current.
    attempt: u64,
}

pub struct AuthSession<G, S> {
    gateway: G,
    store: S,
    health: HealthHandle,
    inner: Mutex<Inner>,
}

impl<G: IdentityGateway, S: SessionStore> AuthSession<G, S> {
    #[must_use]
    pub fn new(gateway: G, store: S, health: HealthHandle) -> Self {
        Self {
            gateway,
            store,
            health,
            inner: Mutex::new(Inner {
                state: AuthState::Unauthenticated,
                pending: None,
                attempt: 0,
            }),
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.lock().state
    }

    /// Clone of the pending login attempt, if one is awaiting its code.
    #[must_use]
    pub fn pending_login(&self) -> Option<PendingLogin> {
        self.lock().pending.clone()
    }

    /// Re-derive the state from the persisted token. Token authenticity is
    /// not checked locally; the backend rules on first use.
    pub fn restore_session(&self) -> AuthState {
        let mut inner = self.lock();
        inner.state = if self.store.get().is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        inner.pending = None;
        inner.state
    }

    /// First login step: validate input, gate on backend health, bind the
    /// attempt to a fresh PKCE challenge, and request MFA provisioning.
    ///
    /// # Errors
    /// `Validation` for empty input or an attempt already in progress,
    /// `Connectivity` when the backend is offline or provisioning fails,
    /// `Cancelled` when the attempt was cancelled while in flight.
    pub async fn submit_credentials(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<MfaProvisioning, Error> {
        let username = username.trim().to_string();

        let attempt = {
            let mut inner = self.lock();

            if inner.state != AuthState::Unauthenticated {
                return Err(Error::Validation(format!(
                    "cannot submit credentials while {}",
                    inner.state.as_str()
                )));
            }

            if self.health.status() != HealthStatus::Online {
                return Err(Error::Connectivity(
                    "security engine offline, try again shortly".to_string(),
                ));
            }

            if username.is_empty() || password.expose_secret().is_empty() {
                return Err(Error::Validation(
                    "username and password are required".to_string(),
                ));
            }

            inner.state = AuthState::CredentialsEntered;
            inner.attempt += 1;
            inner.attempt
        };

        // Bind this attempt to a unique proof. The verifier is dropped as
        // soon as the challenge exists; a full authorization-code exchange
        // would carry it until the code swap.
        let challenge = pkce::generate_verifier().map(|verifier| pkce::derive_challenge(&verifier));
        let challenge = match challenge {
            Ok(challenge) => challenge,
            Err(err) => {
                self.rollback(attempt);
                return Err(err);
            }
        };
        debug!(%challenge, "initiating login with fresh code challenge");

        let result = self.gateway.mfa_setup(&username).await;

        let mut inner = self.lock();
        if inner.attempt != attempt {
            debug!("discarding stale MFA provisioning result");
            return Err(Error::Cancelled);
        }

        match result {
            Ok(provisioning) => {
                inner.pending = Some(PendingLogin {
                    username,
                    provisioning: provisioning.clone(),
                    challenge,
                    attempt,
                });
                inner.state = AuthState::MfaPending;
                Ok(provisioning)
            }
            Err(err) => {
                inner.state = AuthState::Unauthenticated;
                inner.pending = None;
                // Provisioning failures are backend trouble, not bad
                // credentials; never steer the user back to their password.
                Err(match err {
                    Error::Connectivity(msg) => Error::Connectivity(msg),
                    other => Error::Connectivity(other.to_string()),
                })
            }
        }
    }

    /// Second login step: verify the one-time code. Malformed codes are
    /// rejected locally without contacting the backend.
    ///
    /// # Errors
    /// `Validation` for a malformed code or no pending attempt, `Rejected`
    /// when the backend declines the code, `Connectivity` on network
    /// trouble (the attempt stays retriable), `Cancelled` for stale results.
    pub async fn submit_otp(&self, code: &str) -> Result<(), Error> {
        let code = code.trim();

        let (username, attempt) = {
            let inner = self.lock();

            if inner.state != AuthState::MfaPending {
                return Err(Error::Validation("no login awaiting a code".to_string()));
            }

            if !otp_shape().is_match(code) {
                return Err(Error::Validation(
                    "enter the 6-digit code from your authenticator app".to_string(),
                ));
            }

            let pending = inner
                .pending
                .as_ref()
                .ok_or_else(|| Error::Invariant("MfaPending without pending login".to_string()))?;
            (pending.username.clone(), pending.attempt)
        };

        let result = self.gateway.mfa_verify(&username, code).await;

        let mut inner = self.lock();
        if inner.attempt != attempt || inner.state != AuthState::MfaPending {
            debug!("discarding stale MFA verification result");
            return Err(Error::Cancelled);
        }

        match result {
            Ok(token) => {
                self.store.set(&token)?;
                inner.state = AuthState::Authenticated;
                inner.pending = None;
                info!(username = %username, "session established");
                Ok(())
            }
            Err(Error::Connectivity(msg)) => Err(Error::Connectivity(msg)),
            Err(_) => Err(Error::Rejected("MFA verification failed".to_string())),
        }
    }

    /// Abandon the current login attempt ("Back"). In-flight results for the
    /// attempt are discarded when they land.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        if matches!(
            inner.state,
            AuthState::CredentialsEntered | AuthState::MfaPending
        ) {
            inner.state = AuthState::Unauthenticated;
            inner.pending = None;
            inner.attempt += 1;
        }
    }

    /// End the session: clear the persisted token and all attempt state.
    ///
    /// # Errors
    /// Returns `Error::Store` when the token slot cannot be cleared.
    pub fn logout(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        self.store.clear()?;
        inner.state = AuthState::Unauthenticated;
        inner.pending = None;
        inner.attempt += 1;
        Ok(())
    }

    /// React to a `SessionExpired` from the API client: the backend no
    /// longer honors the token, so drop it and start over.
    ///
    /// # Errors
    /// Returns `Error::Store` when the token slot cannot be cleared.
    pub fn expire(&self) -> Result<(), Error> {
        info!("session expired, clearing persisted token");
        self.logout()
    }

    fn rollback(&self, attempt: u64) {
        let mut inner = self.lock();
        if inner.attempt == attempt {
            inner.state = AuthState::Unauthenticated;
            inner.pending = None;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::store::{MemorySessionStore, SessionStore, SessionToken};
    use super::{AuthSession, AuthState, IdentityGateway, MfaProvisioning};
    use crate::client::health::HealthStatus;
    use crate::error::Error;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct StubGateway {
        setup_unreachable: bool,
        verify_unreachable: bool,
        reject_code: bool,
        setup_gate: Option<Arc<Notify>>,
        setup_calls: AtomicUsize,
        verify_calls: AtomicUsize,
    }

    impl IdentityGateway for &StubGateway {
        async fn mfa_setup(&self, _username: &str) -> Result<MfaProvisioning, Error> {
            self.setup_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.setup_gate {
                gate.notified().await;
            }
            if self.setup_unreachable {
                return Err(Error::Connectivity("connection refused".to_string()));
            }
            Ok(MfaProvisioning {
                qr_image: "data:image/png;base64,AAAA".to_string(),
                otpauth_uri: Some("otpauth://totp/SecureTeamAccess:alice".to_string()),
                secret: None,
            })
        }

        async fn mfa_verify(&self, _username: &str, code: &str) -> Result<SessionToken, Error> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            if self.verify_unreachable {
                return Err(Error::Connectivity("connection reset".to_string()));
            }
            if self.reject_code || code.len() != 6 {
                return Err(Error::Rejected("401 Unauthorized - MFA Invalid".to_string()));
            }
            Ok(SessionToken::new("issued-token".to_string()))
        }
    }

    fn online_session<'a>(
        gateway: &'a StubGateway,
        store: MemorySessionStore,
    ) -> AuthSession<&'a StubGateway, MemorySessionStore> {
        let handle = crate::client::health::test_handle(HealthStatus::Online);
        AuthSession::new(gateway, store, handle)
    }

    fn password(raw: &str) -> SecretString {
        SecretString::from(raw.to_string())
    }

    #[tokio::test]
    async fn happy_path_reaches_authenticated_with_token() {
        let gateway = StubGateway::default();
        let store = MemorySessionStore::new();
        let session = online_session(&gateway, store.clone());

        let provisioning = session
            .submit_credentials("admin", &password("password"))
            .await
            .unwrap();
        assert_eq!(session.state(), AuthState::MfaPending);
        assert!(provisioning.qr_image.starts_with("data:image/png"));

        session.submit_otp("123456").await.unwrap();
        assert_eq!(session.state(), AuthState::Authenticated);
        assert_eq!(store.get().unwrap().expose(), "issued-token");
        assert!(session.pending_login().is_none());
    }

    #[tokio::test]
    async fn empty_credentials_never_leave_unauthenticated() {
        let gateway = StubGateway::default();
        let session = online_session(&gateway, MemorySessionStore::new());

        for (user, pass) in [("", "x"), ("x", ""), ("   ", "x")] {
            let err = session
                .submit_credentials(user, &password(pass))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
            assert_eq!(session.state(), AuthState::Unauthenticated);
        }
        assert_eq!(gateway.setup_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn offline_health_blocks_submission() {
        let gateway = StubGateway::default();
        let handle = crate::client::health::test_handle(HealthStatus::Offline);
        let session = AuthSession::new(&gateway, MemorySessionStore::new(), handle);

        let err = session
            .submit_credentials("admin", &password("password"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connectivity(_)));
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert_eq!(gateway.setup_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_code_is_rejected_locally() {
        let gateway = StubGateway::default();
        let session = online_session(&gateway, MemorySessionStore::new());

        session
            .submit_credentials("admin", &password("password"))
            .await
            .unwrap();

        for code in ["12345", "1234567", "12345a", ""] {
            let err = session.submit_otp(code).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "code {code:?}");
            assert_eq!(session.state(), AuthState::MfaPending);
        }
        assert_eq!(gateway.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_code_keeps_attempt_retriable() {
        let gateway = StubGateway {
            reject_code: true,
            ..StubGateway::default()
        };
        let session = online_session(&gateway, MemorySessionStore::new());

        session
            .submit_credentials("admin", &password("password"))
            .await
            .unwrap();

        let err = session.submit_otp("654321").await.unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));
        assert_eq!(session.state(), AuthState::MfaPending);
        assert!(session.pending_login().is_some());
    }

    #[tokio::test]
    async fn provisioning_failure_surfaces_connectivity() {
        let gateway = StubGateway {
            setup_unreachable: true,
            ..StubGateway::default()
        };
        let session = online_session(&gateway, MemorySessionStore::new());

        let err = session
            .submit_credentials("admin", &password("password"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connectivity(_)));
        assert_eq!(session.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn verify_network_failure_keeps_mfa_pending() {
        let gateway = StubGateway {
            verify_unreachable: true,
            ..StubGateway::default()
        };
        let session = online_session(&gateway, MemorySessionStore::new());

        session
            .submit_credentials("admin", &password("password"))
            .await
            .unwrap();

        let err = session.submit_otp("123456").await.unwrap_err();
        assert!(matches!(err, Error::Connectivity(_)));
        assert_eq!(session.state(), AuthState::MfaPending);
    }

    #[tokio::test]
    async fn cancel_returns_to_unauthenticated() {
        let gateway = StubGateway::default();
        let session = online_session(&gateway, MemorySessionStore::new());

        session
            .submit_credentials("admin", &password("password"))
            .await
            .unwrap();
        assert_eq!(session.state(), AuthState::MfaPending);

        session.cancel();
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert!(session.pending_login().is_none());
    }

    #[tokio::test]
    async fn logout_clears_store_and_restore_sees_nothing() {
        let gateway = StubGateway::default();
        let store = MemorySessionStore::new();
        let session = online_session(&gateway, store.clone());

        session
            .submit_credentials("admin", &password("password"))
            .await
            .unwrap();
        session.submit_otp("123456").await.unwrap();
        assert_eq!(session.state(), AuthState::Authenticated);

        session.logout().unwrap();
        assert!(store.get().is_none());
        assert_eq!(session.restore_session(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn restore_session_derives_state_from_token_presence() {
        let gateway = StubGateway::default();
        let store = MemorySessionStore::new();
        store
            .set(&SessionToken::new("persisted".to_string()))
            .unwrap();

        let session = online_session(&gateway, store);
        assert_eq!(session.restore_session(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn cancel_during_inflight_provisioning_discards_late_result() {
        let gate = Arc::new(Notify::new());
        let gateway = StubGateway {
            setup_gate: Some(gate.clone()),
            ..StubGateway::default()
        };
        let session = online_session(&gateway, MemorySessionStore::new());

        let submit = session.submit_credentials("admin", &password("password"));
        let interrupt = async {
            // let the submission reach the gateway, then pull the rug
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            session.cancel();
            gate.notify_one();
        };

        let (result, ()) = tokio::join!(submit, interrupt);
        assert!(matches!(result.unwrap_err(), Error::Cancelled));
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert!(session.pending_login().is_none());
    }
}
