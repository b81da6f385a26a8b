//! HTTP client for the SecureTeam Access backend.
//!
//! Flow Overview:
//! - `ApiClient::request` joins the configured base URL with a `/...` path,
//!   attaches JSON and device headers plus the bearer token when the injected
//!   store holds one, and returns status + parsed JSON body.
//! - A 401 is reported as `Error::SessionExpired` so the driving layer can
//!   expire the auth session; the client itself never touches the store.
//! - Identity endpoints (MFA setup/verify) are exposed through the
//!   `IdentityGateway` impl used by the auth state machine.
//!
//! Security boundary: the bearer token only ever leaves the store as an
//! `Authorization` header built here; it is never logged or echoed.

pub mod health;

use crate::auth::store::{SessionStore, SessionToken};
use crate::auth::{IdentityGateway, MfaProvisioning};
use crate::error::Error;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Device identifier header attached to every call.
pub const DEVICE_ID_HEADER: &str = "X-Device-ID";

/// Status and parsed JSON body of a backend response. Non-JSON bodies are
/// carried as a JSON string so error messages survive.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Resolve an endpoint against the configured base, keeping the base path
/// prefix intact (the backend lives under `/secureteam-access/api`).
///
/// # Errors
/// Returns `Error::Config` for endpoints without a leading slash or bases
/// that cannot absorb the endpoint.
pub fn endpoint_url(base: &Url, endpoint: &str) -> Result<Url, Error> {
    if !endpoint.starts_with('/') {
        return Err(Error::Config(format!(
            "endpoint must start with '/': {endpoint}"
        )));
    }

    let joined = format!("{}{endpoint}", base.as_str().trim_end_matches('/'));

    Url::parse(&joined).map_err(|err| Error::Config(format!("invalid endpoint URL: {err}")))
}

#[derive(Debug, Clone)]
pub struct ApiClient<S> {
    http: Client,
    base_url: Url,
    device_id: String,
    store: S,
}

impl<S: SessionStore> ApiClient<S> {
    /// Build a client around an injected session store.
    ///
    /// # Errors
    /// Returns `Error::Config` when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(base_url: Url, device_id: String, store: S) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| Error::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            device_id,
            store,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Issue a request and surface the raw status with its JSON body.
    /// Transport-level failures map to `Error::Connectivity`; status handling
    /// is left to the caller.
    ///
    /// # Errors
    /// Returns `Error::Connectivity` when the backend cannot be reached.
    #[instrument(skip(self, body, extra_headers))]
    pub async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        extra_headers: &[(String, String)],
    ) -> Result<ApiResponse, Error> {
        let url = endpoint_url(&self.base_url, endpoint)?;

        let mut builder = self
            .http
            .request(method, url.clone())
            .header("Content-Type", "application/json")
            .header(DEVICE_ID_HEADER, &self.device_id);

        if let Some(token) = self.store.get() {
            builder = builder.bearer_auth(token.expose());
        }

        for (name, value) in extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| Error::Connectivity(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| Error::Connectivity(err.to_string()))?;

        debug!("{} {} -> {}", url.path(), status.as_u16(), text.len());

        // The backend answers JSON on success but plain text on some errors.
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse { status, body })
    }

    /// Issue an authenticated request and map failure statuses into the
    /// error taxonomy: 401 becomes `SessionExpired`, other 4xx `Rejected`,
    /// 5xx `Connectivity`.
    ///
    /// # Errors
    /// See the mapping above; transport failures are `Connectivity`.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        extra_headers: &[(String, String)],
    ) -> Result<ApiResponse, Error> {
        let response = self.send(method, endpoint, body, extra_headers).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }

        if response.status.is_client_error() {
            return Err(Error::Rejected(backend_message(&response)));
        }

        if !response.status.is_success() {
            return Err(Error::Connectivity(backend_message(&response)));
        }

        Ok(response)
    }

    /// Register a new user account.
    ///
    /// # Errors
    /// Propagates the `request` error mapping.
    pub async fn register(
        &self,
        username: &str,
        password: &SecretString,
        email: &str,
        department: Option<&str>,
    ) -> Result<(), Error> {
        let mut body = json!({
            "username": username,
            "password": password.expose_secret(),
            "email": email,
        });
        if let Some(department) = department {
            body["department"] = Value::String(department.to_string());
        }

        self.request(Method::POST, "/auth/register", Some(&body), &[])
            .await?;

        Ok(())
    }

    /// List the projects the session is scoped to.
    ///
    /// # Errors
    /// Propagates the `request` error mapping.
    pub async fn projects(&self) -> Result<Value, Error> {
        let response = self.request(Method::GET, "/projects", None, &[]).await?;
        Ok(response.body)
    }

    /// Embed a message into a cover image (base64 payloads).
    ///
    /// # Errors
    /// Propagates the `request` error mapping.
    pub async fn stego_hide(&self, cover_image: &str, message: &str) -> Result<Value, Error> {
        let body = json!({ "coverImage": cover_image, "message": message });
        let response = self
            .request(Method::POST, "/stego/hide", Some(&body), &[])
            .await?;
        Ok(response.body)
    }

    /// Extract a hidden message from a stego image (base64 payload).
    ///
    /// # Errors
    /// Propagates the `request` error mapping.
    pub async fn stego_extract(&self, stego_image: &str) -> Result<Value, Error> {
        let body = json!({ "coverImage": stego_image });
        let response = self
            .request(Method::POST, "/stego/extract", Some(&body), &[])
            .await?;
        Ok(response.body)
    }

    /// Fetch the access audit log.
    ///
    /// # Errors
    /// Propagates the `request` error mapping.
    pub async fn audit_logs(&self) -> Result<Value, Error> {
        let response = self.request(Method::GET, "/audit", None, &[]).await?;
        Ok(response.body)
    }
}

#[derive(Debug, Deserialize)]
struct MfaSetupResponse {
    #[serde(rename = "qrImage")]
    qr_image: String,
    #[serde(rename = "qrUri")]
    qr_uri: Option<String>,
    secret: Option<String>,
}

#[derive(Deserialize)]
struct MfaVerifyResponse {
    token: String,
}

impl<S: SessionStore> IdentityGateway for ApiClient<S> {
    async fn mfa_setup(&self, username: &str) -> Result<MfaProvisioning, Error> {
        let endpoint = format!(
            "/auth/mfa/setup?username={}",
            url::form_urlencoded::byte_serialize(username.as_bytes()).collect::<String>()
        );
        let response = self.send(Method::GET, &endpoint, None, &[]).await?;

        // Any non-2xx while provisioning reads as a backend problem, not a
        // credentials problem.
        if !response.status.is_success() {
            return Err(Error::Connectivity(backend_message(&response)));
        }

        let parsed: MfaSetupResponse = serde_json::from_value(response.body).map_err(|err| {
            Error::Connectivity(format!("malformed provisioning response: {err}"))
        })?;

        Ok(MfaProvisioning {
            qr_image: parsed.qr_image,
            otpauth_uri: parsed.qr_uri,
            secret: parsed.secret,
        })
    }

    async fn mfa_verify(&self, username: &str, code: &str) -> Result<SessionToken, Error> {
        let body = json!({ "username": username, "code": code });
        let response = self
            .send(Method::POST, "/auth/mfa/verify", Some(&body), &[])
            .await?;

        if response.status.is_client_error() {
            return Err(Error::Rejected(backend_message(&response)));
        }

        if !response.status.is_success() {
            return Err(Error::Connectivity(backend_message(&response)));
        }

        let parsed: MfaVerifyResponse = serde_json::from_value(response.body)
            .map_err(|_| Error::Rejected("verification response carried no token".to_string()))?;

        Ok(SessionToken::new(parsed.token))
    }
}

fn backend_message(response: &ApiResponse) -> String {
    let detail = response.body["message"]
        .as_str()
        .or_else(|| response.body["error"].as_str())
        .or_else(|| response.body.as_str())
        .unwrap_or("");

    if detail.is_empty() {
        response.status.to_string()
    } else {
        format!("{} - {detail}", response.status)
    }
}

#[cfg(test)]
mod tests {
    use super::{endpoint_url, ApiClient};
    use crate::auth::store::{MemorySessionStore, SessionStore, SessionToken};
    use crate::auth::IdentityGateway;
    use crate::error::Error;
    use reqwest::Method;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{bearer_token, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_uri: &str, store: MemorySessionStore) -> ApiClient<MemorySessionStore> {
        let base = Url::parse(&format!("{server_uri}/secureteam-access/api")).unwrap();
        ApiClient::new(base, "sec-test-device".to_string(), store).unwrap()
    }

    #[test]
    fn endpoint_url_keeps_base_path() {
        let base = Url::parse("http://localhost:8080/secureteam-access/api").unwrap();
        let url = endpoint_url(&base, "/auth/health").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/secureteam-access/api/auth/health"
        );
    }

    #[test]
    fn endpoint_url_requires_leading_slash() {
        let base = Url::parse("http://localhost:8080/api").unwrap();
        assert!(matches!(
            endpoint_url(&base, "auth/health"),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn request_attaches_device_and_bearer_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secureteam-access/api/projects"))
            .and(header("X-Device-ID", "sec-test-device"))
            .and(bearer_token("tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["Project Alpha"])))
            .mount(&server)
            .await;

        let store = MemorySessionStore::new();
        store.set(&SessionToken::new("tok-123".to_string())).unwrap();

        let client = client_for(&server.uri(), store);
        let projects = client.projects().await.unwrap();
        assert_eq!(projects, json!(["Project Alpha"]));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_session_expired_and_keeps_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secureteam-access/api/audit"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = MemorySessionStore::new();
        store.set(&SessionToken::new("stale".to_string())).unwrap();

        let client = client_for(&server.uri(), store.clone());
        let err = client.audit_logs().await.unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        // the client reports expiry; clearing the slot is the session's job
        assert!(store.get().is_some());
    }

    #[tokio::test]
    async fn plain_text_error_bodies_survive() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/secureteam-access/api/auth/mfa/verify"))
            .respond_with(ResponseTemplate::new(401).set_body_string("MFA Invalid"))
            .mount(&server)
            .await;

        let store = MemorySessionStore::new();
        let client = client_for(&server.uri(), store);
        let err = client.mfa_verify("alice", "123456").await.unwrap_err();
        match err {
            Error::Rejected(message) => assert!(message.contains("MFA Invalid")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mfa_setup_parses_provisioning_artifacts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secureteam-access/api/auth/mfa/setup"))
            .and(query_param("username", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secret": "JBSWY3DPEHPK3PXP",
                "qrUri": "otpauth://totp/SecureTeamAccess:alice",
                "qrImage": "data:image/png;base64,AAAA"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), MemorySessionStore::new());
        let provisioning = client.mfa_setup("alice").await.unwrap();
        assert_eq!(provisioning.qr_image, "data:image/png;base64,AAAA");
        assert_eq!(
            provisioning.otpauth_uri.as_deref(),
            Some("otpauth://totp/SecureTeamAccess:alice")
        );
        assert_eq!(provisioning.secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
    }

    #[tokio::test]
    async fn mfa_setup_5xx_reads_as_connectivity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secureteam-access/api/auth/mfa/setup"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), MemorySessionStore::new());
        let err = client.mfa_setup("alice").await.unwrap_err();
        assert!(matches!(err, Error::Connectivity(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_connectivity() {
        let store = MemorySessionStore::new();
        let base = Url::parse("http://127.0.0.1:1/secureteam-access/api").unwrap();
        let client = ApiClient::new(base, "sec-test-device".to_string(), store).unwrap();

        let err = client
            .request(Method::GET, "/projects", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connectivity(_)));
    }
}
