//! HTTP client for the Passenger server API.
//!
//! Every endpoint lives under `<server>/api`. Authenticated calls carry the
//! cached session token as a `token` cookie (the bare value, no `Bearer`
//! prefix). Error responses carry a JSON `{"message": …}` body when the
//! server can produce one.

use std::path::Path;
use std::time::Duration;

use passenger_vault::{TokenStore, VaultError};
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::schemas::{
    Account, AlternateResponse, CreateAccountRequest, ErrorResponse, GenerateResponse,
    ImportResponse, LoginResponse, RegisterResponse, StatusResponse, UpdateAccountRequest,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by [`ApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No usable session token is cached.
    #[error("not logged in; run `passenger login`")]
    NotLoggedIn,

    /// The server answered with a 4xx/5xx status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The server URL is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {reason}")]
    UnexpectedResponse { reason: String },

    /// Transport failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failure reading the session token from the local vault.
    #[error("session vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for API results.
pub type Result<T> = std::result::Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thin typed wrapper over the Passenger REST API.
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
    token: Option<Zeroizing<String>>,
}

impl ApiClient {
    /// Client for unauthenticated endpoints.
    pub fn new(config: &Config) -> Result<Self> {
        let base = config
            .api_base()
            .map_err(|e| ApiError::InvalidConfig {
                reason: e.to_string(),
            })?;
        Self::with_base(&base, Duration::from_secs(config.timeout_secs))
    }

    /// Client that sends the cached session token with every request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotLoggedIn`] when the vault has no token or it
    /// has expired.
    pub fn authenticated(config: &Config, store: &TokenStore) -> Result<Self> {
        let token = match store.get_valid_token() {
            Ok(token) => token,
            Err(e) if e.requires_login() => {
                tracing::debug!(error = %e, "no valid session token");
                return Err(ApiError::NotLoggedIn);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self::new(config)?.with_token(token))
    }

    /// Client rooted at an explicit API base URL (ending in `/api`).
    pub fn with_base(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| ApiError::InvalidConfig {
            reason: format!("invalid API base URL {base}: {e}"),
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidConfig {
                reason: format!("{base} cannot be used as a base URL"),
            });
        }

        let http = reqwest::Client::builder()
            .user_agent(format!("passenger-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base,
            http,
            token: None,
        })
    }

    /// Attach a session token explicitly.
    pub fn with_token(mut self, token: Zeroizing<String>) -> Self {
        self.token = Some(token);
        self
    }

    /// Build `<base>/<segments…>`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.endpoint(segments);
        tracing::debug!(%method, %url, "api request");

        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.header(COOKIE, format!("token={}", token.as_str())),
            None => builder,
        }
    }

    /// Send and turn 4xx/5xx into [`ApiError::Server`].
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(server_error(status, &body));
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::UnexpectedResponse {
            reason: e.to_string(),
        })
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        self.json(self.request(Method::POST, segments).json(body)).await
    }

    // -- Auth ---------------------------------------------------------------

    /// Whether the server has been initialized with a master passphrase.
    pub async fn status(&self) -> Result<bool> {
        let status: StatusResponse = self
            .json(self.request(Method::GET, &["auth", "status"]))
            .await?;
        Ok(status.initialized)
    }

    /// Set the master passphrase on a fresh server. Returns the recovery key.
    pub async fn register(&self, passphrase: &str) -> Result<String> {
        let body = serde_json::json!({ "passphrase": passphrase });
        let response: RegisterResponse = self.post_json(&["auth", "register"], &body).await?;
        Ok(response.recovery)
    }

    /// Confirm the recovery key issued by [`register`](Self::register).
    pub async fn validate(&self, recovery: &str) -> Result<()> {
        let body = serde_json::json!({ "recovery": recovery });
        self.send(self.request(Method::POST, &["auth", "validate"]).json(&body))
            .await?;
        Ok(())
    }

    /// Exchange the master passphrase for a session token.
    ///
    /// Accepts either `{"token": "…"}` or the bare token as the body.
    pub async fn login(&self, passphrase: &str) -> Result<Zeroizing<String>> {
        let body = serde_json::json!({ "passphrase": passphrase });
        let response = self
            .send(self.request(Method::POST, &["auth", "login"]).json(&body))
            .await?;
        let raw = Zeroizing::new(response.text().await?);
        parse_login_body(&raw)
    }

    pub async fn change_master_passphrase(&self, passphrase: &str) -> Result<()> {
        let body = serde_json::json!({ "passphrase": passphrase });
        self.send(self.request(Method::PUT, &["auth", "passphrase"]).json(&body))
            .await?;
        Ok(())
    }

    // -- Accounts -----------------------------------------------------------

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.json(self.request(Method::GET, &["accounts"])).await
    }

    /// Fetch the decrypted passphrase of one account.
    pub async fn account_passphrase(&self, id: &str) -> Result<Zeroizing<String>> {
        let response = self
            .send(self.request(Method::GET, &["accounts", id, "passphrase"]))
            .await?;
        let raw = Zeroizing::new(response.text().await?);
        // A JSON string literal, or plain text from older servers.
        match serde_json::from_str::<String>(&raw) {
            Ok(value) => Ok(Zeroizing::new(value)),
            Err(_) => Ok(Zeroizing::new(raw.trim().to_owned())),
        }
    }

    pub async fn create_account(&self, request: &CreateAccountRequest) -> Result<Account> {
        self.post_json(&["accounts"], request).await
    }

    pub async fn update_account(&self, id: &str, request: &UpdateAccountRequest) -> Result<Account> {
        self.json(self.request(Method::PUT, &["accounts", id]).json(request))
            .await
    }

    pub async fn delete_account(&self, id: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &["accounts", id]))
            .await?;
        Ok(())
    }

    // -- Generators ---------------------------------------------------------

    /// Ask the server for a random passphrase of `length` characters.
    pub async fn generate(&self, length: u32) -> Result<String> {
        let body = serde_json::json!({ "length": length });
        let response: GenerateResponse = self.post_json(&["generate"], &body).await?;
        Ok(response.generated)
    }

    /// Swap characters of `passphrase` for look-alikes.
    pub async fn alternate(&self, passphrase: &str) -> Result<String> {
        let body = serde_json::json!({ "passphrase": passphrase });
        let response: AlternateResponse = self.post_json(&["alternate"], &body).await?;
        Ok(response.alternative)
    }

    // -- Transfer -----------------------------------------------------------

    /// Upload a browser-exported CSV file.
    pub async fn import_csv(&self, path: &Path) -> Result<ImportResponse> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "import.csv".to_owned());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/csv")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        self.json(self.request(Method::POST, &["import", "csv"]).multipart(form))
            .await
    }

    /// Download every account as CSV.
    pub async fn export_csv(&self) -> Result<Vec<u8>> {
        let response = self
            .send(
                self.request(Method::GET, &["export", "csv"])
                    .header(reqwest::header::ACCEPT, "text/csv"),
            )
            .await?;

        if let Some(kind) = response.headers().get(CONTENT_TYPE) {
            tracing::debug!(content_type = ?kind, "export response");
        }
        Ok(response.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map an error status and body to [`ApiError::Server`], preferring the
/// server's `message` field over the raw body.
fn server_error(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_owned()
            } else {
                trimmed.to_owned()
            }
        });
    ApiError::Server {
        status: status.as_u16(),
        message,
    }
}

fn parse_login_body(raw: &str) -> Result<Zeroizing<String>> {
    if let Ok(parsed) = serde_json::from_str::<LoginResponse>(raw) {
        return Ok(Zeroizing::new(parsed.token));
    }
    if let Ok(value) = serde_json::from_str::<String>(raw) {
        return Ok(Zeroizing::new(value));
    }

    let token = raw.trim();
    if token.is_empty() {
        return Err(ApiError::UnexpectedResponse {
            reason: "login response did not contain a token".into(),
        });
    }
    Ok(Zeroizing::new(token.to_owned()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    use super::*;

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::with_base(&format!("{}/api", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_encodes_segments() {
        let client = ApiClient::with_base("http://localhost:3000/api", Duration::from_secs(1)).unwrap();

        assert_eq!(
            client.endpoint(&["accounts", "a/b c"]).as_str(),
            "http://localhost:3000/api/accounts/a%2Fb%20c"
        );
        assert_eq!(
            client.endpoint(&["auth", "login"]).as_str(),
            "http://localhost:3000/api/auth/login"
        );
    }

    #[test]
    fn server_error_prefers_json_message() {
        let err = server_error(StatusCode::UNAUTHORIZED, r#"{"message":"invalid passphrase"}"#);
        assert!(matches!(
            err,
            ApiError::Server { status: 401, ref message } if message == "invalid passphrase"
        ));

        let err = server_error(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert!(matches!(err, ApiError::Server { ref message, .. } if message == "upstream down"));

        let err = server_error(StatusCode::NOT_FOUND, "");
        assert!(matches!(err, ApiError::Server { ref message, .. } if message == "Not Found"));
    }

    #[test]
    fn login_body_variants() {
        assert_eq!(parse_login_body(r#"{"token":"abc"}"#).unwrap().as_str(), "abc");
        assert_eq!(parse_login_body(r#""abc""#).unwrap().as_str(), "abc");
        assert_eq!(parse_login_body("abc\n").unwrap().as_str(), "abc");
        assert!(parse_login_body("  ").is_err());
    }

    #[tokio::test]
    async fn login_posts_passphrase() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/auth/login"))
            .and(matchers::body_json(serde_json::json!({ "passphrase": "hunter2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "tok-abc123" })))
            .mount(&server)
            .await;

        let token = client_for(&server).login("hunter2").await.unwrap();
        assert_eq!(token.as_str(), "tok-abc123");
    }

    #[tokio::test]
    async fn authenticated_requests_send_token_cookie() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/accounts"))
            .and(matchers::header("cookie", "token=tok-abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "1", "platform": "github", "identifier": "me", "url": "https://github.com", "notes": "", "strength": 4 }
            ])))
            .mount(&server)
            .await;

        let accounts = client_for(&server)
            .with_token(Zeroizing::new("tok-abc123".to_owned()))
            .accounts()
            .await
            .unwrap();

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].platform, "github");
    }

    #[tokio::test]
    async fn error_status_maps_to_server_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("DELETE"))
            .and(matchers::path("/api/accounts/42"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({ "message": "account not found" })))
            .mount(&server)
            .await;

        let err = client_for(&server).delete_account("42").await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Server { status: 404, ref message } if message == "account not found"
        ));
    }

    #[tokio::test]
    async fn status_reads_initialized_flag() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/auth/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "initialized": true })))
            .mount(&server)
            .await;

        assert!(client_for(&server).status().await.unwrap());
    }

    #[tokio::test]
    async fn account_passphrase_accepts_json_string_or_text() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/accounts/1/passphrase"))
            .respond_with(ResponseTemplate::new(200).set_body_string("\"s3cret\""))
            .mount(&server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/accounts/2/passphrase"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain\n"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.account_passphrase("1").await.unwrap().as_str(), "s3cret");
        assert_eq!(client.account_passphrase("2").await.unwrap().as_str(), "plain");
    }

    #[tokio::test]
    async fn export_returns_raw_bytes() {
        let server = MockServer::start().await;
        let csv = "name,url,username,password\ngithub,https://github.com,me,x\n";
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/export/csv"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(csv, "text/csv"))
            .mount(&server)
            .await;

        let bytes = client_for(&server).export_csv().await.unwrap();
        assert_eq!(bytes, csv.as_bytes());
    }

    #[tokio::test]
    async fn import_uploads_multipart_file() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/import/csv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "successCount": 2,
                "failedOnes": [{ "platform": "gitlab", "identifier": "me", "url": "" }]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        std::fs::write(&path, "name,url,username,password\n").unwrap();

        let result = client_for(&server).import_csv(&path).await.unwrap();
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failed_ones[0].platform, "gitlab");

        let requests = server.received_requests().await.unwrap();
        let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
    }

    #[test]
    fn authenticated_without_token_is_not_logged_in() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(
            dir.path(),
            "tester",
            std::sync::Arc::new(passenger_vault::SystemClock),
            std::sync::Arc::new(ring::rand::SystemRandom::new()),
        )
        .unwrap();
        let config = Config {
            server_url: Some("http://localhost:3000".into()),
            ..Config::default()
        };

        let result = ApiClient::authenticated(&config, &store);
        assert!(matches!(result, Err(ApiError::NotLoggedIn)));
    }
}
