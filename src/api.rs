use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, api_error};
use crate::request::OutgoingRequest;
use crate::session::AuthApi;
use crate::types::{
    AuthResponse, Credentials, Registration, ResolveResponse, ShortUrl, ShortenResponse,
};

/// Default backend base URL for local development.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// TinyUrl backend configuration.
///
/// ```rust,ignore
/// use tinyurl_session::ApiConfig;
///
/// let config = ApiConfig::new("https://fonsecaaso.com/api".parse()?)?;
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiConfig {
    pub(crate) base_url: Url,
}

impl ApiConfig {
    /// Create a configuration rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `base_url` cannot have paths appended
    /// (e.g. `mailto:` URLs).
    pub fn new(base_url: Url) -> Result<Self, Error> {
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("not a base URL: {base_url}")));
        }
        Ok(Self { base_url })
    }

    /// Override the base URL.
    ///
    /// # Errors
    ///
    /// See [`ApiConfig::new`].
    pub fn with_base_url(self, base_url: Url) -> Result<Self, Error> {
        Self::new(base_url)
    }

    /// Backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended as path segments.
    #[must_use]
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.parse().expect("valid default URL"),
        }
    }
}

/// HTTP client for the TinyUrl backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ApiConfig,
    http: reqwest::Client,
}

// The backend sends `"urls": null` for a user without links.
#[derive(Deserialize)]
struct UserUrlsResponse {
    #[serde(default)]
    urls: Option<Vec<ShortUrl>>,
}

impl ApiClient {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Exchange credentials for a session token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Api`] if the
    /// backend rejects the credentials.
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, Error> {
        let request = OutgoingRequest::post(
            self.config.endpoint(&["login"]),
            to_json(credentials)?,
        );
        self.send_json(&request, "login").await
    }

    /// Register a new account and receive a session token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Api`] if the
    /// backend rejects the registration (e.g. `EMAIL_EXISTS`).
    pub async fn signup(&self, registration: &Registration) -> Result<AuthResponse, Error> {
        let request = OutgoingRequest::post(
            self.config.endpoint(&["signup"]),
            to_json(registration)?,
        );
        self.send_json(&request, "signup").await
    }

    /// Request listing the signed-in user's short links.
    ///
    /// The request is undecorated; pass it through an
    /// [`AuthInterceptor`](crate::AuthInterceptor) to attach the token.
    #[must_use]
    pub fn user_urls_request(&self) -> OutgoingRequest {
        OutgoingRequest::get(self.config.endpoint(&["user", "urls"]))
    }

    /// Request shortening `url`.
    #[must_use]
    pub fn shorten_request(&self, url: &str) -> OutgoingRequest {
        OutgoingRequest::post(self.config.endpoint(&[""]), serde_json::json!({ "url": url }))
    }

    /// Request looking up the long URL behind short code `code`.
    #[must_use]
    pub fn resolve_request(&self, code: &str) -> OutgoingRequest {
        OutgoingRequest::get(self.config.endpoint(&[code]))
    }

    /// Fetch the signed-in user's short links.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Api`] for a
    /// non-success status (401 when the token is missing or rejected).
    pub async fn user_urls(&self, request: &OutgoingRequest) -> Result<Vec<ShortUrl>, Error> {
        let body: UserUrlsResponse = self.send_json(request, "list user urls").await?;
        Ok(body.urls.unwrap_or_default())
    }

    /// Shorten a URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Api`] for a
    /// non-success status (`INVALID_URL` for malformed input).
    pub async fn shorten(&self, request: &OutgoingRequest) -> Result<ShortenResponse, Error> {
        self.send_json(request, "shorten url").await
    }

    /// Look up the long URL behind a short code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Api`] for a
    /// non-success status (`URL_NOT_FOUND` for unknown codes, `MISSING_ID`
    /// for an empty one).
    pub async fn resolve(&self, request: &OutgoingRequest) -> Result<String, Error> {
        let body: ResolveResponse = self.send_json(request, "resolve url").await?;
        Ok(body.url)
    }

    /// Send a request as-is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure. Non-success statuses are
    /// returned as a response, not an error.
    pub async fn send(&self, request: &OutgoingRequest) -> Result<reqwest::Response, Error> {
        let mut builder = self
            .http
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        builder.send().await.map_err(Into::into)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: &OutgoingRequest,
        operation: &'static str,
    ) -> Result<T, Error> {
        let response = self.send(request).await?;
        let response = ensure_success(response, operation).await?;
        response.json::<T>().await.map_err(Into::into)
    }
}

impl AuthApi for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, Error> {
        ApiClient::login(self, credentials).await
    }

    async fn signup(&self, registration: &Registration) -> Result<AuthResponse, Error> {
        ApiClient::signup(self, registration).await
    }
}

/// Checks HTTP response status; returns the response on success or an error with details.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(api_error(operation, status, &body))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| Error::Config(format!("serialize request: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::error::ErrorCode;
    use crate::interceptor::AuthInterceptor;
    use crate::navigation::{NavigationReason, RecordingNavigator};
    use crate::session::SessionManager;
    use crate::storage::MemoryTokenStore;
    use crate::token::testing::token_with;

    async fn user_urls(headers: HeaderMap) -> impl IntoResponse {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if bearer == "Bearer good-token" {
            (
                StatusCode::OK,
                Json(json!({"message": "User URLs retrieved successfully", "urls": null})),
            )
        } else {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Unauthorized access", "code": "UNAUTHORIZED"})),
            )
        }
    }

    async fn resolve(Path(code): Path<String>) -> impl IntoResponse {
        if code == "abc123" {
            (
                StatusCode::OK,
                Json(json!({"message": "URL retrieved successfully", "url": "https://example.com"})),
            )
        } else {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "URL not found", "code": "URL_NOT_FOUND"})),
            )
        }
    }

    /// Client pointed at a local stand-in for the backend.
    async fn stub_backend() -> ApiClient {
        let app = Router::new()
            .route(
                "/api/login",
                post(|| async {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"error": "Invalid email or password", "code": "INVALID_CREDENTIALS"})),
                    )
                }),
            )
            .route(
                "/api/signup",
                post(|| async {
                    (
                        StatusCode::CONFLICT,
                        Json(json!({"error": "Email already registered", "code": "EMAIL_EXISTS"})),
                    )
                }),
            )
            .route("/api/", post(|| async { (StatusCode::BAD_GATEWAY, "upstream down\n") }))
            .route("/api/user/urls", get(user_urls))
            .route("/api/{code}", get(resolve));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        ApiClient::new(ApiConfig::new(format!("http://{addr}/api").parse().unwrap()).unwrap())
    }

    #[test]
    fn endpoints_append_to_base_path() {
        let config = ApiConfig::new("https://fonsecaaso.com/api".parse().unwrap()).unwrap();
        assert_eq!(
            config.endpoint(&["login"]).as_str(),
            "https://fonsecaaso.com/api/login"
        );
        assert_eq!(
            config.endpoint(&["user", "urls"]).as_str(),
            "https://fonsecaaso.com/api/user/urls"
        );
        assert_eq!(config.endpoint(&[""]).as_str(), "https://fonsecaaso.com/api/");
    }

    #[test]
    fn trailing_slash_on_base_is_not_doubled() {
        let config = ApiConfig::new("http://localhost:8080/api/".parse().unwrap()).unwrap();
        assert_eq!(
            config.endpoint(&["signup"]).as_str(),
            "http://localhost:8080/api/signup"
        );
    }

    #[test]
    fn rejects_non_base_url() {
        let err = ApiConfig::new("mailto:ops@example.com".parse().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn default_points_at_local_backend() {
        assert_eq!(ApiConfig::default().base_url().as_str(), DEFAULT_BASE_URL);
    }

    #[test]
    fn prepared_requests_are_undecorated() {
        let client = ApiClient::new(ApiConfig::default());
        let list = client.user_urls_request();
        assert_eq!(list.url().path(), "/api/user/urls");
        assert!(list.bearer_token().is_none());

        let shorten = client.shorten_request("https://example.com");
        assert_eq!(*shorten.method(), http::Method::POST);
        assert_eq!(shorten.body().unwrap()["url"], "https://example.com");
    }

    #[test]
    fn resolve_request_targets_short_code() {
        let client = ApiClient::new(ApiConfig::default());
        let req = client.resolve_request("abc123");
        assert_eq!(*req.method(), http::Method::GET);
        assert_eq!(req.url().as_str(), "http://localhost:8080/api/abc123");

        // Codes stay a single path segment.
        let odd = client.resolve_request("a/b");
        assert_eq!(odd.url().path(), "/api/a%2Fb");
    }

    #[test]
    fn null_url_list_means_no_links() {
        let body: UserUrlsResponse = serde_json::from_str(
            r#"{"message":"User URLs retrieved successfully","urls":null}"#,
        )
        .unwrap();
        assert_eq!(body.urls.unwrap_or_default(), Vec::new());

        let body: UserUrlsResponse = serde_json::from_str(
            r#"{"urls":[{"id":"abc123","url":"https://example.com","created_at":"2025-01-02T03:04:05Z"}]}"#,
        )
        .unwrap();
        assert_eq!(body.urls.unwrap()[0].id, "abc123");
    }

    #[tokio::test]
    async fn user_urls_with_valid_token_and_no_links() {
        let client = stub_backend().await;
        let req = client.user_urls_request().with_bearer("good-token").unwrap();

        assert!(client.user_urls(&req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_urls_without_token_is_unauthorized() {
        let client = stub_backend().await;

        let err = client.user_urls(&client.user_urls_request()).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.code(), Some(&ErrorCode::Unauthorized));
    }

    #[tokio::test]
    async fn login_rejection_carries_backend_code() {
        let client = stub_backend().await;

        let err = client
            .login(&Credentials::new("ana@example.com", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.code(), Some(&ErrorCode::InvalidCredentials));
        assert_eq!(err.user_message(), "Invalid email or password. Please try again.");
    }

    #[tokio::test]
    async fn signup_conflict_through_auth_api() {
        let client = stub_backend().await;

        let err = AuthApi::signup(&client, &Registration::new("ana@example.com", "secret1"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.code(), Some(&ErrorCode::EmailExists));
    }

    #[tokio::test]
    async fn non_json_error_body_is_kept_as_message() {
        let client = stub_backend().await;

        let err = client
            .shorten(&client.shorten_request("https://example.com"))
            .await
            .unwrap_err();
        match err {
            Error::Api {
                operation,
                status,
                code,
                message,
            } => {
                assert_eq!(operation, "shorten url");
                assert_eq!(status, 502);
                assert!(code.is_none());
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolve_known_and_unknown_codes() {
        let client = stub_backend().await;

        let url = client.resolve(&client.resolve_request("abc123")).await.unwrap();
        assert_eq!(url, "https://example.com");

        let err = client
            .resolve(&client.resolve_request("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.code(), Some(&ErrorCode::UrlNotFound));
    }

    #[tokio::test]
    async fn rejected_token_ends_session_through_interceptor() {
        let client = stub_backend().await;
        let navigator = Arc::new(RecordingNavigator::at("/dashboard"));
        let manager = SessionManager::new(
            client.clone(),
            MemoryTokenStore::with_token(token_with(json!({"user_id": "u-1"}))),
            navigator.clone(),
        );
        manager.initialize();
        let interceptor = AuthInterceptor::new(manager.clone());

        let err = interceptor
            .intercept(&client.user_urls_request(), |req| async move {
                client.user_urls(&req).await
            })
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert!(manager.token().is_none());
        assert!(manager.current_user().is_none());
        assert_eq!(navigator.redirects(), vec![NavigationReason::Unauthorized]);
    }
}
