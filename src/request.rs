//! Outgoing request values.
//!
//! An [`OutgoingRequest`] is never changed in place. Each decoration step
//! takes a shared reference and returns a new value, so any other step still
//! holding the original sees it exactly as it was.

use http::header::{AUTHORIZATION, HeaderName, HeaderValue, InvalidHeaderValue};
use http::{HeaderMap, Method};
use serde_json::Value as JsonValue;
use url::Url;

/// Request about to be sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<JsonValue>,
}

impl OutgoingRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn post(url: Url, body: JsonValue) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    #[must_use]
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&JsonValue> {
        self.body.as_ref()
    }

    /// New request with `name` set to `value`.
    ///
    /// Any previous values of `name` are replaced, so the header appears
    /// exactly once on the result.
    #[must_use]
    pub fn with_header(&self, name: HeaderName, value: HeaderValue) -> Self {
        let mut next = self.clone();
        next.headers.insert(name, value);
        next
    }

    /// New request carrying `Authorization: Bearer <token>`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHeaderValue`] if the token contains characters that
    /// cannot appear in a header.
    pub fn with_bearer(&self, token: &str) -> Result<Self, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        Ok(self.with_header(AUTHORIZATION, value))
    }

    /// Bearer token carried by this request, if any.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Whether this request goes to the login or signup endpoint.
    #[must_use]
    pub fn targets_auth_endpoint(&self) -> bool {
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .is_some_and(|last| last == "login" || last == "signup")
    }
}
