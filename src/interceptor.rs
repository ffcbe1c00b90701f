//! Bearer decoration and 401 handling for backend requests.

use std::future::Future;

use crate::error::Error;
use crate::navigation::{NavigationReason, is_auth_view};
use crate::request::OutgoingRequest;
use crate::session::{AuthApi, SessionManager};
use crate::storage::TokenStore;

/// Attaches the session token to outgoing requests and ends the session
/// when the backend answers 401.
///
/// # Example
///
/// ```rust,ignore
/// let interceptor = AuthInterceptor::new(manager.clone());
/// let urls = interceptor
///     .intercept(&client.user_urls_request(), |req| async move {
///         client.user_urls(&req).await
///     })
///     .await?;
/// ```
pub struct AuthInterceptor<A, S> {
    session: SessionManager<A, S>,
}

// Manual Clone: avoid derive adding `A: Clone, S: Clone` bounds.
impl<A, S> Clone for AuthInterceptor<A, S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<A: AuthApi, S: TokenStore> AuthInterceptor<A, S> {
    #[must_use]
    pub fn new(session: SessionManager<A, S>) -> Self {
        Self { session }
    }

    /// New request carrying the current token, if any.
    ///
    /// The given request is never modified.
    #[must_use]
    pub fn decorate(&self, request: &OutgoingRequest) -> OutgoingRequest {
        let Some(token) = self.session.token() else {
            return request.clone();
        };
        request.with_bearer(&token).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Persisted token is not a valid header value; sending without it");
            request.clone()
        })
    }

    /// Reacts to a 401 answer to `request`.
    ///
    /// Signs the user out and redirects with
    /// [`NavigationReason::Unauthorized`], except when the request itself
    /// was a login/signup attempt or the user is already on one of those
    /// views. Returns whether the session was ended.
    pub fn on_unauthorized(&self, request: &OutgoingRequest) -> bool {
        let navigator = self.session.navigator();
        if request.targets_auth_endpoint() || is_auth_view(&navigator.current_path()) {
            tracing::debug!(url = %request.url(), "401 during authentication; leaving session alone");
            return false;
        }

        tracing::warn!(url = %request.url(), "401 Unauthorized - token expired or invalid");
        self.session.logout();
        navigator.navigate_to_login(NavigationReason::Unauthorized);
        true
    }

    /// Decorates `request`, hands it to `send`, and applies the 401 policy
    /// to the result.
    ///
    /// The error from `send` is always returned to the caller, also after the
    /// session has been ended.
    ///
    /// # Errors
    ///
    /// Whatever `send` returns.
    pub async fn intercept<T, F, Fut>(&self, request: &OutgoingRequest, send: F) -> Result<T, Error>
    where
        F: FnOnce(OutgoingRequest) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let result = send(self.decorate(request)).await;
        if result.as_ref().is_err_and(Error::is_unauthorized) {
            self.on_unauthorized(request);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::header::AUTHORIZATION;
    use serde_json::json;

    use super::*;
    use crate::error::api_error;
    use crate::navigation::RecordingNavigator;
    use crate::storage::MemoryTokenStore;
    use crate::token::testing::token_with;
    use crate::types::{AuthResponse, Credentials, Registration};

    struct NoBackend;

    impl AuthApi for NoBackend {
        async fn login(&self, _: &Credentials) -> Result<AuthResponse, Error> {
            Err(Error::Config("no backend".into()))
        }

        async fn signup(&self, _: &Registration) -> Result<AuthResponse, Error> {
            Err(Error::Config("no backend".into()))
        }
    }

    fn signed_in(at: &str) -> (AuthInterceptor<NoBackend, MemoryTokenStore>, Arc<RecordingNavigator>) {
        let token = token_with(json!({"user_id": "u-1"}));
        let navigator = Arc::new(RecordingNavigator::at(at));
        let manager =
            SessionManager::new(NoBackend, MemoryTokenStore::with_token(token), navigator.clone());
        manager.initialize();
        (AuthInterceptor::new(manager), navigator)
    }

    fn request(path: &str) -> OutgoingRequest {
        OutgoingRequest::get(format!("http://localhost:8080/api{path}").parse().unwrap())
    }

    fn unauthorized() -> Error {
        api_error("list user urls", 401, r#"{"error":"Unauthorized access","code":"UNAUTHORIZED"}"#)
    }

    #[test]
    fn two_decoration_steps_keep_template_and_single_header() {
        let (interceptor, _) = signed_in("/dashboard");
        let template = request("/user/urls");

        let first = interceptor.decorate(&template);
        assert!(template.headers().get(AUTHORIZATION).is_none());

        let second = interceptor.decorate(&first);
        assert_eq!(second.headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(second.bearer_token(), first.bearer_token());
        assert!(first.bearer_token().is_some());
    }

    #[test]
    fn no_token_means_unchanged_request() {
        let (interceptor, _) = signed_in("/dashboard");
        interceptor.session.logout();

        let template = request("/user/urls");
        assert_eq!(interceptor.decorate(&template), template);
    }

    #[test]
    fn unauthorized_ends_session_and_redirects() {
        let (interceptor, navigator) = signed_in("/dashboard");

        assert!(interceptor.on_unauthorized(&request("/user/urls")));
        assert!(interceptor.session.token().is_none());
        assert!(interceptor.session.current_user().is_none());
        assert_eq!(navigator.redirects(), vec![NavigationReason::Unauthorized]);
    }

    #[test]
    fn unauthorized_login_request_is_ignored() {
        let (interceptor, navigator) = signed_in("/dashboard");

        assert!(!interceptor.on_unauthorized(&request("/login")));
        assert!(interceptor.session.token().is_some());
        assert!(navigator.redirects().is_empty());
    }

    #[test]
    fn unauthorized_on_signup_view_is_ignored() {
        let (interceptor, navigator) = signed_in("/signup");

        assert!(!interceptor.on_unauthorized(&request("/user/urls")));
        assert!(interceptor.session.token().is_some());
        assert!(navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn intercept_sends_decorated_request_and_returns_error() {
        let (interceptor, navigator) = signed_in("/dashboard");
        let template = request("/user/urls");

        let result: Result<(), Error> = interceptor
            .intercept(&template, |sent| async move {
                assert!(sent.bearer_token().is_some());
                Err(unauthorized())
            })
            .await;

        assert!(result.unwrap_err().is_unauthorized());
        assert!(template.bearer_token().is_none());
        assert_eq!(navigator.redirects(), vec![NavigationReason::Unauthorized]);
    }

    #[tokio::test]
    async fn intercept_leaves_session_on_other_errors() {
        let (interceptor, navigator) = signed_in("/dashboard");

        let result: Result<(), Error> = interceptor
            .intercept(&request("/user/urls"), |_| async {
                Err(api_error("list user urls", 500, r#"{"code":"INTERNAL_ERROR"}"#))
            })
            .await;

        assert_eq!(result.unwrap_err().status(), Some(500));
        assert!(interceptor.session.is_authenticated());
        assert!(navigator.redirects().is_empty());
    }
}
