//! Navigation side channel.
//!
//! When the session ends without the user asking for it, the host
//! application is asked to show the login view along with a machine-readable
//! reason. How navigation happens (router, terminal prompt, window) is up to
//! the [`Navigator`] implementation.

use std::fmt;

use parking_lot::Mutex;

/// Login view path.
pub const LOGIN_PATH: &str = "/login";
/// Signup view path.
pub const SIGNUP_PATH: &str = "/signup";

/// Why the user is being sent to the login view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationReason {
    /// The periodic validity check found the token expired.
    SessionExpired,
    /// The backend rejected a request with 401.
    Unauthorized,
}

impl NavigationReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionExpired => "session_expired",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// Parses the `reason` query value read by the login view.
    #[must_use]
    pub fn parse(reason: &str) -> Option<Self> {
        match reason {
            "session_expired" => Some(Self::SessionExpired),
            "unauthorized" => Some(Self::Unauthorized),
            _ => None,
        }
    }

    /// Message the login view shows for this reason.
    #[must_use]
    pub fn message(self) -> &'static str {
        // Both reasons look the same from the user's side.
        "Your session has expired. Please log in again."
    }

    /// Login path carrying this reason, e.g. `/login?reason=unauthorized`.
    #[must_use]
    pub fn login_location(self) -> String {
        format!(
            "{LOGIN_PATH}?reason={}",
            urlencoding::encode(self.as_str())
        )
    }
}

impl fmt::Display for NavigationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-provided navigation.
///
/// # Example
///
/// ```rust,ignore
/// struct Router { /* ... */ }
///
/// impl Navigator for Router {
///     fn navigate_to_login(&self, reason: NavigationReason) {
///         self.push(&reason.login_location());
///     }
///
///     fn current_path(&self) -> String {
///         self.location().path().to_owned()
///     }
/// }
/// ```
pub trait Navigator: Send + Sync + 'static {
    /// Show the login view, telling it why.
    fn navigate_to_login(&self, reason: NavigationReason);

    /// Path of the view currently displayed.
    fn current_path(&self) -> String;
}

/// True for the login and signup views, where a 401 is part of the flow.
#[must_use]
pub fn is_auth_view(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    path == LOGIN_PATH || path == SIGNUP_PATH
}

/// Navigator that only remembers what it was asked to do.
///
/// Useful for headless hosts and tests.
#[derive(Debug)]
pub struct RecordingNavigator {
    current: Mutex<String>,
    redirects: Mutex<Vec<NavigationReason>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::at("/")
    }

    /// Navigator whose current view is `path`.
    #[must_use]
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(path.into()),
            redirects: Mutex::new(Vec::new()),
        }
    }

    pub fn set_current_path(&self, path: impl Into<String>) {
        *self.current.lock() = path.into();
    }

    /// Reasons passed to [`Navigator::navigate_to_login`], oldest first.
    #[must_use]
    pub fn redirects(&self) -> Vec<NavigationReason> {
        self.redirects.lock().clone()
    }
}

impl Default for RecordingNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate_to_login(&self, reason: NavigationReason) {
        self.redirects.lock().push(reason);
        *self.current.lock() = LOGIN_PATH.to_owned();
    }

    fn current_path(&self) -> String {
        self.current.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_round_trips_through_query_value() {
        for reason in [NavigationReason::SessionExpired, NavigationReason::Unauthorized] {
            assert_eq!(NavigationReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(NavigationReason::parse("bogus"), None);
    }

    #[test]
    fn login_location_carries_reason() {
        assert_eq!(
            NavigationReason::SessionExpired.login_location(),
            "/login?reason=session_expired"
        );
    }

    #[test]
    fn auth_views_ignore_query_and_trailing_slash() {
        assert!(is_auth_view("/login"));
        assert!(is_auth_view("/signup/"));
        assert!(is_auth_view("/login?reason=unauthorized"));
        assert!(!is_auth_view("/dashboard"));
        assert!(!is_auth_view("/loginx"));
    }

    #[test]
    fn recording_navigator_moves_to_login() {
        let nav = RecordingNavigator::at("/dashboard");
        nav.navigate_to_login(NavigationReason::Unauthorized);
        assert_eq!(nav.current_path(), LOGIN_PATH);
        assert_eq!(nav.redirects(), vec![NavigationReason::Unauthorized]);
    }
}
