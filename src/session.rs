//! The session manager.
//!
//! [`SessionManager`] is the single source of truth for "who is signed in".
//! It owns the persisted token, publishes the derived [`Identity`] on a
//! replay-latest channel and, while a session exists, re-checks the token on a
//! fixed period so an expired session is torn down even if the user never
//! makes another request.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tinyurl_session::{ApiClient, ApiConfig, Credentials, FileTokenStore, SessionManager};
//!
//! let manager = SessionManager::builder(
//!     ApiClient::new(ApiConfig::default()),
//!     FileTokenStore::new("session.json"),
//!     Arc::new(router),
//! )
//! .build();
//!
//! manager.initialize();
//! let mut users = manager.subscribe();
//! manager.login(&Credentials::new("ana@example.com", "secret")).await?;
//! ```

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::SessionSettings;
use crate::error::Error;
use crate::navigation::{NavigationReason, Navigator};
use crate::storage::TokenStore;
use crate::token;
use crate::types::{AuthResponse, Credentials, Identity, Registration};

/// Backend authentication endpoints used by the session manager.
///
/// Implemented by [`ApiClient`](crate::ApiClient); tests and alternative
/// transports provide their own.
pub trait AuthApi: Send + Sync + 'static {
    /// `POST /login`.
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<AuthResponse, Error>> + Send;

    /// `POST /signup`.
    fn signup(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<AuthResponse, Error>> + Send;
}

/// Client-side session owner.
///
/// Cheap to clone; clones share the same session. The background validity
/// check stops when the session ends or when the last clone is dropped.
pub struct SessionManager<A, S> {
    inner: Arc<Inner<A, S>>,
}

// Manual Clone: avoid derive adding `A: Clone, S: Clone` bounds.
impl<A, S> Clone for SessionManager<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<A, S> {
    api: A,
    store: S,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    state: watch::Sender<Option<Identity>>,
    validity_watch: Mutex<Option<ValidityWatch>>,
    // Held across every read-decide-write of the session: initialize,
    // establish, logout and each validity tick. Taken before `validity_watch`.
    transition: Mutex<()>,
}

/// Handle to the running validity check. Dropping it cancels the task.
struct ValidityWatch {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl Drop for ValidityWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder<A, S> {
    api: A,
    store: S,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl<A: AuthApi, S: TokenStore> SessionManagerBuilder<A, S> {
    /// Use a clock other than the system clock.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the manager. The session starts empty until
    /// [`initialize`](SessionManager::initialize) reads the store.
    #[must_use]
    pub fn build(self) -> SessionManager<A, S> {
        let (state, _) = watch::channel(None);
        SessionManager {
            inner: Arc::new(Inner {
                api: self.api,
                store: self.store,
                navigator: self.navigator,
                clock: self.clock,
                settings: self.settings,
                state,
                validity_watch: Mutex::new(None),
                transition: Mutex::new(()),
            }),
        }
    }
}

impl<A: AuthApi, S: TokenStore> SessionManager<A, S> {
    /// Manager with default settings and the system clock.
    #[must_use]
    pub fn new(api: A, store: S, navigator: Arc<dyn Navigator>) -> Self {
        Self::builder(api, store, navigator).build()
    }

    #[must_use]
    pub fn builder(api: A, store: S, navigator: Arc<dyn Navigator>) -> SessionManagerBuilder<A, S> {
        SessionManagerBuilder {
            api,
            store,
            navigator,
            clock: Arc::new(SystemClock),
            settings: SessionSettings::default(),
        }
    }

    /// Restore the session left in the store by a previous run.
    ///
    /// A valid token is decoded and published and the validity check starts.
    /// An invalid one is handled exactly like an expiry found by the check.
    pub fn initialize(&self) {
        let _transition = self.inner.transition.lock();
        match self.inner.load_token() {
            None => {
                self.inner.state.send_if_modified(|state| state.take().is_some());
            }
            Some(token) if self.inner.token_is_valid(&token) => {
                let identity = token::decode_identity(&token);
                if let Some(identity) = &identity {
                    tracing::info!(user_id = %identity.id, "Restored session");
                }
                self.inner.state.send_replace(identity);
                self.start_validity_watch();
            }
            Some(_) => self.inner.expire(),
        }
    }

    /// Sign in and start a session.
    ///
    /// Returns the identity decoded from the new token, or `None` if the
    /// backend returned a token the client cannot read.
    ///
    /// # Errors
    ///
    /// Backend and transport errors are returned unchanged, without retry.
    /// Returns [`Error::Storage`] if the token cannot be persisted.
    pub async fn login(&self, credentials: &Credentials) -> Result<Option<Identity>, Error> {
        let response = self.inner.api.login(credentials).await?;
        self.establish(&response.token, "login")
    }

    /// Create an account and start a session.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn signup(&self, registration: &Registration) -> Result<Option<Identity>, Error> {
        let response = self.inner.api.signup(registration).await?;
        self.establish(&response.token, "signup")
    }

    /// End the session. Safe to call when no session exists.
    pub fn logout(&self) {
        let _transition = self.inner.transition.lock();
        if self.inner.end_session() {
            tracing::info!("Signed out");
        }
    }

    /// Persisted token, unvalidated.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner.load_token()
    }

    /// Whether a persisted token exists and passes the validity rule.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .load_token()
            .is_some_and(|token| self.inner.token_is_valid(&token))
    }

    /// Last published identity.
    #[must_use]
    pub fn current_user(&self) -> Option<Identity> {
        self.inner.state.borrow().clone()
    }

    /// Stream of session state.
    ///
    /// The receiver sees the current value immediately via
    /// [`borrow`](watch::Receiver::borrow); later changes wake
    /// [`changed`](watch::Receiver::changed). Intermediate values may be
    /// skipped by a slow reader, the latest one never is.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.state.subscribe()
    }

    /// Whether the background validity check is running.
    #[must_use]
    pub fn has_validity_watch(&self) -> bool {
        self.inner.validity_watch.lock().is_some()
    }

    pub(crate) fn navigator(&self) -> &dyn Navigator {
        self.inner.navigator.as_ref()
    }

    fn establish(&self, token: &str, operation: &'static str) -> Result<Option<Identity>, Error> {
        let _transition = self.inner.transition.lock();
        self.inner.store.save(token)?;

        let identity = token::decode_identity(token);
        match &identity {
            Some(identity) => {
                tracing::info!(user_id = %identity.id, operation, "Session established");
            }
            None => {
                tracing::warn!(operation, "Backend returned a token that could not be decoded");
            }
        }
        self.inner.state.send_replace(identity.clone());
        self.start_validity_watch();
        Ok(identity)
    }

    /// Start (or restart) the periodic validity check.
    fn start_validity_watch(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No Tokio runtime; periodic session validity check disabled");
            return;
        };

        let cancel = CancellationToken::new();
        let period = self.inner.settings.check_interval;
        let task = runtime.spawn(run_validity_watch(
            Arc::downgrade(&self.inner),
            cancel.clone(),
            Instant::now() + period,
            period,
        ));

        // Replacing the slot drops (and so cancels) any previous check.
        let previous = self
            .inner
            .validity_watch
            .lock()
            .replace(ValidityWatch { cancel, _task: task });
        drop(previous);
    }
}

async fn run_validity_watch<A: AuthApi, S: TokenStore>(
    inner: Weak<Inner<A, S>>,
    cancel: CancellationToken,
    first_tick: Instant,
    period: std::time::Duration,
) {
    let mut ticker = tokio::time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(inner) = inner.upgrade() else { break };
        if inner.check_validity(&cancel).is_break() {
            break;
        }
    }
}

impl<A, S: TokenStore> Inner<A, S> {
    fn load_token(&self) -> Option<String> {
        self.store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read persisted token");
            None
        })
    }

    fn token_is_valid(&self, token: &str) -> bool {
        token::is_valid_at(token, self.clock.now(), self.settings.skew_buffer)
    }

    /// One tick of the watch owning `cancel`.
    fn check_validity(&self, cancel: &CancellationToken) -> ControlFlow<()> {
        let _transition = self.transition.lock();
        // A newer session replaced this watch while the tick was pending.
        if cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        match self.load_token() {
            Some(token) if self.token_is_valid(&token) => {
                tracing::debug!("Session token still valid");
                ControlFlow::Continue(())
            }
            Some(_) => {
                self.expire();
                ControlFlow::Break(())
            }
            None => {
                tracing::debug!("Persisted token gone; stopping validity check");
                self.end_session();
                ControlFlow::Break(())
            }
        }
    }

    fn expire(&self) {
        tracing::warn!("Session token expired");
        self.end_session();
        self.navigator
            .navigate_to_login(NavigationReason::SessionExpired);
    }

    /// Clears the token, publishes "no user" and stops the validity check.
    ///
    /// Returns whether there was anything to end.
    fn end_session(&self) -> bool {
        let had_watch = self.validity_watch.lock().take().is_some();

        let had_token = match self.store.load() {
            Ok(token) => token.is_some(),
            Err(_) => true,
        };
        if had_token {
            if let Err(e) = self.store.clear() {
                tracing::warn!(error = %e, "Failed to remove persisted token");
            }
        }

        let had_user = self.state.send_if_modified(|state| state.take().is_some());
        had_watch || had_token || had_user
    }
}
