use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "client")]
use url::Url;

#[cfg(feature = "client")]
use crate::api::ApiConfig;
use crate::error::Error;
use crate::token::DEFAULT_SKEW_BUFFER;

/// Default period of the background validity check.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Timing knobs of a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub(crate) check_interval: Duration,
    pub(crate) skew_buffer: Duration,
}

impl SessionSettings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            skew_buffer: DEFAULT_SKEW_BUFFER,
        }
    }

    /// Period of the background validity check (default 60s).
    ///
    /// A zero interval is raised to one second.
    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(Duration::from_secs(1));
        self
    }

    /// Margin subtracted from the token's expiry (default 5s).
    #[must_use]
    pub fn with_skew_buffer(mut self, skew: Duration) -> Self {
        self.skew_buffer = skew;
        self
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    #[must_use]
    pub fn skew_buffer(&self) -> Duration {
        self.skew_buffer
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Client configuration assembled from the environment.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ClientConfig {
    #[cfg(feature = "client")]
    pub api: ApiConfig,
    pub session: SessionSettings,
    /// Where a [`FileTokenStore`](crate::FileTokenStore) keeps the token.
    /// `None` means the session is kept in memory only.
    pub token_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `TINYURL_API_URL`: Backend base URL (default `http://localhost:8080/api`)
    /// - `TINYURL_TOKEN_PATH`: File holding the persisted token
    /// - `TINYURL_CHECK_INTERVAL_SECS`: Validity check period in seconds
    /// - `TINYURL_SKEW_SECS`: Expiry skew buffer in seconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        #[cfg(feature = "client")]
        if let Some(url_str) = lookup("TINYURL_API_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("TINYURL_API_URL: {e}")))?;
            config.api = ApiConfig::new(url)?;
        }

        if let Some(path) = lookup("TINYURL_TOKEN_PATH").filter(|p| !p.trim().is_empty()) {
            config.token_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = lookup("TINYURL_CHECK_INTERVAL_SECS") {
            config.session = config
                .session
                .with_check_interval(parse_secs("TINYURL_CHECK_INTERVAL_SECS", &secs)?);
        }
        if let Some(secs) = lookup("TINYURL_SKEW_SECS") {
            config.session = config
                .session
                .with_skew_buffer(parse_secs("TINYURL_SKEW_SECS", &secs)?);
        }

        Ok(config)
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, Error> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| Error::Config(format!("{name}: {e}")))
}
