#![doc = include_str!("../README.md")]

#[cfg(feature = "client")]
pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod navigation;
pub mod request;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "client")]
pub use api::{ApiClient, ApiConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, SessionSettings};
pub use error::{Error, ErrorCode, api_error};
pub use interceptor::AuthInterceptor;
pub use navigation::{NavigationReason, Navigator, RecordingNavigator, is_auth_view};
pub use request::OutgoingRequest;
pub use session::{AuthApi, SessionManager, SessionManagerBuilder};
pub use storage::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::{Claims, DecodeError, decode_claims, decode_identity};
pub use types::{
    AuthResponse, Credentials, Identity, Registration, ResolveResponse, ShortUrl, ShortenResponse,
    UserId,
};
