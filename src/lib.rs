//! Client library for the news portal backend.
//!
//! [`auth::AuthClient`] logs users in, keeps their session in an injected
//! [`store::TokenStore`], and sends bearer-authenticated requests that
//! survive one expired access token by refreshing and retrying once.

pub mod auth;
pub mod configuration;
pub mod error;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod validators;

pub use auth::{AuthClient, AuthRequest};
pub use error::{AppError, AuthError};
pub use session::{Session, StorageKey, TokenPair, UserInfo};
pub use store::{FileTokenStore, MemoryTokenStore, SessionStore, TokenStore};
