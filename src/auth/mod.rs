/// Authentication module
///
/// Session lifecycle against the auth service, bearer-token requests with a
/// single refresh-and-retry, and read-only access to token claims.

mod claims;
mod client;
mod request;

pub use claims::peek_claims;
pub use claims::Claims;
pub use client::AuthClient;
pub use client::{DEFAULT_LOGIN_PATH, DEFAULT_REFRESH_PATH};
pub use request::resolve_url;
pub use request::AuthRequest;
