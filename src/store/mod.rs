/// Token store
///
/// The session lives behind an explicit key-value interface that is handed
/// to the client, instead of ambient global storage. `SessionStore` adds the
/// typed session operations on top of any `TokenStore`.

mod file;
mod memory;

pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;

use crate::error::StorageError;
use crate::session::{Session, StorageKey, TokenPair, UserInfo};

/// Serializes token refreshes against one store.
pub type RefreshGate = tokio::sync::Mutex<()>;

/// Raw key-value storage for session state.
///
/// Implementations must be safe to share between tasks. Writes are
/// last-write-wins.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError>;

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;

    /// Write several keys as one unit.
    ///
    /// The default writes them one by one; stores that can do better
    /// override it.
    fn set_many(&self, entries: &[(StorageKey, String)]) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(*key, value)?;
        }
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError>;

    /// Remove every key.
    fn clear(&self) -> Result<(), StorageError>;

    /// Gate held while a refresh rewrites this store's token pair.
    ///
    /// Every client sharing the store queues on the same gate, so one
    /// expired pair is exchanged exactly once.
    fn refresh_gate(&self) -> &RefreshGate;
}

/// Typed session access over a `TokenStore`
pub trait SessionStore: TokenStore {
    fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.get(StorageKey::AccessToken)
    }

    fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.get(StorageKey::RefreshToken)
    }

    fn user_role(&self) -> Result<Option<String>, StorageError> {
        self.get(StorageKey::UserRole)
    }

    fn user_info(&self) -> Result<Option<UserInfo>, StorageError> {
        match self.get(StorageKey::UserInfo)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let user_info = serde_json::to_string(&session.user)?;
        self.set_many(&[
            (StorageKey::AccessToken, session.tokens.access_token.clone()),
            (StorageKey::RefreshToken, session.tokens.refresh_token.clone()),
            (StorageKey::UserInfo, user_info),
            (StorageKey::UserRole, session.user.role.clone()),
        ])
    }

    /// Replace the token pair. Both tokens land in the same write.
    fn save_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        self.set_many(&[
            (StorageKey::AccessToken, tokens.access_token.clone()),
            (StorageKey::RefreshToken, tokens.refresh_token.clone()),
        ])
    }

    fn clear_session(&self) -> Result<(), StorageError> {
        self.clear()
    }
}

impl<T: TokenStore + ?Sized> SessionStore for T {}
