//! Authentication hook for resolving a caller's identity.
//!
//! huddle doesn't verify identity itself; that belongs to your identity
//! provider. It defines the [`Authenticator`] trait: one async method that
//! turns a bearer token into a [`PlayerId`] or fails. The engine calls it
//! on every command and heartbeat.
//!
//! [`TokenTable`] is a ready-made implementation backed by an in-memory
//! map, good enough for the demo and for tests.

use std::collections::HashMap;
use std::future::Future;

use huddle_protocol::PlayerId;
use rand::Rng;
use tokio::sync::RwLock;

use crate::SessionError;

/// Validates a bearer token and returns the caller's identity.
///
/// # Example
///
/// ```rust
/// use huddle_protocol::PlayerId;
/// use huddle_session::{Authenticator, SessionError};
///
/// /// Trusts tokens of the form `dev:<id>`. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
///         token
///             .strip_prefix("dev:")
///             .filter(|id| !id.is_empty())
///             .map(PlayerId::new)
///             .ok_or_else(|| SessionError::AuthFailed("expected dev:<id>".into()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Resolves `token` to a participant.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] if the token is unknown, expired or
    /// malformed.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<PlayerId, SessionError>> + Send;
}

/// An [`Authenticator`] over an in-memory token map.
#[derive(Debug, Default)]
pub struct TokenTable {
    tokens: RwLock<HashMap<String, PlayerId>>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh random token for `player`.
    pub async fn issue(&self, player: PlayerId) -> String {
        let token = generate_token();
        self.tokens.write().await.insert(token.clone(), player);
        token
    }

    /// Registers a caller-chosen token.
    pub async fn insert(&self, token: impl Into<String>, player: PlayerId) {
        self.tokens.write().await.insert(token.into(), player);
    }

    /// Invalidates a token. Returns `true` if it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }
}

impl Authenticator for TokenTable {
    async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
        self.tokens
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| SessionError::AuthFailed("unknown token".into()))
    }
}

/// A 32-character hex string (128 bits of entropy).
pub(crate) fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
