//! Bearer-token sources for authenticated requests.
//!
//! The client never stores tokens itself. Requests marked `authenticated`
//! ask the configured [`TokenProvider`] for a token right before each
//! attempt, so a provider that refreshes behind the scenes is picked up by
//! retries too.

use async_lock::RwLock;
use async_trait::async_trait;

use crate::error::ApiError;

/// Async source of bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The current token, or `None` to send the request unauthenticated.
    async fn token(&self) -> Result<Option<String>, ApiError>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<Option<String>, ApiError> {
        Ok(Some(self.0.clone()))
    }
}

/// A token that is set after login and cleared on logout.
#[derive(Debug, Default)]
pub struct SessionToken {
    token: RwLock<Option<String>>,
}

impl SessionToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }

    pub async fn is_set(&self) -> bool {
        self.token.read().await.is_some()
    }
}

#[async_trait]
impl TokenProvider for SessionToken {
    async fn token(&self) -> Result<Option<String>, ApiError> {
        Ok(self.token.read().await.clone())
    }
}
