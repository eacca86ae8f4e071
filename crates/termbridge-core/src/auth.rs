//! Authentication collaborator.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier, used to key sessions and workspaces.
    pub id: String,
    /// Display name, echoed back in the closing meta.
    pub name: String,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Credentials presented with a request.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Bearer token, if one was sent.
    pub bearer: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
        }
    }
}

/// Trait for the authentication service.
///
/// The bridge only ever asks who the caller is; login flows live elsewhere.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve the user behind the given credentials.
    async fn current_user(&self, credentials: &Credentials) -> Option<User>;

    /// Whether the credentials belong to a logged-in user.
    async fn is_authenticated(&self, credentials: &Credentials) -> bool {
        self.current_user(credentials).await.is_some()
    }
}

/// Authenticator backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, User>,
}

impl StaticTokenAuthenticator {
    /// Create an authenticator with no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a user.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user: User) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }

    /// Number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn current_user(&self, credentials: &Credentials) -> Option<User> {
        let token = credentials.bearer.as_deref()?;
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_tokens_only() {
        let auth = StaticTokenAuthenticator::new().with_token("t0k", User::new("1", "octo"));

        let user = auth.current_user(&Credentials::bearer("t0k")).await;
        assert_eq!(user, Some(User::new("1", "octo")));

        assert!(!auth.is_authenticated(&Credentials::bearer("nope")).await);
        assert!(!auth.is_authenticated(&Credentials::default()).await);
    }
}
