//! Resolving credentials to a user.

use async_trait::async_trait;

use crate::types::{OAuthResult, UserId};

/// Checks a username/password pair.
///
/// Implement this to back the token endpoint with a real user database.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Return the user id for valid credentials, `None` otherwise.
    async fn authenticate(&self, username: &str, password: &str) -> OAuthResult<Option<UserId>>;
}

#[async_trait]
impl<F> Authenticator for F
where
    F: Fn(&str, &str) -> Option<UserId> + Send + Sync,
{
    async fn authenticate(&self, username: &str, password: &str) -> OAuthResult<Option<UserId>> {
        Ok(self(username, password))
    }
}

/// In-memory credential list. A user's id is its position in the list.
#[derive(Debug, Clone, Default)]
pub struct CredentialList {
    entries: Vec<(String, String)>,
}

impl CredentialList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a credential pair and return the id it was assigned.
    pub fn add(&mut self, username: impl Into<String>, password: impl Into<String>) -> UserId {
        self.entries.push((username.into(), password.into()));
        (self.entries.len() - 1) as UserId
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, username: &str, password: &str) -> Option<UserId> {
        self.entries
            .iter()
            .position(|(u, p)| u == username && p == password)
            .map(|i| i as UserId)
    }
}

impl FromIterator<(String, String)> for CredentialList {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Authenticator for CredentialList {
    async fn authenticate(&self, username: &str, password: &str) -> OAuthResult<Option<UserId>> {
        Ok(self.lookup(username, password))
    }
}
