//! Session storage for issued access tokens.
//!
//! Every issued token maps to a [`Session`] that expires after a TTL.
//! The TTL is sliding: each authorized request refreshes it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::types::{OAuthError, OAuthResult, UserId};

/// What the server remembers about an issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Signature binding the token to the client address and user agent.
    pub signature: String,
    pub user_id: UserId,
    pub remote_addr: String,
    pub user_agent: String,
}

/// Backend for token sessions.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store a session for `token`, replacing any previous one.
    async fn insert(&self, token: &str, session: Session, ttl: Duration) -> OAuthResult<()>;

    /// Fetch a live session. Expired sessions are reported as absent.
    async fn get(&self, token: &str) -> OAuthResult<Option<Session>>;

    /// Push the expiry of a live session `ttl` into the future.
    ///
    /// Returns `false` if there was no live session to refresh.
    async fn touch(&self, token: &str, ttl: Duration) -> OAuthResult<bool>;

    /// Delete a session. Returns whether one existed.
    async fn remove(&self, token: &str) -> OAuthResult<bool>;

    /// Drop every expired session and return how many were dropped.
    async fn purge_expired(&self) -> OAuthResult<usize>;
}

struct Entry {
    session: Session,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

fn expiry(now: Instant, ttl: Duration) -> OAuthResult<Instant> {
    now.checked_add(ttl)
        .ok_or_else(|| OAuthError::Store(format!("session TTL of {}s is out of range", ttl.as_secs())))
}

fn store_key(token: &str) -> String {
    format!("token:{token}")
}

/// In-process token store.
///
/// Sessions live only as long as the process. Reads take a shared lock,
/// so concurrent authorization checks do not serialize.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, token: &str, session: Session, ttl: Duration) -> OAuthResult<()> {
        let entry = Entry {
            session,
            expires_at: expiry(Instant::now(), ttl)?,
        };
        self.entries.write().await.insert(store_key(token), entry);
        Ok(())
    }

    async fn get(&self, token: &str) -> OAuthResult<Option<Session>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(&store_key(token))
            .filter(|e| !e.is_expired(now))
            .map(|e| e.session.clone()))
    }

    async fn touch(&self, token: &str, ttl: Duration) -> OAuthResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(&store_key(token)) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = expiry(now, ttl)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, token: &str) -> OAuthResult<bool> {
        Ok(self.entries.write().await.remove(&store_key(token)).is_some())
    }

    async fn purge_expired(&self) -> OAuthResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, "purged expired sessions");
        }
        Ok(purged)
    }
}
