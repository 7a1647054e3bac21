use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Developer,
}

/// The authenticated user as reported by login, refresh and `/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Default)]
struct SessionState {
    identity: Option<Identity>,
    loaded: bool,
    generation: u64,
    established_at: Option<DateTime<Utc>>,
}

/// In-memory mirror of the server session. Clones share state, so one store
/// handed to several clients represents one logged-in user.
///
/// `generation` increases every time a session is established (login or
/// renewal). It never decreases, and clearing does not touch it.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts out logged in, e.g. when resuming a known session.
    pub fn with_identity(identity: Identity) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState {
                identity: Some(identity),
                loaded: true,
                generation: 1,
                established_at: Some(Utc::now()),
            })),
        }
    }

    pub async fn get(&self) -> Option<Identity> {
        self.inner.read().await.identity.clone()
    }

    /// Record a freshly established session.
    pub async fn set(&self, identity: Identity) -> u64 {
        let mut state = self.inner.write().await;
        state.identity = Some(identity);
        state.loaded = true;
        state.generation += 1;
        state.established_at = Some(Utc::now());
        debug!(generation = state.generation, "session established");
        state.generation
    }

    pub async fn clear(&self) {
        let mut state = self.inner.write().await;
        state.identity = None;
        state.loaded = true;
        state.established_at = None;
    }

    /// Whether the session state has been resolved at least once.
    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.loaded
    }

    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    /// Identity and generation read under one lock.
    pub async fn snapshot(&self) -> (Option<Identity>, u64) {
        let state = self.inner.read().await;
        (state.identity.clone(), state.generation)
    }

    /// Seconds since the current session was established, 0 when logged out.
    /// Reported alongside failed renewals.
    pub async fn age_seconds(&self) -> u64 {
        match self.inner.read().await.established_at {
            Some(at) => (Utc::now() - at).num_seconds().max(0) as u64,
            None => 0,
        }
    }
}
