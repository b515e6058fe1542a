//! Session Registry
//!
//! Keeps the handles of concurrently running sessions, keyed by
//! [`SessionId`]. Sessions share nothing through the registry; it only holds
//! their handles so they can be looked up, cancelled and reaped.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use thiserror::Error;

use super::session::{SessionHandle, SessionId, SessionState};
use crate::config::{StreamConfig, DEFAULT_MAX_CONCURRENT_SESSIONS};
use crate::protocol::ProtocolVariant;

/// Configuration for the registry
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Maximum number of unfinished sessions
    pub max_concurrent_sessions: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
        }
    }
}

impl From<&StreamConfig> for RegistryConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            max_concurrent_sessions: config.max_concurrent_sessions,
        }
    }
}

/// Error when registering a session
///
/// The rejected session is cancelled.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    /// Maximum concurrent sessions reached
    #[error("maximum concurrent sessions reached ({limit})")]
    MaxSessionsReached {
        /// Configured limit
        limit: usize,
    },
    /// A session with this ID is already registered
    #[error("session {0} is already registered")]
    AlreadyRegistered(SessionId),
}

/// Snapshot of a registered session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session ID
    pub id: SessionId,
    /// Protocol variant
    pub variant: ProtocolVariant,
    /// State when the snapshot was taken
    pub state: SessionState,
}

/// Registry of running sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    config: RegistryConfig,
    total_registered: AtomicU64,
}

impl SessionRegistry {
    /// Create a registry with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            total_registered: AtomicU64::new(0),
        }
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Take ownership of a session handle
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError`] if the limit is reached or the ID is taken.
    /// The rejected session is cancelled.
    pub fn register(&self, handle: SessionHandle) -> Result<SessionId, RegisterError> {
        let limit = self.config.max_concurrent_sessions;
        if self.active_count() >= limit {
            tracing::warn!(session_id = %handle.id(), limit, "Session rejected: registry full");
            handle.cancel();
            return Err(RegisterError::MaxSessionsReached { limit });
        }

        let id = handle.id().clone();
        match self.sessions.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                handle.cancel();
                Err(RegisterError::AlreadyRegistered(id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handle);
                self.total_registered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(session_id = %id, "Session registered");
                Ok(id)
            }
        }
    }

    /// Snapshot of a registered session
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<SessionInfo> {
        self.sessions.get(id).map(|handle| SessionInfo {
            id: handle.id().clone(),
            variant: handle.variant(),
            state: handle.state(),
        })
    }

    /// Whether a session is registered
    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove a session and return its handle
    pub fn remove(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    /// Cancel one session
    ///
    /// Returns `false` if no such session is registered.
    pub fn cancel(&self, id: &SessionId) -> bool {
        match self.sessions.get(id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered session
    ///
    /// Returns the number of sessions that were still running.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in &self.sessions {
            if !entry.value().is_finished() {
                cancelled += 1;
            }
            entry.value().cancel();
        }
        tracing::info!(cancelled, "Cancelled all sessions");
        cancelled
    }

    /// Remove finished sessions and return their handles
    ///
    /// Awaiting [`SessionHandle::wait`] on a returned handle does not block.
    pub fn reap_finished(&self) -> Vec<SessionHandle> {
        let finished: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_finished())
            .map(|entry| entry.key().clone())
            .collect();

        finished
            .iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }

    /// Number of sessions that have not finished
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }

    /// Number of registered sessions, finished or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no sessions are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Get total number of sessions registered (lifetime)
    #[must_use]
    pub fn total_registered(&self) -> u64 {
        self.total_registered.load(Ordering::Relaxed)
    }

    /// IDs of all registered sessions
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}
