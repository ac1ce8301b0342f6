//! Process-wide table of active recording and playback sessions.
//!
//! The table is advisory: it answers "what mode am I in" for shared code and
//! flags conflicting concurrent sessions. It never guards the wrapped targets.

use crate::errors::TapedeckError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Recording,
    Replaying,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Recording => "recording",
            SessionMode::Replaying => "replaying",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl SessionToken {
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: Mutex<HashMap<SessionToken, SessionMode>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static SessionRegistry {
        static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SessionRegistry::new)
    }

    pub fn enter_state(&self, token: SessionToken, mode: SessionMode) {
        self.lock().insert(token, mode);
    }

    pub fn exit_state(&self, token: SessionToken) {
        self.lock().remove(&token);
    }

    /// Register `mode` under a fresh token until the guard is dropped.
    pub fn enter(&self, mode: SessionMode) -> SessionGuard<'_> {
        let token = SessionToken::next();
        self.enter_state(token, mode);
        SessionGuard {
            registry: self,
            token,
            mode,
        }
    }

    pub fn current_state(&self) -> Result<Option<SessionMode>, TapedeckError> {
        let modes: BTreeSet<SessionMode> = self.lock().values().copied().collect();
        let mut iter = modes.iter();
        match (iter.next(), iter.next()) {
            (None, _) => Ok(None),
            (Some(mode), None) => Ok(Some(*mode)),
            _ => Err(TapedeckError::AmbiguousSessionState {
                modes: modes
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(" and "),
            }),
        }
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionToken, SessionMode>> {
        // Removal has to succeed on unwind paths too, so poisoning is ignored.
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct SessionGuard<'a> {
    registry: &'a SessionRegistry,
    token: SessionToken,
    mode: SessionMode,
}

impl SessionGuard<'_> {
    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.registry.exit_state(self.token);
    }
}

pub fn enter_state(token: SessionToken, mode: SessionMode) {
    SessionRegistry::global().enter_state(token, mode);
}

pub fn exit_state(token: SessionToken) {
    SessionRegistry::global().exit_state(token);
}

pub fn current_state() -> Result<Option<SessionMode>, TapedeckError> {
    SessionRegistry::global().current_state()
}
