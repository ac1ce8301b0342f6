//! Playback: answer intercepted calls from a cassette instead of running them.

use crate::errors::{display_key, TapedeckError};
use crate::logging::log_event;
use crate::replay::recording::{CapturedCall, Cassette};
use crate::replay::session::{SessionMode, SessionRegistry};
use crate::replay::spec::{compile_specs, SpecSource};
use crate::replay::target::CallResult;
use crate::replay::wrapper::{InterceptionScope, SessionDriver};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

// ── OrderScope ────────────────────────────────────────────────────────────────

/// Which recorded calls must be consumed in their relative recorded order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderScope {
    /// One FIFO across every call in the cassette.
    Global,
    /// One FIFO per target, ignoring arg keys.
    PerTarget,
    /// One FIFO per `(target, arg key)` pair.
    #[default]
    PerKey,
}

impl OrderScope {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderScope::Global => "global",
            OrderScope::PerTarget => "per_target",
            OrderScope::PerKey => "per_key",
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, OrderScope::PerKey)
    }
}

impl fmt::Display for OrderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ReplayMatcher ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatchKey {
    target_id: String,
    arg_key: String,
}

impl MatchKey {
    fn new(target_id: &str, arg_key: &Value) -> Self {
        // serde_json renders object keys sorted, so equal keys render equally.
        Self {
            target_id: target_id.to_string(),
            arg_key: arg_key.to_string(),
        }
    }
}

/// Consumes a cassette's calls in per-key FIFO order. Each queue holds
/// indices into `calls`.
pub struct ReplayMatcher {
    scope: OrderScope,
    calls: Vec<CapturedCall>,
    queues: Mutex<HashMap<MatchKey, VecDeque<usize>>>,
}

impl ReplayMatcher {
    pub fn build(cassette: &Cassette, scope: OrderScope) -> Result<Self, TapedeckError> {
        if !scope.is_supported() {
            return Err(TapedeckError::UnsupportedOrderScope(scope));
        }
        let mut queues: HashMap<MatchKey, VecDeque<usize>> = HashMap::new();
        for (idx, call) in cassette.calls.iter().enumerate() {
            queues
                .entry(MatchKey::new(&call.target_id, &call.arg_key))
                .or_default()
                .push_back(idx);
        }
        Ok(Self {
            scope,
            calls: cassette.calls.clone(),
            queues: Mutex::new(queues),
        })
    }

    pub fn scope(&self) -> OrderScope {
        self.scope
    }

    /// Pop the next recorded result for this call shape.
    pub fn lookup(&self, target_id: &str, arg_key: &Value) -> CallResult {
        let next = {
            let mut queues = self.queues.lock().expect("replay queues lock");
            queues
                .get_mut(&MatchKey::new(target_id, arg_key))
                .and_then(VecDeque::pop_front)
        };
        match next {
            Some(idx) => Ok(self.calls[idx].return_value.clone()),
            None => {
                log_event(
                    "error",
                    "cassette_exhausted",
                    json!({ "target_id": target_id, "arg_key": display_key(arg_key) }),
                );
                Err(TapedeckError::exhausted(target_id, arg_key))
            }
        }
    }

    /// Recorded calls not consumed yet.
    pub fn remaining(&self) -> usize {
        self.queues
            .lock()
            .expect("replay queues lock")
            .values()
            .map(VecDeque::len)
            .sum()
    }

    /// Unconsumed calls in cassette order.
    pub fn unplayed(&self) -> Vec<CapturedCall> {
        let mut indices: Vec<usize> = self
            .queues
            .lock()
            .expect("replay queues lock")
            .values()
            .flat_map(|q| q.iter().copied())
            .collect();
        indices.sort_unstable();
        indices.into_iter().map(|i| self.calls[i].clone()).collect()
    }
}

// ── Session entry point ───────────────────────────────────────────────────────

/// Run `body` with every spec's recordable calls answered from `cassette`.
pub fn playback<T>(
    specs: impl Into<SpecSource>,
    cassette: &Cassette,
    body: impl FnOnce() -> Result<T, TapedeckError>,
) -> Result<T, TapedeckError> {
    playback_with_scope(specs, cassette, OrderScope::PerKey, body)
}

pub fn playback_with_scope<T>(
    specs: impl Into<SpecSource>,
    cassette: &Cassette,
    scope: OrderScope,
    body: impl FnOnce() -> Result<T, TapedeckError>,
) -> Result<T, TapedeckError> {
    let compiled = compile_specs(specs)?;
    let matcher = Arc::new(ReplayMatcher::build(cassette, scope)?);
    let session = SessionRegistry::global().enter(SessionMode::Replaying);
    log_event(
        "info",
        "session_start",
        json!({
            "mode": session.mode().as_str(),
            "token": session.token().as_u64(),
            "targets": compiled.iter().map(|s| s.target_id()).collect::<Vec<_>>(),
            "order_scope": matcher.scope().as_str(),
            "recorded_calls": cassette.calls.len(),
        }),
    );

    let result = {
        let _scope = InterceptionScope::install(&compiled, &SessionDriver::Playback(matcher.clone()));
        body()
    };

    log_event(
        if result.is_ok() { "info" } else { "warn" },
        "session_end",
        json!({
            "mode": session.mode().as_str(),
            "token": session.token().as_u64(),
            "ok": result.is_ok(),
            "unplayed_calls": matcher.remaining(),
        }),
    );
    result
}
