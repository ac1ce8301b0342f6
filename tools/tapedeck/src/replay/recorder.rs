//! Recording sessions and the thread-local capture suppression flag.
//!
//! Suppression follows the thread. Use [`spawn`] or [`Suppression`] when a
//! captured call computes its result on another thread.

use crate::errors::TapedeckError;
use crate::logging::log_event;
use crate::replay::recording::{CapturedCall, Cassette};
use crate::replay::session::{SessionMode, SessionRegistry};
use crate::replay::spec::{compile_specs, CompiledSpec, SpecSource};
use crate::replay::target::{CallResult, Callable};
use crate::replay::wrapper::{InterceptionScope, SessionDriver};
use crate::runtime::{Clock, ProductionClock};
use serde_json::{json, Value};
use std::cell::Cell;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

// ── Thread-local suppression ──────────────────────────────────────────────────

thread_local! {
    static RECORDING_SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// True while the current thread is computing the result of a captured call.
pub fn recording_suppressed() -> bool {
    RECORDING_SUPPRESSED.with(Cell::get)
}

/// Sets the suppression flag for the current thread and restores the previous
/// value when dropped.
pub struct SuppressionGuard {
    previous: bool,
}

impl SuppressionGuard {
    pub fn set(suppressed: bool) -> Self {
        let previous = RECORDING_SUPPRESSED.with(|cell| cell.replace(suppressed));
        Self { previous }
    }
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        RECORDING_SUPPRESSED.with(|cell| cell.set(self.previous));
    }
}

/// A snapshot of the suppression flag that can be carried to another thread.
///
/// New threads start unsuppressed. Work a captured call hands off to a worker
/// is part of that call's result, so the worker should re-enter the snapshot:
///
/// ```
/// use tapedeck::replay::recorder::Suppression;
///
/// let carried = Suppression::current();
/// std::thread::spawn(move || {
///     let _entered = carried.enter();
///     // intercepted calls here are captured only if the parent's would be
/// })
/// .join()
/// .expect("worker");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suppression {
    suppressed: bool,
}

impl Suppression {
    pub fn current() -> Self {
        Self {
            suppressed: recording_suppressed(),
        }
    }

    pub fn is_suppressed(self) -> bool {
        self.suppressed
    }

    /// Apply the snapshot to the current thread until the guard is dropped.
    pub fn enter(self) -> SuppressionGuard {
        SuppressionGuard::set(self.suppressed)
    }
}

/// `std::thread::spawn` that carries the caller's suppression flag into the
/// new thread.
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let carried = Suppression::current();
    std::thread::spawn(move || {
        let _entered = carried.enter();
        f()
    })
}

// ── Recorder ──────────────────────────────────────────────────────────────────

pub struct Recorder {
    calls: Mutex<Vec<CapturedCall>>,
    seeded: usize,
}

impl Recorder {
    /// Start empty, or keep the calls of `seed` and append after them.
    pub fn new(seed: Option<Cassette>) -> Self {
        let calls = seed.map(|c| c.calls).unwrap_or_default();
        Self {
            seeded: calls.len(),
            calls: Mutex::new(calls),
        }
    }

    pub fn append(&self, call: CapturedCall) {
        self.calls.lock().expect("recorder calls lock").push(call);
    }

    pub fn len(&self) -> usize {
        self.calls.lock().expect("recorder calls lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of calls captured by this session, not counting the seed.
    pub fn captured(&self) -> usize {
        self.len() - self.seeded
    }

    /// Run the real callable with capture suppressed and append its
    /// transformed result.
    pub fn capture(&self, spec: &CompiledSpec, original: &Callable, args: Vec<Value>) -> CallResult {
        let arg_key = (spec.arg_key_fn)(&args);
        let _suppressed = SuppressionGuard::set(true);
        let return_value = (spec.return_transformer)(original.invoke(args)?);
        self.append(CapturedCall {
            target_id: spec.target_id().to_string(),
            arg_key,
            return_value: return_value.clone(),
        });
        Ok(return_value)
    }

    pub fn finish(&self, clock: &dyn Clock) -> Cassette {
        let calls = self.calls.lock().expect("recorder calls lock").clone();
        Cassette::new(calls, clock.now_unix_ns())
    }
}

// ── Session entry point ───────────────────────────────────────────────────────

/// Run `body` with every spec's target recording into a new cassette.
pub fn record<T>(
    specs: impl Into<SpecSource>,
    body: impl FnOnce() -> Result<T, TapedeckError>,
    seed: Option<Cassette>,
) -> Result<(T, Cassette), TapedeckError> {
    record_with_clock(specs, body, seed, &ProductionClock)
}

pub fn record_with_clock<T>(
    specs: impl Into<SpecSource>,
    body: impl FnOnce() -> Result<T, TapedeckError>,
    seed: Option<Cassette>,
    clock: &dyn Clock,
) -> Result<(T, Cassette), TapedeckError> {
    let compiled = compile_specs(specs)?;
    let recorder = Arc::new(Recorder::new(seed));
    let session = SessionRegistry::global().enter(SessionMode::Recording);
    log_event(
        "info",
        "session_start",
        json!({
            "mode": session.mode().as_str(),
            "token": session.token().as_u64(),
            "targets": compiled.iter().map(|s| s.target_id()).collect::<Vec<_>>(),
            "seeded_calls": recorder.len(),
        }),
    );

    let result = {
        let _scope = InterceptionScope::install(&compiled, &SessionDriver::Recording(recorder.clone()));
        let _unsuppressed = SuppressionGuard::set(false);
        body()
    };

    let cassette = recorder.finish(clock);
    log_event(
        if result.is_ok() { "info" } else { "warn" },
        "session_end",
        json!({
            "mode": session.mode().as_str(),
            "token": session.token().as_u64(),
            "ok": result.is_ok(),
            "captured_calls": recorder.captured(),
        }),
    );
    drop(session);
    Ok((result?, cassette))
}
