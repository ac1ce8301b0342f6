//! Call targets: named indirection cells that sessions temporarily override.
//!
//! Code under test never calls an intercepted function directly. It holds an
//! `Arc<Target>` and goes through [`Target::call`], so a session can swap the
//! implementation for its lifetime and put the original back afterwards.

use crate::errors::TapedeckError;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub type CallResult = Result<Value, TapedeckError>;

type CallFn = dyn Fn(Vec<Value>) -> CallResult + Send + Sync;

/// Descriptive metadata carried over from an original callable to its wrappers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallableMeta {
    pub name: String,
    pub doc: Option<String>,
    pub arity: Option<usize>,
}

#[derive(Clone)]
pub struct Callable {
    meta: CallableMeta,
    func: Arc<CallFn>,
}

impl Callable {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(Vec<Value>) -> CallResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            meta: CallableMeta {
                name: name.into(),
                ..CallableMeta::default()
            },
            func: Arc::new(func),
        }
    }

    pub fn with_meta(
        meta: CallableMeta,
        func: impl Fn(Vec<Value>) -> CallResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            meta,
            func: Arc::new(func),
        }
    }

    pub fn meta(&self) -> &CallableMeta {
        &self.meta
    }

    pub fn invoke(&self, args: Vec<Value>) -> CallResult {
        (self.func)(args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("meta", &self.meta).finish()
    }
}

type LayerFn = dyn Fn(Callable) -> Callable + Send + Sync;

static NEXT_LAYER: AtomicU64 = AtomicU64::new(1);

struct Layer {
    id: u64,
    build: Arc<LayerFn>,
}

/// The original callable plus every live override, innermost first.
struct Slot {
    original: Callable,
    layers: Vec<Layer>,
    active: Callable,
}

impl Slot {
    fn rebuild(&mut self) {
        self.active = self
            .layers
            .iter()
            .fold(self.original.clone(), |inner, layer| (layer.build)(inner));
    }
}

pub struct Target {
    id: String,
    slot: RwLock<Slot>,
}

impl Target {
    /// Create a target whose original implementation is `func`. The target id
    /// doubles as the callable's name.
    pub fn new(
        id: impl Into<String>,
        func: impl Fn(Vec<Value>) -> CallResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        let id = id.into();
        let callable = Callable::new(id.clone(), func);
        Self::from_callable(id, callable)
    }

    pub fn from_callable(id: impl Into<String>, callable: Callable) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            slot: RwLock::new(Slot {
                original: callable.clone(),
                layers: Vec::new(),
                active: callable,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn current(&self) -> Callable {
        self.slot.read().expect("target read lock").active.clone()
    }

    /// Invoke whatever implementation is installed right now.
    pub fn call(&self, args: Vec<Value>) -> CallResult {
        // Clone out of the lock so the callable may re-enter this target.
        let callable = self.current();
        callable.invoke(args)
    }

    /// Install `callable` until the returned guard is dropped.
    pub fn install(self: &Arc<Self>, callable: Callable) -> Installation {
        self.intercept(move |_| callable.clone())
    }

    /// Layer `build(inner)` over the installed callable until the returned
    /// guard is dropped. `build` is re-run whenever a layer beneath it goes
    /// away, so guards may be dropped in any order. It runs under the write
    /// lock and must not call back into this target.
    pub fn intercept(
        self: &Arc<Self>,
        build: impl Fn(Callable) -> Callable + Send + Sync + 'static,
    ) -> Installation {
        let id = NEXT_LAYER.fetch_add(1, Ordering::Relaxed);
        let build: Arc<LayerFn> = Arc::new(build);
        {
            let mut slot = self.slot.write().expect("target write lock");
            slot.active = build(slot.active.clone());
            slot.layers.push(Layer { id, build });
        }
        Installation {
            target: Arc::clone(self),
            layer: id,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target").field("id", &self.id).finish()
    }
}

/// Removes one override layer on every exit path. Layers above it are rebuilt
/// on top of whatever remains.
pub struct Installation {
    target: Arc<Target>,
    layer: u64,
}

impl Drop for Installation {
    fn drop(&mut self) {
        // A poisoned lock still holds a usable slot; restoring matters more.
        let mut slot = match self.target.slot.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.layers.retain(|layer| layer.id != self.layer);
        slot.rebuild();
    }
}
