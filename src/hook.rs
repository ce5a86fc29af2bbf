//! Hook registry for execution events.

use crate::events::{EventKind, EventSink, ExecutionEvent};
use ahash::AHashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;

type HookFn = Arc<dyn Fn(&ExecutionEvent) + Send + Sync + 'static>;

/// A registry of callbacks keyed by event kind.
///
/// The registry is itself an [`EventSink`], so it can be installed on a pipeline
/// directly or shared through an `Arc` and extended after the pipeline is built.
pub struct HookRegistry {
    hooks: RwLock<AHashMap<EventKind, SmallVec<[HookFn; 2]>>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(AHashMap::new()),
        }
    }

    /// Adds a hook for every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, f: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.hooks.write().entry(kind).or_default().push(Arc::new(f));
    }

    /// Sets the hook to call when a retry is about to happen.
    pub fn set_on_retry<F>(&self, f: F)
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.on(EventKind::Retrying, move |event| {
            if let ExecutionEvent::Retrying { attempt, .. } = event {
                f(*attempt);
            }
        });
    }

    /// Sets the hook to call when the circuit breaker opens.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::BreakerOpened, move |_| f());
    }

    /// Sets the hook to call when the circuit breaker half-opens.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::BreakerHalfOpened, move |_| f());
    }

    /// Sets the hook to call when the circuit breaker closes.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::BreakerClosed, move |_| f());
    }

    /// Sets the hook to call when the fallback replaces a failure.
    pub fn set_on_fallback<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventKind::FallbackInvoked, move |_| f());
    }

    /// Number of hooks registered for `kind`.
    pub fn len(&self, kind: EventKind) -> usize {
        self.hooks.read().get(&kind).map_or(0, |hooks| hooks.len())
    }

    /// True when no hook is registered at all.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().values().all(|hooks| hooks.is_empty())
    }
}

impl EventSink for HookRegistry {
    fn emit(&self, event: &ExecutionEvent) {
        // Clone the hooks out so a hook may register further hooks.
        let hooks: SmallVec<[HookFn; 2]> = match self.hooks.read().get(&event.kind()) {
            Some(hooks) => hooks.clone(),
            None => return,
        };

        for hook in hooks {
            hook(event);
        }
    }
}
