//! Registry mapping callback userdata back to live session state
//!
//! The engine hands the `userdata` of a pipeline back on every callback,
//! from threads we do not own and possibly after the session is gone. The
//! userdata is therefore never a pointer: it is a token looked up here. A
//! token whose binding was released simply fails to resolve.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, trace};
use once_cell::sync::Lazy;

use crate::events::EventQueue;
use crate::pipeline::QosData;

/// Host-side reactions to engine notifications. Always invoked on the
/// thread draining the binding's queue.
pub trait BindingTarget: Send + Sync {
    fn finished(&self);
    fn failed(&self, message: &str);
    fn qos(&self, qos: &QosData);
}

/// Opaque userdata registered with the engine. Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingToken(usize);

impl BindingToken {
    pub fn as_userdata(self) -> usize {
        self.0
    }

    pub fn from_userdata(userdata: usize) -> Self {
        Self(userdata)
    }
}

impl std::fmt::Display for BindingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a pipeline's callbacks go.
pub struct InstanceBinding {
    queue: Arc<EventQueue>,
    target: Arc<dyn BindingTarget>,
    eos_seen: AtomicBool,
    error_seen: AtomicBool,
}

impl InstanceBinding {
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn target(&self) -> &dyn BindingTarget {
        self.target.as_ref()
    }

    /// Set from the callback thread itself, so a consumer blocked waiting
    /// for end-of-stream can see it without draining the queue.
    pub fn mark_eos(&self) {
        self.eos_seen.store(true, Ordering::Release);
    }

    pub fn mark_error(&self) {
        self.error_seen.store(true, Ordering::Release);
    }

    pub fn eos_seen(&self) -> bool {
        self.eos_seen.load(Ordering::Acquire)
    }

    pub fn error_seen(&self) -> bool {
        self.error_seen.load(Ordering::Acquire)
    }

    /// Forget earlier notifications, for a pipeline being set up again.
    pub fn rearm(&self) {
        self.eos_seen.store(false, Ordering::Release);
        self.error_seen.store(false, Ordering::Release);
    }
}

pub struct BindingArena {
    bindings: RwLock<HashMap<usize, Arc<InstanceBinding>>>,
    next: AtomicUsize,
}

impl BindingArena {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            next: AtomicUsize::new(1),
        }
    }

    pub fn register(
        &self,
        queue: Arc<EventQueue>,
        target: Arc<dyn BindingTarget>,
    ) -> BindingToken {
        let token = BindingToken(self.next.fetch_add(1, Ordering::Relaxed));
        let binding = Arc::new(InstanceBinding {
            queue,
            target,
            eos_seen: AtomicBool::new(false),
            error_seen: AtomicBool::new(false),
        });

        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.0, binding);
        debug!("Registered callback binding {}", token);
        token
    }

    pub fn resolve(&self, token: BindingToken) -> Option<Arc<InstanceBinding>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&token.0)
            .cloned()
    }

    /// Unregister `token`. Callbacks arriving later fail to resolve and are
    /// dropped.
    pub fn release(&self, token: BindingToken) -> bool {
        let removed = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token.0);
        match removed {
            Some(_) => {
                debug!("Released callback binding {}", token);
                true
            }
            None => {
                trace!("Callback binding {} was already released", token);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BindingArena {
    fn default() -> Self {
        Self::new()
    }
}

static INSTANCE: Lazy<BindingArena> = Lazy::new(BindingArena::new);

/// Process-wide arena the native callbacks resolve against.
pub fn get_instance() -> &'static BindingArena {
    &INSTANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl BindingTarget for Recorder {
        fn finished(&self) {
            self.0.lock().unwrap().push("finished".into());
        }
        fn failed(&self, message: &str) {
            self.0.lock().unwrap().push(format!("failed: {message}"));
        }
        fn qos(&self, qos: &QosData) {
            self.0.lock().unwrap().push(format!("qos: {}", qos.dropped));
        }
    }

    #[test]
    fn test_register_resolve_release() {
        let arena = BindingArena::new();
        let recorder = Arc::new(Recorder::default());
        let token = arena.register(Arc::new(EventQueue::new()), recorder.clone());

        assert_ne!(token.as_userdata(), 0);
        let binding = arena.resolve(token).unwrap();
        binding.target().failed("boom");
        assert_eq!(*recorder.0.lock().unwrap(), vec!["failed: boom".to_string()]);

        assert!(arena.release(token));
        assert!(arena.resolve(token).is_none());
        assert!(!arena.release(token));
        assert!(arena.is_empty());
    }

    #[test]
    fn test_tokens_are_unique() {
        let arena = BindingArena::new();
        let queue = Arc::new(EventQueue::new());
        let a = arena.register(queue.clone(), Arc::new(Recorder::default()));
        let b = arena.register(queue, Arc::new(Recorder::default()));
        assert_ne!(a, b);

        arena.release(a);
        assert!(arena.resolve(a).is_none());
        assert!(arena.resolve(b).is_some());
    }

    #[test]
    fn test_unknown_token_does_not_resolve() {
        let arena = BindingArena::new();
        assert!(arena.resolve(BindingToken::from_userdata(0)).is_none());
        assert!(arena.resolve(BindingToken::from_userdata(12345)).is_none());
    }

    #[test]
    fn test_flags_rearm() {
        let arena = BindingArena::new();
        let token = arena.register(Arc::new(EventQueue::new()), Arc::new(Recorder::default()));
        let binding = arena.resolve(token).unwrap();

        binding.mark_eos();
        binding.mark_error();
        assert!(binding.eos_seen() && binding.error_seen());
        binding.rearm();
        assert!(!binding.eos_seen() && !binding.error_seen());
    }
}
