//! Process-wide engine reference counting
//!
//! The native engine is initialized when the first session acquires it and
//! torn down when the last one lets go. Sessions hold an [`EngineLease`]
//! whose drop releases the reference, so a session can never release twice.

use std::sync::{Arc, Mutex};

use log::{error, info, warn};

use super::{Engine, LogSinkFn};
use crate::bridge::trampoline;
use crate::config::DebugParams;
use crate::utils::lock;

#[derive(Debug, Default)]
struct RefState {
    count: usize,
    /// Whether the 0 → 1 transition managed to start the engine.
    initialized: bool,
}

pub struct EngineContext {
    engine: Arc<dyn Engine>,
    debug: Option<String>,
    log_sink: Option<LogSinkFn>,
    refs: Mutex<RefState>,
}

impl EngineContext {
    pub fn new(engine: Arc<dyn Engine>, debug: &DebugParams) -> Arc<Self> {
        let log_sink = if debug.enabled {
            Some(trampoline::log_sink as LogSinkFn)
        } else {
            None
        };
        let debug = Some(debug.engine_debug.clone()).filter(|s| !s.is_empty());

        Arc::new(Self {
            engine,
            debug,
            log_sink,
            refs: Mutex::new(RefState::default()),
        })
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Take a reference that is released when the lease is dropped.
    pub fn acquire(self: &Arc<Self>) -> EngineLease {
        self.add_ref();
        EngineLease {
            context: Arc::clone(self),
            released: false,
        }
    }

    /// Raw reference increment. Prefer [`acquire`](Self::acquire).
    pub fn add_ref(&self) -> usize {
        // The lock is held across initialize so concurrent first users wait
        // for the engine to be up.
        let mut refs = lock(&self.refs);
        info!("Engine ref ({} -> {})", refs.count, refs.count + 1);

        if refs.count == 0 {
            refs.initialized = self
                .engine
                .initialize(self.debug.as_deref(), self.log_sink);
            if !refs.initialized {
                error!("Failed to initialize the native engine");
            }
        }

        refs.count += 1;
        refs.count
    }

    /// Raw reference decrement. Releasing past zero is logged and ignored.
    pub fn release(&self) -> usize {
        let mut refs = lock(&self.refs);
        if refs.count == 0 {
            warn!("Trying to release the engine past zero");
            return 0;
        }

        info!("Engine unref ({} -> {})", refs.count, refs.count - 1);
        refs.count -= 1;

        if refs.count == 0 && refs.initialized {
            self.engine.shutdown();
            refs.initialized = false;
        }
        refs.count
    }

    pub fn ref_count(&self) -> usize {
        lock(&self.refs).count
    }

    /// Engine is referenced and reports itself running.
    pub fn is_active(&self) -> bool {
        let refs = lock(&self.refs);
        refs.count > 0 && refs.initialized && self.engine.is_active()
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let refs = lock(&self.refs);
        f.debug_struct("EngineContext")
            .field("debug", &self.debug)
            .field("refs", &refs.count)
            .field("initialized", &refs.initialized)
            .finish()
    }
}

/// One reference on an [`EngineContext`].
#[derive(Debug)]
pub struct EngineLease {
    context: Arc<EngineContext>,
    released: bool,
}

impl EngineLease {
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.context.release();
        }
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        self.release_once();
    }
}
