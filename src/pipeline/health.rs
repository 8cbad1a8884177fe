//! Health monitoring and metrics for a pipeline

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use super::types::QosData;

/// Health metrics for a pipeline
///
/// Fed from the host thread as queued events run and frames are blitted.
/// All fields use atomic operations so other threads can read a summary
/// without touching the session.
pub struct QosHealth {
    /// Number of QoS reports received
    qos_events: AtomicU64,

    /// Engine-side totals from the latest QoS report
    engine_processed: AtomicU64,
    engine_dropped: AtomicU64,

    /// Nanoseconds, from the latest report
    last_jitter: AtomicI64,
    max_jitter: AtomicI64,

    /// `f64` bits of the latest proportion
    proportion: AtomicU64,

    /// Frames blitted into the host image
    frames_rendered: AtomicU64,

    errors: AtomicU64,
    finishes: AtomicU64,
}

impl QosHealth {
    pub fn new() -> Self {
        Self {
            qos_events: AtomicU64::new(0),
            engine_processed: AtomicU64::new(0),
            engine_dropped: AtomicU64::new(0),
            last_jitter: AtomicI64::new(0),
            max_jitter: AtomicI64::new(0),
            proportion: AtomicU64::new(1.0f64.to_bits()),
            frames_rendered: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            finishes: AtomicU64::new(0),
        }
    }

    pub fn record_qos(&self, qos: &QosData) {
        self.qos_events.fetch_add(1, Ordering::Relaxed);
        self.engine_processed.store(qos.processed, Ordering::Relaxed);
        self.engine_dropped.store(qos.dropped, Ordering::Relaxed);
        self.last_jitter.store(qos.jitter, Ordering::Relaxed);
        self.max_jitter.fetch_max(qos.jitter, Ordering::Relaxed);
        self.proportion
            .store(qos.proportion.to_bits(), Ordering::Relaxed);
    }

    /// Record a frame copied into the host image
    pub fn record_frame(&self) {
        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finish(&self) {
        self.finishes.fetch_add(1, Ordering::Relaxed);
    }

    /// Start over, for a new setup on the same pipeline
    pub fn reset(&self) {
        for counter in [
            &self.qos_events,
            &self.engine_processed,
            &self.engine_dropped,
            &self.frames_rendered,
            &self.errors,
            &self.finishes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.last_jitter.store(0, Ordering::Relaxed);
        self.max_jitter.store(0, Ordering::Relaxed);
        self.proportion
            .store(1.0f64.to_bits(), Ordering::Relaxed);
    }

    pub fn qos_events(&self) -> u64 {
        self.qos_events.load(Ordering::Relaxed)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn finishes(&self) -> u64 {
        self.finishes.load(Ordering::Relaxed)
    }

    pub fn last_jitter(&self) -> i64 {
        self.last_jitter.load(Ordering::Relaxed)
    }

    pub fn proportion(&self) -> f64 {
        f64::from_bits(self.proportion.load(Ordering::Relaxed))
    }

    /// Engine-side drop rate as a percentage
    pub fn frame_drop_rate(&self) -> f64 {
        let dropped = self.engine_dropped.load(Ordering::Relaxed);
        let processed = self.engine_processed.load(Ordering::Relaxed);
        let total = dropped + processed;
        if total == 0 {
            return 0.0;
        }
        (dropped as f64 / total as f64) * 100.0
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_rendered: self.frames_rendered(),
            qos_events: self.qos_events(),
            engine_processed: self.engine_processed.load(Ordering::Relaxed),
            engine_dropped: self.engine_dropped.load(Ordering::Relaxed),
            frame_drop_rate: self.frame_drop_rate(),
            max_jitter: self.max_jitter.load(Ordering::Relaxed),
            proportion: self.proportion(),
            errors: self.errors(),
            finishes: self.finishes(),
        }
    }
}

impl Default for QosHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSummary {
    pub frames_rendered: u64,
    pub qos_events: u64,
    pub engine_processed: u64,
    pub engine_dropped: u64,
    pub frame_drop_rate: f64,
    /// Nanoseconds
    pub max_jitter: i64,
    pub proportion: f64,
    pub errors: u64,
    pub finishes: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} frames rendered, engine {} processed / {} dropped ({:.2}%), max jitter {}ns over {} QoS reports, {} errors, {} finishes",
            self.frames_rendered,
            self.engine_processed,
            self.engine_dropped,
            self.frame_drop_rate,
            self.max_jitter,
            self.qos_events,
            self.errors,
            self.finishes
        )
    }
}
