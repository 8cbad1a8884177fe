//! Core types for the pipeline system

use std::time::Duration;

/// What a pipeline was set up to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Engine produces frames for the host to display
    Decoding,
    /// Host feeds raw frames for the engine to write out
    Encoding,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Decoding => write!(f, "decoding"),
            Direction::Encoding => write!(f, "encoding"),
        }
    }
}

/// Quality-of-service report copied out of a native callback.
///
/// Time fields are nanoseconds. `processed` and `dropped` are running totals
/// for the current stream, not deltas.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QosData {
    /// Lateness of the reported buffer; negative means early.
    pub jitter: i64,
    pub running_time: u64,
    pub stream_time: u64,
    pub timestamp: u64,
    /// Long-term rate the element should run at to keep up; 1.0 is nominal.
    pub proportion: f64,
    pub processed: u64,
    pub dropped: u64,
}

impl QosData {
    /// The reported buffer arrived late.
    pub fn is_late(&self) -> bool {
        self.jitter > 0
    }

    /// Absolute jitter.
    pub fn jitter_duration(&self) -> Duration {
        Duration::from_nanos(self.jitter.unsigned_abs())
    }

    /// Percentage of buffers dropped so far.
    pub fn drop_rate(&self) -> f64 {
        let total = self.processed + self.dropped;
        if total == 0 {
            return 0.0;
        }
        (self.dropped as f64 / total as f64) * 100.0
    }
}

impl std::fmt::Display for QosData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "jitter {}ns, proportion {:.3}, {} processed / {} dropped",
            self.jitter, self.proportion, self.processed, self.dropped
        )
    }
}
