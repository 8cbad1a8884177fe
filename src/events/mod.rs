//! Cross-thread event delivery
//!
//! Native worker threads hand work to the host thread through an
//! [`EventQueue`]; the host drains it once per tick.

pub mod queue;

pub use queue::{EventQueue, QueuedAction};
