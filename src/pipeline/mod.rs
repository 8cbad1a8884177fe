//! Native pipeline wrapper and its bookkeeping
//!
//! - [`NativePipeline`]: owns one engine handle and forwards calls to it
//! - [`PipelineState`]: which transport calls a session lets through
//! - [`QosHealth`]: counters fed by QoS reports and rendered frames

pub mod health;
pub mod native;
pub mod state;
pub mod types;

pub use health::{HealthSummary, QosHealth};
pub use native::NativePipeline;
pub use state::{PipelineState, Transport};
pub use types::{Direction, QosData};
