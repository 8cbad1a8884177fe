//! Bridge between an asynchronous native media engine and a single-threaded,
//! tick-driven host.
//!
//! The engine decodes or encodes on its own threads and reports back through
//! C callbacks. Those callbacks are turned into queued actions
//! ([`events::EventQueue`]) that the host runs on its own thread, once per
//! tick, through [`session::Session::advance`]. The same call pulls the
//! newest decoded frame into a host-owned image.

pub mod bridge;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod session;
pub mod utils;

pub use config::BridgeConfig;
pub use engine::{Engine, EngineContext, SimulatedEngine};
pub use error::{BridgeError, Result};
pub use events::EventQueue;
pub use pipeline::{PipelineState, QosData};
pub use session::{Session, Tick};
