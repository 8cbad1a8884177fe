//! Callback marshaling between engine threads and the host thread
//!
//! [`binding`] maps the userdata of each pipeline to the queue and target it
//! reports to; [`trampoline`] holds the `extern "C"` functions the engine
//! actually calls.

pub mod binding;
pub mod trampoline;

pub use binding::{BindingArena, BindingTarget, BindingToken, InstanceBinding};
pub use trampoline::marshaled_callbacks;
