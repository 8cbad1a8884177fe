//! Synchronous error type
//!
//! Errors the engine discovers on its own threads (bad URI, unsupported
//! stream, allocation failure) never show up here: they are delivered as
//! on-error events through the session's event queue.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("session has not been initialized")]
    NotInitialized,

    #[error("session has been destroyed")]
    Destroyed,

    #[error("native engine refused to create pipeline '{0}'")]
    PipelineCreation(String),

    #[error("pipeline has not been configured")]
    NotConfigured,

    #[error("operation requires a {expected} pipeline")]
    WrongDirection { expected: &'static str },

    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
