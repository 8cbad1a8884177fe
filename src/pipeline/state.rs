//! Pipeline state management

/// Coarse lifecycle of a native pipeline as seen by its session.
///
/// Whether the engine has actually loaded or started the pipeline is always
/// asked of the engine itself; this state only decides which transport calls
/// are allowed to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Pipeline exists but has no media configured
    #[default]
    Unloaded,

    /// Decoding or encoding has been set up, not started yet
    Configured,

    /// Play requested; the engine starts producing on the next tick
    Playing,

    /// Paused (can resume to Playing)
    Paused,

    /// Stopped, either by request or after an error; can play again or be re-setup
    Stopped,

    /// Media released; a new setup makes it Configured again
    Closed,

    /// Handle released. Terminal.
    Destroyed,
}

/// Transport operations driven by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Play,
    Pause,
    Stop,
    Close,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            // Nothing leaves Destroyed, everything else may enter it
            (Destroyed, _) => false,
            (_, Destroyed) => true,

            // Setup, from anywhere but Destroyed
            (_, Configured) => true,

            // Transport
            (Configured | Paused | Stopped, Playing) => true,
            (Playing, Paused) => true,
            (Playing | Paused, Stopped) => true,
            (Configured | Stopped, Closed) => true,

            // Self-transitions
            (a, b) if a == b => true,

            _ => false,
        }
    }

    /// State after applying `op`, or `None` if `op` is a no-op here.
    ///
    /// Calling an operation when already in its target state is a no-op, as
    /// is any operation that does not apply to the current state (pausing a
    /// pipeline that never played, for example).
    pub fn transition(&self, op: Transport) -> Option<PipelineState> {
        let target = match op {
            Transport::Play => PipelineState::Playing,
            Transport::Pause => PipelineState::Paused,
            Transport::Stop => PipelineState::Stopped,
            Transport::Close => PipelineState::Closed,
        };

        if *self != target && self.can_transition_to(&target) {
            Some(target)
        } else {
            None
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Unloaded => "Unloaded",
            PipelineState::Configured => "Configured",
            PipelineState::Playing => "Playing",
            PipelineState::Paused => "Paused",
            PipelineState::Stopped => "Stopped",
            PipelineState::Closed => "Closed",
            PipelineState::Destroyed => "Destroyed",
        }
    }

    /// Media is set up (whether or not it is playing)
    pub fn is_configured(&self) -> bool {
        matches!(
            self,
            PipelineState::Configured
                | PipelineState::Playing
                | PipelineState::Paused
                | PipelineState::Stopped
        )
    }

    /// Check if the pipeline is currently active (playing or paused)
    pub fn is_active(&self) -> bool {
        matches!(self, PipelineState::Playing | PipelineState::Paused)
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, PipelineState::Destroyed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
