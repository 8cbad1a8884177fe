//! Session state reachable from queued engine events

use std::sync::Mutex;

use log::{debug, error, info, trace};

use super::observers::ObserverSet;
use crate::bridge::BindingTarget;
use crate::pipeline::{Direction, NativePipeline, PipelineState, QosData, QosHealth};
use crate::utils::lock;

#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    pub state: PipelineState,
    pub direction: Option<Direction>,
    pub looping: bool,
}

#[derive(Debug, Default)]
pub struct SessionCore {
    pub pipeline: Option<NativePipeline>,
    pub status: Status,
}

/// The part of a session the binding arena points at.
pub struct SessionShared {
    pub name: String,
    pub core: Mutex<SessionCore>,
    pub observers: ObserverSet,
    pub health: QosHealth,
}

impl SessionShared {
    pub fn new(name: String) -> Self {
        Self {
            name,
            core: Mutex::new(SessionCore::default()),
            observers: ObserverSet::new(),
            health: QosHealth::new(),
        }
    }
}

impl BindingTarget for SessionShared {
    fn finished(&self) {
        self.health.record_finish();
        info!("[{}] Stream finished. {}", self.name, self.health.summary());
        self.observers.notify_finish();

        let core = lock(&self.core);
        if core.status.looping
            && !core.status.state.is_destroyed()
            && let Some(pipeline) = &core.pipeline
        {
            debug!("[{}] Looping back to the start", self.name);
            pipeline.set_position(0.0);
        }
    }

    fn failed(&self, message: &str) {
        self.health.record_error();
        error!("[{}] Pipeline error: {}", self.name, message);
        {
            let mut core = lock(&self.core);
            if core.status.state.is_configured() {
                if let Some(pipeline) = &core.pipeline {
                    pipeline.stop();
                }
                core.status.state = PipelineState::Stopped;
            }
        }
        self.observers.notify_error(message);
    }

    fn qos(&self, qos: &QosData) {
        trace!("[{}] QoS: {}", self.name, qos);
        self.health.record_qos(qos);
        self.observers.notify_qos(qos);
    }
}
