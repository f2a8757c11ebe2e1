//! Control Request Handling
//!
//! Bridges the socket server to the shared state. Requests only ever touch
//! [`DaemonState`]; the output driver stays with the ticking cycle.

use std::sync::Arc;

use tracing::{debug, info};

use crate::messages::{ControlOp, ControlRequest, ControlResponse, ErrorCode, WireError};
use crate::mood::Mood;
use crate::state::DaemonState;
use crate::transport::ControlHandler;

/// Serves `set_mood` and `get_status` against the shared state
#[derive(Debug, Clone)]
pub struct MoodController {
    state: Arc<DaemonState>,
}

impl MoodController {
    /// Controller over `state`
    #[must_use]
    pub fn new(state: Arc<DaemonState>) -> Self {
        Self { state }
    }

    fn set_mood(&self, name: &str) -> ControlResponse {
        let mood: Mood = match name.parse() {
            Ok(mood) => mood,
            Err(e) => {
                info!(requested = name, "Ignoring unknown mood");
                return self.reject(WireError::from(e));
            }
        };

        let change = self.state.set_mood(mood);
        info!(
            from = %change.previous,
            to = %mood,
            generation = change.clock.generation,
            "Mood changed"
        );
        ControlResponse::ok(self.state.status())
    }
}

impl ControlHandler for MoodController {
    fn handle(&self, request: ControlRequest) -> ControlResponse {
        if self.state.is_shutting_down() {
            return self.reject(WireError::new(
                ErrorCode::ShuttingDown,
                "LED daemon is shutting down",
            ));
        }

        match request.op {
            ControlOp::SetMood { mood } => self.set_mood(&mood),
            ControlOp::GetStatus => {
                debug!("Status requested");
                ControlResponse::ok(self.state.status())
            }
        }
    }

    fn reject(&self, error: WireError) -> ControlResponse {
        ControlResponse::error(error, Some(self.state.status()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverMode;

    fn controller(mode: DriverMode) -> (MoodController, Arc<DaemonState>) {
        let state = Arc::new(DaemonState::new(mode));
        (MoodController::new(Arc::clone(&state)), state)
    }

    #[test]
    fn test_set_mood_reports_exclusivity() {
        let (ctl, state) = controller(DriverMode::Exclusive { channel: 5 });
        let resp = ctl.handle(ControlRequest::set_mood(Mood::Listening));

        assert!(resp.ok);
        let status = resp.status.unwrap();
        assert_eq!(status.mood, "listening");
        assert!(status.exclusive);
        assert_eq!(status.dma_channel, Some(5));
        assert_eq!(state.mood(), Mood::Listening);
    }

    #[test]
    fn test_mood_name_is_case_insensitive() {
        let (ctl, state) = controller(DriverMode::Shared);
        assert!(ctl.handle(ControlRequest::set_mood_named("THINKING")).ok);
        assert_eq!(state.mood(), Mood::Thinking);
    }

    #[test]
    fn test_unknown_mood_leaves_state_alone() {
        let (ctl, state) = controller(DriverMode::Shared);
        ctl.handle(ControlRequest::set_mood(Mood::Idle));
        let generation = state.clock().generation;

        let resp = ctl.handle(ControlRequest::set_mood_named("purple"));
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().code, ErrorCode::UnknownMood);
        assert_eq!(resp.status.unwrap().mood, "idle");
        assert_eq!(state.clock().generation, generation);
    }

    #[test]
    fn test_get_status_does_not_mutate() {
        let (ctl, state) = controller(DriverMode::Detached);
        let before = state.clock();
        let resp = ctl.handle(ControlRequest::get_status());

        let status = resp.status.unwrap();
        assert_eq!(status.driver_mode, "detached");
        assert!(!status.exclusive);
        assert_eq!(state.clock(), before);
    }

    #[test]
    fn test_requests_rejected_while_shutting_down() {
        let (ctl, state) = controller(DriverMode::Shared);
        state.begin_shutdown();

        let resp = ctl.handle(ControlRequest::set_mood(Mood::Speaking));
        assert_eq!(resp.error.unwrap().code, ErrorCode::ShuttingDown);
        assert!(resp.status.unwrap().shutting_down);
        assert_eq!(state.mood(), Mood::Off);
    }
}
