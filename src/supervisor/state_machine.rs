use serde::Serialize;
use thiserror::Error;

/// Lifecycle of the supervised frpc process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// The child exited without a stop request.
    Crashed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(State, State),
}

#[derive(Debug)]
pub struct StateMachine {
    state: State,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: State::Stopped }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn can_transition(&self, to: State) -> bool {
        matches!(
            (self.state, to),
            (State::Stopped, State::Starting)
                | (State::Starting, State::Running)
                | (State::Starting, State::Stopped)
                | (State::Running, State::Stopping)
                | (State::Running, State::Crashed)
                | (State::Stopping, State::Stopped)
                | (State::Crashed, State::Stopping)
                | (State::Crashed, State::Stopped)
        )
    }

    pub fn transition(&mut self, to: State) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            tracing::info!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state(), State::Stopped);
        assert!(sm.transition(State::Starting).is_ok());
        assert!(sm.transition(State::Running).is_ok());
        assert!(sm.transition(State::Stopping).is_ok());
        assert!(sm.transition(State::Stopped).is_ok());
    }

    #[test]
    fn invalid_transition() {
        let mut sm = StateMachine::new();
        // cannot go directly from Stopped -> Running
        let res = sm.transition(State::Running);
        assert_eq!(
            res,
            Err(TransitionError::InvalidTransition(State::Stopped, State::Running))
        );
        assert_eq!(sm.state(), State::Stopped);
    }

    #[test]
    fn failed_start_returns_to_stopped() {
        let mut sm = StateMachine::new();
        sm.transition(State::Starting).unwrap();
        assert!(sm.transition(State::Stopped).is_ok());
    }

    #[test]
    fn crash_then_reap() {
        let mut sm = StateMachine::new();
        sm.transition(State::Starting).unwrap();
        sm.transition(State::Running).unwrap();
        sm.transition(State::Crashed).unwrap();
        // a crashed child can be stopped explicitly or reaped straight to Stopped
        assert!(sm.can_transition(State::Stopping));
        assert!(sm.transition(State::Stopped).is_ok());
    }

    #[test]
    fn no_second_start_while_running() {
        let mut sm = StateMachine::new();
        sm.transition(State::Starting).unwrap();
        sm.transition(State::Running).unwrap();
        assert!(!sm.can_transition(State::Starting));
    }
}
