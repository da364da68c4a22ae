//! Adapter lifecycle state machine.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Uninitialized,
    Initialized,
    Running,
    Stopping,
    Stopped,
    Failed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot {action} while adapter is {current:?}")]
pub struct InvalidTransition {
    pub current: AdapterState,
    pub action: &'static str,
}

impl AdapterState {
    /// Applies `action`, returning the resulting state or an error if the
    /// action isn't valid from the current state. `Failed` is reachable from
    /// any running-ish state via a health-check violation, and only from
    /// there via an explicit recover.
    pub fn apply(self, action: AdapterAction) -> Result<AdapterState, InvalidTransition> {
        use AdapterAction::*;
        use AdapterState::*;

        let invalid = |action: &'static str| {
            Err(InvalidTransition {
                current: self,
                action,
            })
        };

        match (self, action) {
            (Uninitialized, Initialize) => Ok(Initialized),
            (Initialized, Start) => Ok(Running),
            (Running, Stop) => Ok(Stopping),
            (Stopping, Drained) => Ok(Stopped),
            (Running, HealthCheckFailed) => Ok(Failed),
            (Initialized, HealthCheckFailed) => Ok(Failed),
            (Failed, Recover) => Ok(Running),
            (_, Initialize) => invalid("Initialize"),
            (_, Start) => invalid("Start"),
            (_, Stop) => invalid("Stop"),
            (_, Drained) => invalid("Drained"),
            (_, HealthCheckFailed) => invalid("HealthCheckFailed"),
            (_, Recover) => invalid("Recover"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterAction {
    Initialize,
    Start,
    Stop,
    Drained,
    HealthCheckFailed,
    Recover,
}

#[cfg(test)]
mod tests {
    use super::*;
    use AdapterAction::*;
    use AdapterState::*;

    #[test]
    fn happy_path_transitions() {
        let s = Uninitialized;
        let s = s.apply(Initialize).unwrap();
        assert_eq!(s, Initialized);
        let s = s.apply(Start).unwrap();
        assert_eq!(s, Running);
        let s = s.apply(Stop).unwrap();
        assert_eq!(s, Stopping);
        let s = s.apply(Drained).unwrap();
        assert_eq!(s, Stopped);
    }

    #[test]
    fn start_on_uninitialized_is_invalid_state() {
        assert!(Uninitialized.apply(Start).is_err());
    }

    #[test]
    fn failed_is_reachable_from_running_and_recoverable() {
        let s = Running.apply(HealthCheckFailed).unwrap();
        assert_eq!(s, Failed);
        let s = s.apply(Recover).unwrap();
        assert_eq!(s, Running);
    }
}
