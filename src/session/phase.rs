use serde::Serialize;
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Validating,
    Validated,
    Retrieving,
    Retrieved,
    Synthesizing,
    Done,
    Rejected,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Submit,
    Valid,
    Invalid,
    Fail,
    StartRetrieval,
    SourcesFound,
    StartSynthesis,
    ReportReady,
    Reset,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("event {event:?} is not allowed in phase {from:?}")]
    InvalidTransition { from: Phase, event: Event },

    #[error("session state written out of order: {0}")]
    OutOfOrder(&'static str),
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl Phase {
    pub fn apply(self, event: Event) -> Result<Phase, TransitionError> {
        use Event as E;
        use Phase as P;

        let next = match (self, event) {
            (P::Idle, E::Submit) => P::Validating,
            (P::Validating, E::Valid) => P::Validated,
            (P::Validating, E::Invalid) => P::Rejected,
            (P::Validating, E::Fail) => P::Error,
            (P::Validated, E::StartRetrieval) => P::Retrieving,
            (P::Retrieving, E::SourcesFound) => P::Retrieved,
            (P::Retrieving, E::Fail) => P::Error,
            (P::Retrieved, E::StartSynthesis) => P::Synthesizing,
            (P::Synthesizing, E::ReportReady) => P::Done,
            (P::Synthesizing, E::Fail) => P::Error,
            (P::Idle | P::Done | P::Rejected | P::Error, E::Reset) => P::Idle,
            (from, event) => return Err(TransitionError::InvalidTransition { from, event }),
        };
        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Rejected | Phase::Error)
    }

    /// A run is underway: neither idle nor finished.
    pub fn is_running(self) -> bool {
        !self.is_terminal() && self != Phase::Idle
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Validating => "validating",
            Phase::Validated => "validated",
            Phase::Retrieving => "retrieving",
            Phase::Retrieved => "retrieved",
            Phase::Synthesizing => "synthesizing",
            Phase::Done => "done",
            Phase::Rejected => "rejected",
            Phase::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [Phase; 9] = [
        Phase::Idle,
        Phase::Validating,
        Phase::Validated,
        Phase::Retrieving,
        Phase::Retrieved,
        Phase::Synthesizing,
        Phase::Done,
        Phase::Rejected,
        Phase::Error,
    ];

    #[test]
    fn test_happy_path() {
        let mut phase = Phase::Idle;
        for event in [
            Event::Submit,
            Event::Valid,
            Event::StartRetrieval,
            Event::SourcesFound,
            Event::StartSynthesis,
            Event::ReportReady,
        ] {
            phase = phase.apply(event).unwrap();
        }
        assert_eq!(phase, Phase::Done);
        assert_eq!(phase.apply(Event::Reset), Ok(Phase::Idle));
    }

    #[test]
    fn test_failure_edges() {
        assert_eq!(Phase::Validating.apply(Event::Invalid), Ok(Phase::Rejected));
        assert_eq!(Phase::Validating.apply(Event::Fail), Ok(Phase::Error));
        assert_eq!(Phase::Retrieving.apply(Event::Fail), Ok(Phase::Error));
        assert_eq!(Phase::Synthesizing.apply(Event::Fail), Ok(Phase::Error));
    }

    #[test]
    fn test_fail_not_allowed_outside_working_phases() {
        for phase in [Phase::Idle, Phase::Validated, Phase::Retrieved, Phase::Done] {
            assert!(phase.apply(Event::Fail).is_err(), "{phase:?}");
        }
    }

    #[test]
    fn test_only_idle_accepts_submit() {
        for phase in ALL_PHASES {
            assert_eq!(phase.apply(Event::Submit).is_ok(), phase == Phase::Idle);
        }
    }

    #[test]
    fn test_reset_is_the_only_back_edge() {
        for phase in ALL_PHASES {
            let reset = phase.apply(Event::Reset);
            if phase.is_terminal() || phase == Phase::Idle {
                assert_eq!(reset, Ok(Phase::Idle));
            } else {
                assert!(reset.is_err(), "{phase:?} must not reset mid-run");
            }
        }
    }

    #[test]
    fn test_classification() {
        let terminal: Vec<_> = ALL_PHASES.into_iter().filter(|p| p.is_terminal()).collect();
        assert_eq!(terminal, vec![Phase::Done, Phase::Rejected, Phase::Error]);
        assert!(!Phase::Idle.is_running());
        assert!(Phase::Retrieving.is_running());
        assert_eq!(
            serde_json::to_value(Phase::Synthesizing).unwrap(),
            serde_json::json!(Phase::Synthesizing.as_str())
        );
    }
}
