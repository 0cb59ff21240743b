use crate::error::CoordinatorError;

/// Lifecycle of one confirm/execute attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    Idle,
    AwaitingState,
    AwaitingSignatures,
    Submitting,
    Tracking,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptEvent {
    Start,
    StateLoaded,
    PolicyRejected,
    ThresholdReached,
    Submitted,
    SubmitFailed,
    StatusResolved,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: AttemptState,
    pub to: AttemptState,
    pub reason: &'static str,
}

pub fn attempt_transition(
    state: AttemptState,
    event: AttemptEvent,
) -> Result<(AttemptState, StateTransition), CoordinatorError> {
    use AttemptEvent as E;
    use AttemptState as S;

    let (to, reason) = match (state, event) {
        (S::Idle, E::Start) => (S::AwaitingState, "loading safe state"),
        (S::AwaitingState, E::StateLoaded) => (S::AwaitingSignatures, "collecting signatures"),
        (S::AwaitingState, E::PolicyRejected) => (S::Done, "policy rejected"),
        (S::AwaitingSignatures, E::ThresholdReached) => (S::Submitting, "threshold reached"),
        (S::Submitting, E::Submitted) => (S::Tracking, "submitted"),
        (S::Submitting, E::SubmitFailed) => (S::Done, "submission failed"),
        (S::Tracking, E::StatusResolved) => (S::Done, "publish status resolved"),
        (S::AwaitingState | S::AwaitingSignatures | S::Tracking, E::Cancelled) => {
            (S::Done, "cancelled")
        }
        _ => {
            return Err(CoordinatorError::IllegalTransition(format!(
                "illegal attempt transition: {state:?} --{event:?}-->"
            )))
        }
    };

    Ok((
        to,
        StateTransition {
            from: state,
            to,
            reason,
        },
    ))
}
