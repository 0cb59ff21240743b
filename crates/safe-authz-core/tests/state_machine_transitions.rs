use safe_authz_core::{attempt_transition, AttemptEvent, AttemptState, CoordinatorError};

#[test]
fn happy_path_reaches_done_through_tracking() {
    let mut state = AttemptState::Idle;
    let path = [
        (AttemptEvent::Start, AttemptState::AwaitingState),
        (AttemptEvent::StateLoaded, AttemptState::AwaitingSignatures),
        (AttemptEvent::ThresholdReached, AttemptState::Submitting),
        (AttemptEvent::Submitted, AttemptState::Tracking),
        (AttemptEvent::StatusResolved, AttemptState::Done),
    ];
    for (event, expected) in path {
        let (next, transition) = attempt_transition(state, event).expect("legal transition");
        assert_eq!(next, expected);
        assert_eq!(transition.from, state);
        assert_eq!(transition.to, expected);
        state = next;
    }
}

#[test]
fn submitting_cannot_be_cancelled() {
    let err = attempt_transition(AttemptState::Submitting, AttemptEvent::Cancelled)
        .expect_err("submission is not cancellable");
    assert!(matches!(err, CoordinatorError::IllegalTransition(_)));
}

#[test]
fn cancel_is_allowed_while_waiting() {
    for state in [
        AttemptState::AwaitingState,
        AttemptState::AwaitingSignatures,
        AttemptState::Tracking,
    ] {
        let (next, _) = attempt_transition(state, AttemptEvent::Cancelled).expect("cancel");
        assert_eq!(next, AttemptState::Done);
    }
}

#[test]
fn failures_end_the_attempt() {
    let (next, _) =
        attempt_transition(AttemptState::AwaitingState, AttemptEvent::PolicyRejected).expect("reject");
    assert_eq!(next, AttemptState::Done);
    let (next, _) =
        attempt_transition(AttemptState::Submitting, AttemptEvent::SubmitFailed).expect("fail");
    assert_eq!(next, AttemptState::Done);
}

#[test]
fn done_is_terminal() {
    for event in [
        AttemptEvent::Start,
        AttemptEvent::StateLoaded,
        AttemptEvent::ThresholdReached,
        AttemptEvent::Submitted,
        AttemptEvent::Cancelled,
    ] {
        assert!(attempt_transition(AttemptState::Done, event).is_err());
    }
}

#[test]
fn threshold_cannot_skip_state_load() {
    assert!(attempt_transition(AttemptState::Idle, AttemptEvent::ThresholdReached).is_err());
    assert!(attempt_transition(AttemptState::AwaitingState, AttemptEvent::Submitted).is_err());
}
