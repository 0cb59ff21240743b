use crate::domain::{ConfirmationState, SubmitMode};
use crate::error::PolicyError;

/// Decides which submission is legal for `state`. Rules apply in order; the
/// caller refetches state and calls again when anything changes.
pub fn decide(state: &ConfirmationState) -> Result<SubmitMode, PolicyError> {
    if state.is_executed {
        return Err(PolicyError::AlreadyExecuted);
    }
    if state.confirmations >= state.required_confirmations {
        return Ok(SubmitMode::Execute);
    }
    if state.confirmations + 1 >= state.required_confirmations
        && state.is_owner
        && !state.has_confirmed
    {
        return Ok(SubmitMode::ConfirmAndExecute);
    }
    if state.is_owner && !state.has_confirmed {
        return Ok(SubmitMode::Confirm);
    }
    if !state.is_owner {
        return Err(PolicyError::NotAnOwner);
    }
    Err(PolicyError::AlreadyConfirmed)
}
