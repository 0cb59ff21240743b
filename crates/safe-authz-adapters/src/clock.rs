use std::time::{SystemTime, UNIX_EPOCH};

use safe_authz_core::{ClockPort, PortError};

/// Wall clock used to stamp transaction descriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClockAdapter;

impl ClockPort for SystemClockAdapter {
    fn now_ms(&self) -> Result<u64, PortError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PortError::Transport(format!("system clock before unix epoch: {e}")))?;
        u64::try_from(since_epoch.as_millis())
            .map_err(|e| PortError::Validation(format!("timestamp out of range: {e}")))
    }
}
