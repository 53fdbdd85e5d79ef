//! Process exit policy
//!
//! Exit is driven by connection state and media exhaustion, never by ad-hoc
//! aborts. Running out of media and an engine-reported connection failure are
//! both expected terminal outcomes and exit zero; everything else is a
//! failure and exits non-zero.

use tracing::{error, info};

use crate::error::Error;

/// Why the process is exiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Every media unit was forwarded; nothing left to send
    MediaExhausted,
    /// The engine reported a failed connection
    ConnectionFailed,
    /// Startup could not complete
    SetupFailure,
    /// A description or candidate could not be delivered
    SignalingFailure,
    /// The peer sent something this process cannot accept
    ProtocolViolation,
}

impl ExitReason {
    /// Process exit code for this reason.
    pub fn exit_code(self) -> i32 {
        match self {
            ExitReason::MediaExhausted | ExitReason::ConnectionFailed => 0,
            ExitReason::SetupFailure
            | ExitReason::SignalingFailure
            | ExitReason::ProtocolViolation => 1,
        }
    }

    /// Map an error to the exit reason its class dictates.
    pub fn from_error(error: &Error) -> Self {
        if error.is_delivery_failure() {
            ExitReason::SignalingFailure
        } else if error.is_protocol_violation() {
            ExitReason::ProtocolViolation
        } else {
            ExitReason::SetupFailure
        }
    }
}

/// Log the reason and exit with its code.
pub fn terminate(reason: ExitReason) -> ! {
    let code = reason.exit_code();
    if code == 0 {
        info!(reason = ?reason, "terminating");
    } else {
        error!(reason = ?reason, "terminating");
    }
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_outcomes_exit_zero() {
        assert_eq!(ExitReason::MediaExhausted.exit_code(), 0);
        assert_eq!(ExitReason::ConnectionFailed.exit_code(), 0);
    }

    #[test]
    fn test_failures_exit_nonzero() {
        assert_eq!(ExitReason::SetupFailure.exit_code(), 1);
        assert_eq!(ExitReason::SignalingFailure.exit_code(), 1);
        assert_eq!(ExitReason::ProtocolViolation.exit_code(), 1);
    }

    #[test]
    fn test_error_classes_map_to_reasons() {
        assert_eq!(
            ExitReason::from_error(&Error::SignalingDelivery("peer gone".to_string())),
            ExitReason::SignalingFailure
        );
        assert_eq!(
            ExitReason::from_error(&Error::MalformedMessage("bad payload".to_string())),
            ExitReason::ProtocolViolation
        );
        assert_eq!(
            ExitReason::from_error(&Error::Candidate("rejected".to_string())),
            ExitReason::ProtocolViolation
        );
        assert_eq!(
            ExitReason::from_error(&Error::Engine("no codecs".to_string())),
            ExitReason::SetupFailure
        );
        assert_eq!(
            ExitReason::from_error(&Error::Publish("room down".to_string())),
            ExitReason::SetupFailure
        );
    }
}
