//! OBD-II Error Types

use thiserror::Error;

/// Coarse error classes the acquisition loop reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The adapter never produced its prompt
    TransportTimeout,
    /// The adapter reported an empty or unavailable result
    NoData,
    /// Bus fault reported by the adapter, or a reassembly violation
    Can,
    /// Startup configuration problem; not recoverable at runtime
    Configuration,
    /// Serial link or adapter dialect failure
    Link,
}

/// Violations detected while reassembling a segmented response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Line does not have the width dictated by the addressing mode
    #[error("frame line {line:?} has width {actual}, expected {expected}")]
    LineWidth {
        line: String,
        expected: usize,
        actual: usize,
    },

    /// Line contains characters that are not hex digits
    #[error("frame line {0:?} is not hexadecimal")]
    NotHex(String),

    /// Frame type nibble outside single/first/consecutive
    #[error("unknown frame type {0:X}")]
    UnknownFrameType(u8),

    /// Frame arrived in a state where it is not allowed
    #[error("unexpected {frame} frame while {state}")]
    UnexpectedFrame {
        frame: &'static str,
        state: &'static str,
    },

    /// Consecutive frame sequence number out of order
    #[error("bad frame order: expected sequence {expected:X}, got {actual:X}")]
    Sequence { expected: u8, actual: u8 },

    /// Assembled payload length differs from the declared total
    #[error("payload length mismatch: declared {declared}, assembled {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Errors that can occur during OBD-II communication
#[derive(Debug, Error)]
pub enum ObdError {
    /// Serial port connection error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Timeout waiting for the adapter prompt
    #[error("Timeout waiting for OBD response after {0}ms")]
    TransportTimeout(u64),

    /// Adapter reported that nothing answered the request
    #[error("No data: {0}")]
    NoData(String),

    /// CAN bus error reported by the adapter
    #[error("CAN bus error: {0}")]
    CanBusError(String),

    /// Segmented response could not be reassembled
    #[error("CAN framing error: {0}")]
    Framing(#[from] FrameError),

    /// Adapter answered a command without the expected text
    #[error("Unexpected response to {command}: expected {expected:?}, got {response:?}")]
    UnexpectedResponse {
        command: String,
        expected: String,
        response: String,
    },

    /// Invalid response from adapter
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Adapter or session could not be configured
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ObdError {
    /// Classify this error for recovery decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            ObdError::TransportTimeout(_) => ErrorKind::TransportTimeout,
            ObdError::NoData(_) => ErrorKind::NoData,
            ObdError::CanBusError(_) | ObdError::Framing(_) => ErrorKind::Can,
            ObdError::Configuration(_) => ErrorKind::Configuration,
            ObdError::SerialError(_)
            | ObdError::UnexpectedResponse { .. }
            | ObdError::InvalidResponse(_) => ErrorKind::Link,
        }
    }

    /// Timeouts count as "nothing answered" for the exchange that hit them
    pub fn is_no_data(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NoData | ErrorKind::TransportTimeout
        )
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_counts_as_no_data() {
        assert!(ObdError::TransportTimeout(2000).is_no_data());
        assert!(ObdError::NoData("NO DATA".into()).is_no_data());
        assert!(!ObdError::CanBusError("BUS BUSY".into()).is_no_data());
    }

    #[test]
    fn test_framing_errors_are_can_kind() {
        let seq: ObdError = FrameError::Sequence {
            expected: 2,
            actual: 3,
        }
        .into();
        let len: ObdError = FrameError::LengthMismatch {
            declared: 20,
            actual: 13,
        }
        .into();
        assert_eq!(seq.kind(), ErrorKind::Can);
        assert_eq!(len.kind(), ErrorKind::Can);
        assert_eq!(
            ObdError::Configuration("ATSP1 rejected".into()).kind(),
            ErrorKind::Configuration
        );
    }
}
