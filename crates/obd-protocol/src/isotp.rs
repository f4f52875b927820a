//! ISO 15765-2 (ISO-TP) reassembly of adapter output
//!
//! With headers on and spaces off the adapter prints one line per CAN frame:
//! the identifier (3 hex digits for 11-bit, 8 for 29-bit) followed by the
//! eight data bytes. The first nibble of the data is the PCI frame type.
//!
//! No flow-control frame is ever sent from here. Multi-frame responses only
//! work when the adapter (or the ECU) paces consecutive frames by itself,
//! which ELM327 clones do with CAN auto formatting enabled.

use crate::error::{FrameError, ObdError};
use crate::session::id_width;
use tracing::{debug, trace};

/// Data bytes carried by each frame line
pub const FRAME_DATA_BYTES: usize = 8;

/// Replies meaning nothing answered the request
pub const NO_DATA_REPLIES: &[&str] = &["NO DATA", "DATA ERROR", "ACT ALERT"];

/// Replies meaning the adapter saw a bus fault
pub const CAN_ERROR_REPLIES: &[&str] = &[
    "BUFFER FULL",
    "BUS BUSY",
    "BUS ERROR",
    "CAN ERROR",
    "ERR",
    "FB ERROR",
    "LP ALERT",
    "LV RESET",
    "STOPPED",
    "UNABLE TO CONNECT",
];

/// Reassembly progress for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Idle,
    AwaitingContinuation,
    Complete,
    Error,
}

impl AssemblyState {
    fn describe(self) -> &'static str {
        match self {
            AssemblyState::Idle => "idle",
            AssemblyState::AwaitingContinuation => "awaiting continuation",
            AssemblyState::Complete => "complete",
            AssemblyState::Error => "failed",
        }
    }
}

/// Frame assembly state for a single descriptor exchange
#[derive(Debug)]
pub struct FrameAssembler {
    extended: bool,
    state: AssemblyState,
    declared_len: usize,
    last_sequence: u8,
    payload: Vec<u8>,
}

impl FrameAssembler {
    /// Create an assembler for the given addressing mode
    pub fn new(extended: bool) -> Self {
        Self {
            extended,
            state: AssemblyState::Idle,
            declared_len: 0,
            last_sequence: 0,
            payload: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Width of a frame line in the current addressing mode
    pub fn line_width(&self) -> usize {
        id_width(self.extended) + FRAME_DATA_BYTES * 2
    }

    /// Feed one frame line. Any error leaves the assembler in `Error`.
    pub fn push_line(&mut self, line: &str) -> Result<AssemblyState, FrameError> {
        match self.accept(line) {
            Ok(state) => {
                self.state = state;
                Ok(state)
            }
            Err(err) => {
                self.state = AssemblyState::Error;
                Err(err)
            }
        }
    }

    fn accept(&mut self, line: &str) -> Result<AssemblyState, FrameError> {
        if self.state == AssemblyState::Error {
            return Err(FrameError::UnexpectedFrame {
                frame: "any",
                state: AssemblyState::Error.describe(),
            });
        }
        if line.len() != self.line_width() {
            return Err(FrameError::LineWidth {
                line: line.to_string(),
                expected: self.line_width(),
                actual: line.len(),
            });
        }
        if !line.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FrameError::NotHex(line.to_string()));
        }

        let data = hex::decode(&line[id_width(self.extended)..])
            .map_err(|_| FrameError::NotHex(line.to_string()))?;
        let frame_type = data[0] >> 4;

        match (frame_type, self.state) {
            (0, AssemblyState::Idle) => {
                let len = usize::from(data[0] & 0x0F);
                if len == 0 || len > FRAME_DATA_BYTES - 1 {
                    return Err(FrameError::LengthMismatch {
                        declared: len,
                        actual: FRAME_DATA_BYTES - 1,
                    });
                }
                self.declared_len = len;
                self.payload = data[1..=len].to_vec();
                Ok(AssemblyState::Complete)
            }
            (1, AssemblyState::Idle) => {
                self.declared_len = (usize::from(data[0] & 0x0F) << 8) | usize::from(data[1]);
                self.last_sequence = 0;
                let first = &data[2..];
                let take = first.len().min(self.declared_len);
                self.payload = Vec::with_capacity(self.declared_len);
                self.payload.extend_from_slice(&first[..take]);
                trace!("first frame, declared length {}", self.declared_len);
                Ok(if self.payload.len() >= self.declared_len {
                    AssemblyState::Complete
                } else {
                    AssemblyState::AwaitingContinuation
                })
            }
            (2, AssemblyState::AwaitingContinuation | AssemblyState::Complete)
                if self.declared_len > FRAME_DATA_BYTES - 1 =>
            {
                let sequence = data[0] & 0x0F;
                let expected = (self.last_sequence + 1) % 0x10;
                if sequence != expected {
                    return Err(FrameError::Sequence {
                        expected,
                        actual: sequence,
                    });
                }
                self.last_sequence = sequence;
                let remaining = self.declared_len - self.payload.len();
                let chunk = &data[1..];
                self.payload
                    .extend_from_slice(&chunk[..chunk.len().min(remaining)]);
                Ok(if self.payload.len() >= self.declared_len {
                    AssemblyState::Complete
                } else {
                    AssemblyState::AwaitingContinuation
                })
            }
            (0..=2, state) => Err(FrameError::UnexpectedFrame {
                frame: match frame_type {
                    0 => "single",
                    1 => "first",
                    _ => "consecutive",
                },
                state: state.describe(),
            }),
            (other, _) => Err(FrameError::UnknownFrameType(other)),
        }
    }

    /// Finish the exchange and hand out the payload
    pub fn finish(self) -> Result<Vec<u8>, FrameError> {
        match self.state {
            AssemblyState::Complete if self.payload.len() == self.declared_len => {
                Ok(self.payload)
            }
            AssemblyState::Idle | AssemblyState::Error => Err(FrameError::UnexpectedFrame {
                frame: "end of response",
                state: self.state.describe(),
            }),
            _ => Err(FrameError::LengthMismatch {
                declared: self.declared_len,
                actual: self.payload.len(),
            }),
        }
    }
}

/// Map adapter status replies to errors before any frame parsing
pub fn check_reply_status(response: &str) -> Result<(), ObdError> {
    let trimmed = response.trim();
    let matches = |sentinels: &[&str]| {
        trimmed
            .split(['\r', '\n'])
            .map(str::trim)
            .any(|line| sentinels.contains(&line))
    };
    if matches(NO_DATA_REPLIES) {
        return Err(ObdError::NoData(trimmed.to_string()));
    }
    if matches(CAN_ERROR_REPLIES) {
        return Err(ObdError::CanBusError(trimmed.to_string()));
    }
    Ok(())
}

/// Reassemble a complete adapter reply into one logical payload
pub fn reassemble(response: &str, extended: bool) -> Result<Vec<u8>, ObdError> {
    check_reply_status(response)?;

    let mut assembler = FrameAssembler::new(extended);
    for line in response
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
    {
        assembler.push_line(line)?;
    }
    let payload = assembler.finish()?;
    debug!("reassembled {} byte payload", payload.len());
    Ok(payload)
}
