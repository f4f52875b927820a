//! OBD-II Protocol Implementation
//!
//! This crate provides blocking serial communication with ELM327-compatible
//! adapters and reassembly of ISO 15765-4 (CAN) multi-frame responses.

mod client;
mod error;
pub mod isotp;
mod link;
pub mod mock;
mod protocol;
mod session;

pub use client::{AdapterReply, Elm327};
pub use error::{ErrorKind, FrameError, ObdError};
pub use isotp::{reassemble, AssemblyState, FrameAssembler};
pub use link::{LinkConfig, SerialLink};
pub use protocol::ObdProtocol;
pub use session::{SessionState, EXTENDED_MASK, STANDARD_MASK};

/// Diagnostic service identifiers used in request descriptors
pub mod service {
    /// OBD-II current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// OBD-II vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
    /// KWP2000 ReadDataByLocalIdentifier
    pub const READ_DATA_BY_LOCAL_ID: u8 = 0x21;
    /// UDS ReadDataByIdentifier
    pub const READ_DATA_BY_ID: u8 = 0x22;
}
