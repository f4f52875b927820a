//! Response Field Decoding
//!
//! Turns reassembled diagnostic payloads into named physical values using
//! declarative schemas, and derives computed values from a sample record.

mod computed;
mod decode;
mod error;
mod record;
mod schema;

pub use decode::{decode_payload, read_raw};
pub use computed::evaluate_computed;
pub use error::DecodeError;
pub use record::{SampleRecord, Value};
pub use schema::{array_indices, expand_name, Computation, FieldSpec, RequestDescriptor, Scalar};
