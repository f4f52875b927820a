//! Schema walk over reassembled payloads

use crate::error::DecodeError;
use crate::record::Value;
use crate::schema::{array_indices, expand_name, FieldSpec, RequestDescriptor, Scalar};

/// Read up to 4 bytes as a big-endian integer, sign-extending when `signed`
pub fn read_raw(bytes: &[u8], signed: bool) -> i64 {
    let unsigned = bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    let bits = bytes.len() * 8;
    if signed && bits > 0 && bits < 64 && unsigned & (1 << (bits - 1)) != 0 {
        (unsigned as i64) - (1i64 << bits)
    } else {
        unsigned as i64
    }
}

fn read_scalar(
    descriptor: &RequestDescriptor,
    payload: &[u8],
    cursor: &mut usize,
    format: &Scalar,
) -> Result<f64, DecodeError> {
    let width = usize::from(format.width);
    let end = *cursor + width;
    let bytes = payload
        .get(*cursor..end)
        .ok_or_else(|| too_short(descriptor, payload))?;
    *cursor = end;
    Ok(format.physical(read_raw(bytes, format.signed)))
}

fn too_short(descriptor: &RequestDescriptor, payload: &[u8]) -> DecodeError {
    DecodeError::PayloadTooShort {
        descriptor: descriptor.label(),
        needed: descriptor.schema_len(),
        actual: payload.len(),
    }
}

/// Decode every raw field of `descriptor` from `payload`
///
/// Computed elements consume nothing and are left to [`crate::evaluate_computed`].
/// Bytes past the end of the schema are ignored.
pub fn decode_payload(
    descriptor: &RequestDescriptor,
    payload: &[u8],
) -> Result<Vec<(String, Value)>, DecodeError> {
    if payload.len() < descriptor.schema_len() {
        return Err(too_short(descriptor, payload));
    }

    let mut cursor = 0usize;
    let mut decoded = Vec::new();
    for field in &descriptor.fields {
        match field {
            FieldSpec::Padding { bytes } => cursor += bytes,
            FieldSpec::Value { name, format } => {
                let value = read_scalar(descriptor, payload, &mut cursor, format)?;
                decoded.push((name.clone(), Value::Number(value)));
            }
            FieldSpec::Array {
                name_template,
                first_index,
                count,
                format,
            } => {
                let indices = array_indices(*first_index, *count).ok_or_else(|| {
                    DecodeError::Schema {
                        descriptor: descriptor.label(),
                        reason: format!("{name_template:?} indices overflow"),
                    }
                })?;
                for index in indices {
                    let name = expand_name(name_template, index).map_err(|reason| {
                        DecodeError::Schema {
                            descriptor: descriptor.label(),
                            reason,
                        }
                    })?;
                    let value = read_scalar(descriptor, payload, &mut cursor, format)?;
                    decoded.push((name, Value::Number(value)));
                }
            }
            FieldSpec::Computed { .. } => {}
        }
    }
    Ok(decoded)
}
