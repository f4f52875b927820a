//! Request descriptors and field schemas

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;

fn default_scale() -> f64 {
    1.0
}

/// Layout and linear transform of one big-endian integer field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    /// Bytes consumed (1-4)
    pub width: u8,
    /// Two's complement interpretation
    #[serde(default)]
    pub signed: bool,
    /// physical = raw * scale + offset
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// physical = raw * scale + offset
    #[serde(default)]
    pub offset: f64,
    /// Unit string (e.g., "V", "°C", "kWh")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Scalar {
    /// Unsigned field of `width` bytes
    pub fn unsigned(width: u8) -> Self {
        Self {
            width,
            signed: false,
            scale: 1.0,
            offset: 0.0,
            unit: None,
        }
    }

    /// Signed field of `width` bytes
    pub fn signed(width: u8) -> Self {
        Self {
            signed: true,
            ..Self::unsigned(width)
        }
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Apply the linear transform
    pub fn physical(&self, raw: i64) -> f64 {
        raw as f64 * self.scale + self.offset
    }
}

/// Derived value over fields already present in the record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Computation {
    /// source * scale + offset
    Linear {
        source: String,
        scale: f64,
        offset: f64,
    },
    /// 1 when any bit of `mask` is set in `source`, else 0
    BitTest { source: String, mask: u32 },
    /// numerator / denominator * scale
    Ratio {
        numerator: String,
        denominator: String,
        scale: f64,
    },
    /// product of all factors * scale
    Product { factors: Vec<String>, scale: f64 },
}

impl Computation {
    pub fn linear(source: &str, scale: f64, offset: f64) -> Self {
        Computation::Linear {
            source: source.to_string(),
            scale,
            offset,
        }
    }

    pub fn bit_test(source: &str, mask: u32) -> Self {
        Computation::BitTest {
            source: source.to_string(),
            mask,
        }
    }

    pub fn ratio(numerator: &str, denominator: &str, scale: f64) -> Self {
        Computation::Ratio {
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            scale,
        }
    }

    pub fn product(factors: &[&str], scale: f64) -> Self {
        Computation::Product {
            factors: factors.iter().map(|f| f.to_string()).collect(),
            scale,
        }
    }

    /// Field names this computation reads
    pub fn operands(&self) -> Vec<&str> {
        match self {
            Computation::Linear { source, .. } | Computation::BitTest { source, .. } => {
                vec![source.as_str()]
            }
            Computation::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
            Computation::Product { factors, .. } => factors.iter().map(String::as_str).collect(),
        }
    }
}

/// One element of a response schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSpec {
    /// Skip bytes
    Padding { bytes: usize },
    /// Single named value
    Value { name: String, format: Scalar },
    /// `count` consecutive values named from a printf-style template
    Array {
        name_template: String,
        first_index: u32,
        count: u32,
        format: Scalar,
    },
    /// Derived value, evaluated once every raw field of the cycle is known
    Computed {
        name: String,
        computation: Computation,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
}

impl FieldSpec {
    pub fn padding(bytes: usize) -> Self {
        FieldSpec::Padding { bytes }
    }

    pub fn value(name: &str, format: Scalar) -> Self {
        FieldSpec::Value {
            name: name.to_string(),
            format,
        }
    }

    pub fn array(name_template: &str, first_index: u32, count: u32, format: Scalar) -> Self {
        FieldSpec::Array {
            name_template: name_template.to_string(),
            first_index,
            count,
            format,
        }
    }

    pub fn computed(name: &str, computation: Computation, unit: Option<&str>) -> Self {
        FieldSpec::Computed {
            name: name.to_string(),
            computation,
            unit: unit.map(str::to_string),
        }
    }

    /// Payload bytes consumed by this element
    pub fn byte_len(&self) -> usize {
        match self {
            FieldSpec::Padding { bytes } => *bytes,
            FieldSpec::Value { format, .. } => usize::from(format.width),
            FieldSpec::Array { count, format, .. } => *count as usize * usize::from(format.width),
            FieldSpec::Computed { .. } => 0,
        }
    }
}

/// Indices an array element covers, `None` when they run past `u32::MAX`
pub fn array_indices(first_index: u32, count: u32) -> Option<Range<u32>> {
    first_index
        .checked_add(count)
        .map(|end| first_index..end)
}

/// Expand a printf-style name template (`%d`, `%02d`) with `index`
pub fn expand_name(template: &str, index: u32) -> Result<String, String> {
    let start = template
        .find('%')
        .ok_or_else(|| format!("template {template:?} has no placeholder"))?;
    let rest = &template[start + 1..];
    let end = rest
        .find('d')
        .ok_or_else(|| format!("template {template:?} has no %d placeholder"))?;
    let spec = &rest[..end];
    let suffix = &rest[end + 1..];
    if suffix.contains('%') {
        return Err(format!("template {template:?} has more than one placeholder"));
    }

    let (zero_pad, width_digits) = match spec.strip_prefix('0') {
        Some(digits) => (true, digits),
        None => (false, spec),
    };
    let width: usize = if width_digits.is_empty() {
        0
    } else {
        width_digits
            .parse()
            .map_err(|_| format!("template {template:?} has a bad width"))?
    };
    let number = if zero_pad {
        format!("{index:0width$}")
    } else {
        format!("{index:width$}")
    };
    Ok(format!("{}{}{}", &template[..start], number, suffix))
}

/// Diagnostic request plus the schema of its response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Request bytes, e.g. `[0x21, 0x01]`
    pub command: Vec<u8>,
    /// Identifier requests are sent to
    pub tx_id: u32,
    /// Identifier responses come from
    pub rx_id: u32,
    /// Failure is expected on some trims and is logged quietly
    #[serde(default)]
    pub optional: bool,
    /// Reassembled payload length the schema covers
    pub payload_len: usize,
    /// Ordered schema
    pub fields: Vec<FieldSpec>,
}

impl RequestDescriptor {
    pub fn new(command: &[u8], tx_id: u32, rx_id: u32, payload_len: usize) -> Self {
        Self {
            command: command.to_vec(),
            tx_id,
            rx_id,
            optional: false,
            payload_len,
            fields: Vec::new(),
        }
    }

    /// Mark the descriptor optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Append schema elements
    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Hex rendering of the command, used in logs
    pub fn label(&self) -> String {
        hex::encode_upper(&self.command)
    }

    /// Bytes the schema consumes
    pub fn schema_len(&self) -> usize {
        self.fields.iter().map(FieldSpec::byte_len).sum()
    }

    /// Every key this descriptor can produce, raw fields first
    pub fn field_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for field in &self.fields {
            match field {
                FieldSpec::Value { name, .. } => names.push(name.clone()),
                FieldSpec::Array {
                    name_template,
                    first_index,
                    count,
                    ..
                } => names.extend(
                    array_indices(*first_index, *count)
                        .into_iter()
                        .flatten()
                        .filter_map(|i| expand_name(name_template, i).ok()),
                ),
                FieldSpec::Padding { .. } | FieldSpec::Computed { .. } => {}
            }
        }
        names.extend(self.computed().map(|(name, _)| name.to_string()));
        names
    }

    /// Computed elements in declaration order
    pub fn computed(&self) -> impl Iterator<Item = (&str, &Computation)> {
        self.fields.iter().filter_map(|field| match field {
            FieldSpec::Computed {
                name, computation, ..
            } => Some((name.as_str(), computation)),
            _ => None,
        })
    }

    /// Check the schema before any request is sent
    pub fn validate(&self) -> Result<(), DecodeError> {
        let invalid = |reason: String| DecodeError::Schema {
            descriptor: self.label(),
            reason,
        };

        if self.command.is_empty() {
            return Err(invalid("empty request command".to_string()));
        }

        for field in &self.fields {
            match field {
                FieldSpec::Value { format, .. } | FieldSpec::Array { format, .. }
                    if !(1..=4).contains(&format.width) =>
                {
                    return Err(invalid(format!("width {} outside 1-4", format.width)));
                }
                FieldSpec::Array {
                    name_template,
                    first_index,
                    count,
                    ..
                } => {
                    if *count == 0 {
                        return Err(invalid(format!("{name_template:?} has zero count")));
                    }
                    if array_indices(*first_index, *count).is_none() {
                        return Err(invalid(format!(
                            "{name_template:?} indices {first_index}+{count} overflow"
                        )));
                    }
                    expand_name(name_template, *first_index).map_err(invalid)?;
                }
                _ => {}
            }
        }
        let schema_len = self.schema_len();
        if schema_len != self.payload_len {
            return Err(invalid(format!(
                "schema covers {schema_len} bytes, payload is {} bytes",
                self.payload_len
            )));
        }

        let mut seen = HashSet::new();
        for name in self.field_names() {
            if !seen.insert(name.clone()) {
                return Err(invalid(format!("duplicate field {name:?}")));
            }
        }
        Ok(())
    }
}
