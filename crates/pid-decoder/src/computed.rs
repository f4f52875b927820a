//! Derived fields evaluated over a merged record

use crate::record::{SampleRecord, Value};
use crate::schema::{Computation, RequestDescriptor};

fn evaluate(computation: &Computation, record: &SampleRecord) -> Value {
    let operand = |name: &str| record.number(name);
    let result = match computation {
        Computation::Linear {
            source,
            scale,
            offset,
        } => operand(source).map(|v| v * scale + offset),
        Computation::BitTest { source, mask } => operand(source).map(|v| {
            if (v as i64) & i64::from(*mask) != 0 {
                1.0
            } else {
                0.0
            }
        }),
        Computation::Ratio {
            numerator,
            denominator,
            scale,
        } => match (operand(numerator), operand(denominator)) {
            (Some(n), Some(d)) if d != 0.0 => Some(n / d * scale),
            _ => None,
        },
        Computation::Product { factors, scale } => factors
            .iter()
            .try_fold(1.0, |acc, name| operand(name).map(|v| acc * v))
            .map(|p| p * scale),
    };
    Value::from(result)
}

/// Evaluate computed fields of every descriptor in declaration order
///
/// Later computations may reference earlier ones. A missing or unknown
/// operand yields [`Value::Unknown`].
pub fn evaluate_computed(descriptors: &[RequestDescriptor], record: &mut SampleRecord) {
    for descriptor in descriptors {
        for (name, computation) in descriptor.computed() {
            let value = evaluate(computation, record);
            record.set(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, Scalar};
    use chrono::Utc;

    fn power_descriptor() -> RequestDescriptor {
        RequestDescriptor::new(&[0x21, 0x01], 0x7E4, 0x7EC, 4).fields([
            FieldSpec::value("batteryCurrent", Scalar::signed(2).scale(0.1)),
            FieldSpec::value("batteryVoltage", Scalar::unsigned(2).scale(0.1)),
            FieldSpec::computed(
                "batteryPower",
                Computation::product(&["batteryCurrent", "batteryVoltage"], 0.001),
                Some("kW"),
            ),
        ])
    }

    #[test]
    fn test_product_with_known_operands() {
        let descriptor = power_descriptor();
        let mut record = SampleRecord::new(Utc::now(), descriptor.field_names());
        record.set("batteryCurrent", 100.0);
        record.set("batteryVoltage", 360.0);
        evaluate_computed(&[descriptor], &mut record);
        assert!((record.number("batteryPower").unwrap() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_product_unknown_operand() {
        let descriptor = power_descriptor();
        let mut record = SampleRecord::new(Utc::now(), descriptor.field_names());
        record.set("batteryVoltage", 360.0);
        evaluate_computed(&[descriptor], &mut record);
        assert_eq!(record.get("batteryPower"), Some(&Value::Unknown));
    }

    #[test]
    fn test_bit_test_and_chaining() {
        let descriptor = RequestDescriptor::new(&[0x21, 0x01], 0x7E4, 0x7EC, 1).fields([
            FieldSpec::value("chargingBits", Scalar::unsigned(1)),
            FieldSpec::computed("charging", Computation::bit_test("chargingBits", 0x80), None),
            FieldSpec::computed("rapid", Computation::bit_test("chargingBits", 0x40), None),
            FieldSpec::computed("chargingTwice", Computation::linear("charging", 2.0, 0.0), None),
        ]);
        let mut record = SampleRecord::new(Utc::now(), descriptor.field_names());
        record.set("chargingBits", 0xA0 as f64);
        evaluate_computed(&[descriptor], &mut record);
        assert_eq!(record.number("charging"), Some(1.0));
        assert_eq!(record.number("rapid"), Some(0.0));
        assert_eq!(record.number("chargingTwice"), Some(2.0));
    }

    #[test]
    fn test_ratio_zero_denominator() {
        let descriptor = RequestDescriptor::new(&[0x21, 0x05], 0x7E4, 0x7EC, 0).fields([
            FieldSpec::computed("efficiency", Computation::ratio("distance", "energy", 1.0), None),
        ]);
        let mut record = SampleRecord::new(Utc::now(), ["distance", "energy"]);
        record.set("distance", 10.0);
        record.set("energy", 0.0);
        evaluate_computed(std::slice::from_ref(&descriptor), &mut record);
        assert_eq!(record.get("efficiency"), Some(&Value::Unknown));

        record.set("energy", 2.0);
        evaluate_computed(&[descriptor], &mut record);
        assert_eq!(record.number("efficiency"), Some(5.0));
    }
}
