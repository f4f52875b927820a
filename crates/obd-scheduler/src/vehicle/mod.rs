//! Vehicle Profiles
//!
//! A profile names the bus protocol and the diagnostic request table of one
//! vehicle model. The shared [`Vehicle::read_into`] walks that table.

mod ioniq_bev;

pub use ioniq_bev::IoniqBev;

use crate::error::SchedulerError;
use crate::pacing::Pacer;
use crate::scheduler::is_reserved_key;
use obd_protocol::{Elm327, ObdProtocol};
use pid_decoder::{decode_payload, RequestDescriptor, SampleRecord, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Record keys that signal a plugged-in vehicle
pub const CHARGING_INDICATORS: &[&str] = &["charging", "normalChargePort", "rapidChargePort"];

/// Outcome of one pass over a request table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Descriptors decoded and merged
    pub succeeded: usize,
    /// Descriptors that got no answer
    pub no_data: usize,
    /// Descriptors that failed on the bus, in framing or in decoding
    pub failed: usize,
    /// Mandatory descriptors that got no answer
    pub mandatory_no_data: usize,
    /// Mandatory descriptors attempted
    pub mandatory: usize,
}

impl ReadSummary {
    /// At least one descriptor was merged
    pub fn any_success(&self) -> bool {
        self.succeeded > 0
    }

    /// Every mandatory descriptor went unanswered
    pub fn vehicle_silent(&self) -> bool {
        self.mandatory > 0 && self.mandatory_no_data == self.mandatory
    }
}

/// A supported vehicle model
pub trait Vehicle: Send + Sync {
    /// Model name used for lookup and logs
    fn name(&self) -> &'static str;

    /// Bus protocol the diagnostic controllers speak
    fn protocol(&self) -> ObdProtocol;

    /// Diagnostic request table, in polling order
    fn descriptors(&self) -> &[RequestDescriptor];

    /// Keys that force speed to zero when any is non-zero
    fn charging_indicators(&self) -> &[&'static str] {
        CHARGING_INDICATORS
    }

    /// Every key a cycle can produce from this table
    fn field_names(&self) -> Vec<String> {
        self.descriptors()
            .iter()
            .flat_map(RequestDescriptor::field_names)
            .collect()
    }

    /// Check every descriptor schema and that no key is produced twice or
    /// collides with a key the cycle writes itself
    fn validate(&self) -> Result<(), SchedulerError> {
        let mut seen = HashSet::new();
        for descriptor in self.descriptors() {
            descriptor
                .validate()
                .map_err(|e| SchedulerError::Configuration(e.to_string()))?;
            for name in descriptor.field_names() {
                if is_reserved_key(&name) {
                    return Err(SchedulerError::Configuration(format!(
                        "{}: field {name:?} of {} is a reserved record key",
                        self.name(),
                        descriptor.label()
                    )));
                }
                if !seen.insert(name.clone()) {
                    return Err(SchedulerError::Configuration(format!(
                        "{}: field {name:?} produced by more than one request",
                        self.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Request, reassemble and decode every descriptor into `record`.
    ///
    /// Each descriptor fails on its own; the rest are still attempted. After
    /// a descriptor goes unanswered the pacer's no-data pause is observed.
    fn read_into(&self, session: &Elm327, record: &mut SampleRecord, pacer: &Pacer) -> ReadSummary {
        let mut summary = ReadSummary::default();
        for descriptor in self.descriptors() {
            if !pacer.is_running() {
                break;
            }
            if !descriptor.optional {
                summary.mandatory += 1;
            }
            match read_descriptor(session, descriptor) {
                Ok(values) => {
                    debug!("{}: decoded {} fields", descriptor.label(), values.len());
                    record.merge(values);
                    summary.succeeded += 1;
                }
                Err(e) if e.is_no_data() => {
                    summary.no_data += 1;
                    if descriptor.optional {
                        debug!("{}: no data (optional): {}", descriptor.label(), e);
                    } else {
                        summary.mandatory_no_data += 1;
                        warn!("{}: no data: {}", descriptor.label(), e);
                    }
                    pacer.pause_after_no_data();
                }
                Err(e) => {
                    summary.failed += 1;
                    if descriptor.optional {
                        debug!("{}: read failed (optional): {}", descriptor.label(), e);
                    } else {
                        warn!("{}: read failed: {}", descriptor.label(), e);
                    }
                }
            }
        }
        summary
    }
}

/// One descriptor's request, reassembly and decode
pub fn read_descriptor(
    session: &Elm327,
    descriptor: &RequestDescriptor,
) -> Result<Vec<(String, Value)>, SchedulerError> {
    let payload =
        session.request_payload(&descriptor.command, descriptor.tx_id, descriptor.rx_id)?;
    Ok(decode_payload(descriptor, &payload)?)
}

/// Look up a vehicle profile by model name
pub fn vehicle_for(name: &str) -> Result<Box<dyn Vehicle>, SchedulerError> {
    match name.to_ascii_lowercase().as_str() {
        "ioniqbev" | "ioniq_bev" | "ioniq" => Ok(Box::new(IoniqBev::new())),
        other => Err(SchedulerError::Configuration(format!(
            "unsupported vehicle model {other:?}"
        ))),
    }
}
