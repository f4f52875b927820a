//! Acquisition Scheduler for EV Diagnostics
//!
//! Polls a vehicle's diagnostic request table on a fixed cadence, merges
//! an optional location fix, and fans each sample record out to observers.

mod error;
mod location;
mod observer;
mod pacing;
mod scheduler;
pub mod vehicle;

pub use error::SchedulerError;
pub use location::{
    FixReceiver, GpsPoller, LocationFix, LocationSource, NoLocation, MODE_2D, MODE_3D, MODE_NONE,
    MODE_NO_FIX,
};
pub use observer::{ChannelObserver, Observer, ObserverId, ObserverRegistry, ObserverResult};
pub use pacing::{pacing_delay, Pacer};
pub use scheduler::{
    is_reserved_key, AcquisitionScheduler, AlwaysAvailable, Availability, CycleRunner,
    SchedulerConfig,
};
pub use vehicle::{vehicle_for, ReadSummary, Vehicle};
