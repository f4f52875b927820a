//! Acquisition Scheduler Implementation

use crate::error::SchedulerError;
use crate::location::{LocationFix, LocationSource, NoLocation, MODE_NONE};
use crate::observer::{Observer, ObserverId, ObserverRegistry, ObserverResult};
use crate::pacing::Pacer;
use crate::vehicle::Vehicle;
use chrono::{DateTime, Utc};
use obd_protocol::Elm327;
use pid_decoder::{evaluate_computed, SampleRecord, Value};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Location keys present in every record
const LOCATION_KEYS: &[&str] = &[
    "latitude",
    "longitude",
    "speed",
    "altitude",
    "gdop",
    "pdop",
    "hdop",
    "vdop",
    "tdop",
    "gps_device",
];

/// Adapter-measured supply voltage key
const OBD_VOLTAGE: &str = "obdVoltage";

/// Fix quality key, present even without a location source
const FIX_MODE: &str = "fix_mode";

/// Whether `name` is written by the cycle itself or by record serialization
pub fn is_reserved_key(name: &str) -> bool {
    matches!(name, "timestamp" | FIX_MODE | OBD_VOLTAGE) || LOCATION_KEYS.contains(&name)
}

/// Configuration for the acquisition loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Target cycle length in milliseconds (default: 1000)
    pub poll_interval_ms: u64,
    /// Extra wait after every cycle in milliseconds (default: 1000)
    pub settle_time_ms: u64,
    /// Back-off after a descriptor got no answer in milliseconds (default: 1000)
    pub no_data_pause_ms: u64,
    /// Merge the adapter's supply voltage reading into every record
    pub read_supply_voltage: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            settle_time_ms: 1000,
            no_data_pause_ms: 1000,
            read_supply_voltage: true,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_time_ms)
    }

    pub fn no_data_pause(&self) -> Duration {
        Duration::from_millis(self.no_data_pause_ms)
    }
}

/// Decides whether a silent vehicle is worth polling again
pub trait Availability: Send + Sync {
    fn is_vehicle_available(&self) -> bool;
}

/// Always retries on the next cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl Availability for AlwaysAvailable {
    fn is_vehicle_available(&self) -> bool {
        true
    }
}

type LastRead = Arc<Mutex<Option<DateTime<Utc>>>>;

/// Body of one acquisition cycle, independent of threading
pub struct CycleRunner {
    vehicle: Box<dyn Vehicle>,
    session: Arc<Elm327>,
    location: Arc<dyn LocationSource>,
    availability: Box<dyn Availability>,
    read_supply_voltage: bool,
    keys: Vec<String>,
    /// Set after a cycle in which every mandatory request went unanswered
    no_data_latched: bool,
    last_successful_read: LastRead,
}

impl CycleRunner {
    pub fn new(vehicle: Box<dyn Vehicle>, session: Arc<Elm327>, config: &SchedulerConfig) -> Self {
        let mut keys = vehicle.field_names();
        keys.extend(LOCATION_KEYS.iter().map(|k| k.to_string()));
        if config.read_supply_voltage {
            keys.push(OBD_VOLTAGE.to_string());
        }
        Self {
            vehicle,
            session,
            location: Arc::new(NoLocation),
            availability: Box::new(AlwaysAvailable),
            read_supply_voltage: config.read_supply_voltage,
            keys,
            no_data_latched: false,
            last_successful_read: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_location(mut self, location: Arc<dyn LocationSource>) -> Self {
        self.location = location;
        self
    }

    pub fn with_availability(mut self, availability: Box<dyn Availability>) -> Self {
        self.availability = availability;
        self
    }

    pub fn vehicle(&self) -> &dyn Vehicle {
        self.vehicle.as_ref()
    }

    /// Whether live reads are paused because the vehicle went silent
    pub fn is_latched(&self) -> bool {
        self.no_data_latched
    }

    pub fn last_successful_read(&self) -> Option<DateTime<Utc>> {
        *self.last_successful_read.lock()
    }

    fn should_read(&mut self) -> bool {
        if !self.no_data_latched {
            return true;
        }
        if self.availability.is_vehicle_available() {
            info!("{} available again, resuming live reads", self.vehicle.name());
            self.no_data_latched = false;
            true
        } else {
            debug!("{} still unavailable, skipping live read", self.vehicle.name());
            false
        }
    }

    /// Build one sample record
    pub fn run_cycle(&mut self, pacer: &Pacer) -> SampleRecord {
        let started = Utc::now();
        let mut record = SampleRecord::new(started, self.keys.iter().cloned());
        record.set(FIX_MODE, f64::from(MODE_NONE));

        if self.should_read() {
            let summary = self.vehicle.read_into(&self.session, &mut record, pacer);
            debug!(
                "Cycle read: {} ok, {} no data, {} failed",
                summary.succeeded, summary.no_data, summary.failed
            );
            if summary.any_success() {
                *self.last_successful_read.lock() = Some(started);
            }
            if summary.vehicle_silent() {
                info!(
                    "{} did not answer any request, pausing live reads",
                    self.vehicle.name()
                );
                self.no_data_latched = true;
            }
            evaluate_computed(self.vehicle.descriptors(), &mut record);
        }

        if let Some(fix) = self.location.fix().filter(LocationFix::has_position) {
            self.merge_fix(&mut record, &fix);
        }

        if self.read_supply_voltage {
            match self.session.supply_voltage() {
                Ok(volts) => record.set(OBD_VOLTAGE, volts),
                Err(e) => debug!("Supply voltage unavailable: {}", e),
            }
        }

        record
    }

    fn merge_fix(&self, record: &mut SampleRecord, fix: &LocationFix) {
        let charging = self
            .vehicle
            .charging_indicators()
            .iter()
            .any(|key| record.get(key).is_some_and(Value::is_truthy));
        // A plugged-in car is parked whatever the receiver says
        let speed = if charging { 0.0 } else { fix.speed };

        record.set(FIX_MODE, f64::from(fix.mode));
        record.set("latitude", fix.latitude);
        record.set("longitude", fix.longitude);
        record.set("speed", speed);
        record.set("altitude", fix.altitude);
        record.set("gdop", fix.gdop);
        record.set("pdop", fix.pdop);
        record.set("hdop", fix.hdop);
        record.set("vdop", fix.vdop);
        record.set("tdop", fix.tdop);
        record.set("gps_device", fix.device.as_str());
    }
}

/// Fixed-interval acquisition loop on a dedicated thread
pub struct AcquisitionScheduler {
    running: Arc<AtomicBool>,
    pacer: Pacer,
    runner: Mutex<Option<CycleRunner>>,
    handle: Mutex<Option<JoinHandle<CycleRunner>>>,
    observers: Arc<ObserverRegistry>,
    last_successful_read: LastRead,
}

impl AcquisitionScheduler {
    pub fn new(runner: CycleRunner, config: &SchedulerConfig) -> Self {
        let running = Arc::new(AtomicBool::new(false));
        Self {
            pacer: Pacer::new(
                running.clone(),
                config.poll_interval(),
                config.settle_time(),
                config.no_data_pause(),
            ),
            running,
            last_successful_read: runner.last_successful_read.clone(),
            runner: Mutex::new(Some(runner)),
            handle: Mutex::new(None),
            observers: Arc::new(ObserverRegistry::new()),
        }
    }

    /// Spawn the loop thread.
    ///
    /// A loop stopped from its own thread is joined first, without holding
    /// the handle lock, so that thread can still finish its `stop()`.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let previous = {
            let mut slot = self.handle.lock();
            match slot.take() {
                Some(previous)
                    if self.running.load(Ordering::SeqCst)
                        || previous.thread().id() == thread::current().id() =>
                {
                    *slot = Some(previous);
                    return Err(SchedulerError::AlreadyRunning("acquisition scheduler"));
                }
                previous => previous,
            }
        };
        if let Some(previous) = previous {
            self.reclaim(previous);
        }

        let mut slot = self.handle.lock();
        if slot.is_some() {
            return Err(SchedulerError::AlreadyRunning("acquisition scheduler"));
        }
        let mut runner = self
            .runner
            .lock()
            .take()
            .ok_or(SchedulerError::AlreadyRunning("acquisition scheduler"))?;

        self.running.store(true, Ordering::SeqCst);
        let pacer = self.pacer.clone();
        let observers = self.observers.clone();

        let spawned = thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || {
                info!("Starting acquisition loop for {}", runner.vehicle().name());
                while pacer.is_running() {
                    let cycle_start = Instant::now();
                    let record = runner.run_cycle(&pacer);
                    let delivered = observers.dispatch(&record);
                    debug!("Record dispatched to {} observers", delivered);
                    if !pacer.finish_cycle(cycle_start) {
                        break;
                    }
                }
                info!("Acquisition loop stopped");
                runner
            });

        match spawned {
            Ok(join) => {
                *slot = Some(join);
                Ok(())
            }
            Err(source) => {
                self.running.store(false, Ordering::SeqCst);
                Err(SchedulerError::Spawn {
                    name: "acquisition",
                    source,
                })
            }
        }
    }

    /// Signal the loop and wait for it to exit.
    ///
    /// Called from the loop thread itself (an observer), only signals.
    pub fn stop(&self) {
        info!("Stopping acquisition loop");
        self.running.store(false, Ordering::SeqCst);
        let mut slot = self.handle.lock();
        let Some(handle) = slot.take() else {
            return;
        };
        handle.thread().unpark();
        if handle.thread().id() == thread::current().id() {
            *slot = Some(handle);
            return;
        }
        drop(slot);
        self.reclaim(handle);
    }

    fn reclaim(&self, handle: JoinHandle<CycleRunner>) {
        match handle.join() {
            Ok(runner) => {
                *self.runner.lock() = Some(runner);
            }
            Err(_) => warn!("Acquisition thread panicked; scheduler cannot restart"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .handle
                .lock()
                .as_ref()
                .is_some_and(|h| !h.is_finished())
    }

    pub fn register(&self, observer: impl Observer + 'static) -> ObserverId {
        self.observers.register(observer)
    }

    /// Register a closure observer
    pub fn register_fn<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&SampleRecord) -> ObserverResult + Send + Sync + 'static,
    {
        self.observers.register(observer)
    }

    pub fn unregister(&self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Start of the last cycle in which any request was decoded
    pub fn last_successful_read(&self) -> Option<DateTime<Utc>> {
        *self.last_successful_read.lock()
    }
}

impl Drop for AcquisitionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::test_fix;
    use crate::vehicle::IoniqBev;
    use obd_protocol::mock::MockLink;
    use std::sync::atomic::AtomicUsize;

    const TIMEOUT: Duration = Duration::from_millis(50);

    /// Segment `payload` into adapter lines from `rx` (11-bit, headers on)
    fn isotp_lines(rx: &str, payload: &[u8]) -> String {
        let padded_hex = |bytes: &[u8]| -> String {
            let mut padded = bytes.to_vec();
            padded.resize(7, 0xAA);
            hex::encode_upper(padded)
        };
        if payload.len() <= 7 {
            return format!("{rx}0{:X}{}", payload.len(), &padded_hex(payload)[..14]);
        }
        let len = payload.len();
        let mut lines = vec![format!(
            "{rx}1{:03X}{}",
            len,
            hex::encode_upper(&payload[..6])
        )];
        for (i, chunk) in payload[6..].chunks(7).enumerate() {
            lines.push(format!("{rx}2{:X}{}", (i + 1) % 16, padded_hex(chunk)));
        }
        lines.join("\r")
    }

    fn bms_2101(charging_bits: u8) -> Vec<u8> {
        let mut payload = vec![0u8; 61];
        payload[0] = 0x61;
        payload[1] = 0x01;
        payload[6] = 160; // SOC_BMS 80 %
        payload[11] = charging_bits;
        payload[12..14].copy_from_slice(&(-500i16).to_be_bytes()); // -50.0 A
        payload[14..16].copy_from_slice(&3600u16.to_be_bytes()); // 360.0 V
        payload
    }

    fn scripted_link(charging_bits: u8) -> MockLink {
        let link = MockLink::new();
        link.respond("2101", &isotp_lines("7EC", &bms_2101(charging_bits)));
        for command in ["2102", "2103", "2104", "2105", "2180", "22B002"] {
            link.respond(command, "NO DATA");
        }
        link
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            poll_interval_ms: 10,
            settle_time_ms: 0,
            no_data_pause_ms: 0,
            read_supply_voltage: true,
        }
    }

    fn runner(link: &MockLink) -> CycleRunner {
        let session = Elm327::with_link(Box::new(link.clone()), TIMEOUT).unwrap();
        CycleRunner::new(Box::new(IoniqBev::new()), Arc::new(session), &fast_config())
    }

    struct FixedLocation(LocationFix);

    impl LocationSource for FixedLocation {
        fn fix(&self) -> Option<LocationFix> {
            Some(self.0.clone())
        }
    }

    struct Switch(Arc<AtomicBool>);

    impl Availability for Switch {
        fn is_vehicle_available(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_segmented_fixture_reassembles() {
        let payload = bms_2101(0x80);
        let lines = isotp_lines("7EC", &payload).replace('\r', "\n");
        assert_eq!(obd_protocol::reassemble(&lines, false).unwrap(), payload);
    }

    #[test]
    fn test_cycle_decodes_and_computes() {
        let link = scripted_link(0x00);
        let mut runner = runner(&link);
        let record = runner.run_cycle(&Pacer::immediate());

        assert_eq!(record.number("SOC_BMS"), Some(80.0));
        assert!((record.number("dcBatteryCurrent").unwrap() + 50.0).abs() < 1e-9);
        assert!((record.number("dcBatteryVoltage").unwrap() - 360.0).abs() < 1e-9);
        assert!((record.number("dcBatteryPower").unwrap() + 18.0).abs() < 1e-9);
        assert_eq!(record.number("charging"), Some(0.0));
        assert_eq!(record.get("cellVoltage01"), Some(&Value::Unknown));
        assert_eq!(record.get("odo"), Some(&Value::Unknown));
        assert_eq!(record.number("fix_mode"), Some(0.0));
        assert_eq!(record.number(OBD_VOLTAGE), Some(12.6));
        assert!(runner.last_successful_read().is_some());
        assert!(!runner.is_latched());
    }

    #[test]
    fn test_failed_descriptor_does_not_stop_the_rest() {
        let link = scripted_link(0x00);
        // Sequence 3 where 2 is expected
        link.respond(
            "2102",
            "7EC1026620101020304\r7EC2105060708091011\r7EC2312131415161718",
        );
        let mut runner = runner(&link);
        let record = runner.run_cycle(&Pacer::immediate());
        assert_eq!(record.number("SOC_BMS"), Some(80.0));
        assert_eq!(record.get("cellVoltage01"), Some(&Value::Unknown));
        assert_eq!(link.commands_with_prefix("2180").len(), 1);
    }

    #[test]
    fn test_charging_forces_speed_zero() {
        let link = scripted_link(0x80);
        let mut runner = runner(&link)
            .with_location(Arc::new(FixedLocation(test_fix(3, 12.5))));
        let record = runner.run_cycle(&Pacer::immediate());

        assert_eq!(record.number("charging"), Some(1.0));
        assert_eq!(record.number("speed"), Some(0.0));
        assert_eq!(record.number("fix_mode"), Some(3.0));
        assert_eq!(record.number("latitude"), Some(52.52));
    }

    #[test]
    fn test_rapid_charge_port_forces_speed_zero() {
        let link = scripted_link(0x40);
        let mut runner = runner(&link)
            .with_location(Arc::new(FixedLocation(test_fix(2, 7.0))));
        let record = runner.run_cycle(&Pacer::immediate());
        assert_eq!(record.number("rapidChargePort"), Some(1.0));
        assert_eq!(record.number("speed"), Some(0.0));
    }

    #[test]
    fn test_location_merge() {
        let link = scripted_link(0x00);
        let mut moving = runner(&link)
            .with_location(Arc::new(FixedLocation(test_fix(3, 12.5))));
        let record = moving.run_cycle(&Pacer::immediate());
        assert_eq!(record.number("speed"), Some(12.5));
        assert_eq!(
            record.get("gps_device"),
            Some(&Value::Text("/dev/ttyACM0".to_string()))
        );

        let mut no_fix = runner(&link)
            .with_location(Arc::new(FixedLocation(test_fix(1, 12.5))));
        let record = no_fix.run_cycle(&Pacer::immediate());
        assert_eq!(record.number("fix_mode"), Some(0.0));
        assert_eq!(record.get("speed"), Some(&Value::Unknown));
        assert_eq!(record.get("latitude"), Some(&Value::Unknown));
    }

    struct OneFix(Option<LocationFix>);

    impl crate::location::FixReceiver for OneFix {
        fn next_fix(&mut self) -> std::io::Result<Option<LocationFix>> {
            thread::sleep(Duration::from_millis(2));
            Ok(self.0.take())
        }
    }

    #[test]
    fn test_location_keys_with_and_without_poller() {
        let link = scripted_link(0x00);
        let record = runner(&link).run_cycle(&Pacer::immediate());
        assert_eq!(record.number("fix_mode"), Some(0.0));
        for key in LOCATION_KEYS {
            assert_eq!(record.get(key), Some(&Value::Unknown), "{key}");
        }

        let poller = Arc::new(crate::location::GpsPoller::new(
            Box::new(OneFix(Some(test_fix(3, 4.0)))),
            Duration::from_secs(60),
        ));
        poller.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while poller.fix().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let mut located = runner(&link).with_location(poller.clone());
        let record = located.run_cycle(&Pacer::immediate());
        poller.stop();
        assert_eq!(record.number("fix_mode"), Some(3.0));
        assert_eq!(record.number("speed"), Some(4.0));
    }

    #[test]
    fn test_silent_vehicle_latches_until_available() {
        let link = scripted_link(0x00);
        link.respond("2101", "NO DATA");
        link.respond("2180", "CAN ERROR");
        let available = Arc::new(AtomicBool::new(false));
        let mut runner = runner(&link).with_availability(Box::new(Switch(available.clone())));

        // 2180 failed on the bus, not silent: no latch
        runner.run_cycle(&Pacer::immediate());
        assert!(!runner.is_latched());

        link.respond("2180", "NO DATA");
        runner.run_cycle(&Pacer::immediate());
        assert!(runner.is_latched());
        assert!(runner.last_successful_read().is_none());

        link.clear_commands();
        let record = runner.run_cycle(&Pacer::immediate());
        assert!(link.commands_with_prefix("21").is_empty());
        assert_eq!(record.get("SOC_BMS"), Some(&Value::Unknown));
        assert_eq!(record.number(OBD_VOLTAGE), Some(12.6));

        available.store(true, Ordering::SeqCst);
        link.respond("2101", &isotp_lines("7EC", &bms_2101(0)));
        let record = runner.run_cycle(&Pacer::immediate());
        assert!(!runner.is_latched());
        assert_eq!(record.number("SOC_BMS"), Some(80.0));
    }

    #[test]
    fn test_supply_voltage_disabled() {
        let link = scripted_link(0x00);
        let session = Elm327::with_link(Box::new(link.clone()), TIMEOUT).unwrap();
        let config = SchedulerConfig {
            read_supply_voltage: false,
            ..fast_config()
        };
        let mut runner = CycleRunner::new(Box::new(IoniqBev::new()), Arc::new(session), &config);
        link.clear_commands();
        let record = runner.run_cycle(&Pacer::immediate());
        assert!(record.get(OBD_VOLTAGE).is_none());
        assert!(link.commands_with_prefix("ATRV").is_empty());
    }

    #[test]
    fn test_start_stop_dispatches_records() {
        let link = scripted_link(0x00);
        let scheduler = AcquisitionScheduler::new(runner(&link), &fast_config());
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        scheduler.register_fn(move |record: &SampleRecord| -> ObserverResult {
            assert!(record.get("SOC_BMS").is_some());
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(!scheduler.is_running());
        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start(),
            Err(SchedulerError::AlreadyRunning(_))
        ));

        let deadline = Instant::now() + Duration::from_secs(10);
        while count.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(count.load(Ordering::SeqCst) >= 2);
        assert!(scheduler.last_successful_read().is_some());

        let after_stop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);

        // Restartable
        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        scheduler.stop();
    }

    #[test]
    fn test_stop_from_observer() {
        let link = scripted_link(0x00);
        let scheduler = Arc::new(AcquisitionScheduler::new(runner(&link), &fast_config()));
        let count = Arc::new(AtomicUsize::new(0));
        let (handle, seen) = (Arc::downgrade(&scheduler), count.clone());
        scheduler.register_fn(move |_: &SampleRecord| -> ObserverResult {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(scheduler) = handle.upgrade() {
                scheduler.stop();
            }
            Ok(())
        });

        scheduler.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while scheduler.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!scheduler.is_running());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // The loop thread was never joined by itself; a new start reclaims it
        scheduler.start().unwrap();
        scheduler.stop();
    }

    #[test]
    fn test_restart_right_after_observer_stop() {
        let link = scripted_link(0x00);
        let scheduler = Arc::new(AcquisitionScheduler::new(runner(&link), &fast_config()));
        let count = Arc::new(AtomicUsize::new(0));
        let (handle, seen) = (Arc::downgrade(&scheduler), count.clone());
        scheduler.register_fn(move |_: &SampleRecord| -> ObserverResult {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(scheduler) = handle.upgrade() {
                scheduler.stop();
            }
            Ok(())
        });

        let deadline = Instant::now() + Duration::from_secs(30);
        for round in 1..=20 {
            scheduler.start().unwrap();
            // Restart as soon as the flag drops, while the loop thread may
            // still be inside its own stop()
            while scheduler.running.load(Ordering::SeqCst) {
                assert!(Instant::now() < deadline, "round {round} never stopped");
                thread::yield_now();
            }
            assert_eq!(count.load(Ordering::SeqCst), round);
        }
        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(scheduler.runner.lock().is_some());
    }

    #[test]
    fn test_unregistered_observer_not_called() {
        let link = scripted_link(0x00);
        let scheduler = AcquisitionScheduler::new(runner(&link), &fast_config());
        let id = scheduler.register_fn(|_: &SampleRecord| -> ObserverResult {
            panic!("unregistered observer called")
        });
        assert!(scheduler.unregister(id));
        assert!(!scheduler.unregister(id));
    }

    #[test]
    fn test_reserved_keys() {
        for key in ["timestamp", "fix_mode", "obdVoltage", "latitude", "gps_device"] {
            assert!(is_reserved_key(key), "{key}");
        }
        assert!(!is_reserved_key("SOC_BMS"));
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"poll_interval_ms": 250}"#).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.settle_time(), Duration::from_secs(1));
        assert_eq!(config.no_data_pause(), Duration::from_secs(1));
        assert!(config.read_supply_voltage);
    }
}
