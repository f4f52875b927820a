//! Location Fix Sources
//!
//! The scheduler only asks for the latest fix. [`GpsPoller`] keeps one
//! current by draining a blocking [`FixReceiver`] on its own thread.

use crate::error::SchedulerError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Fix quality: no mode reported
pub const MODE_NONE: u8 = 0;
/// Fix quality: receiver up, no fix
pub const MODE_NO_FIX: u8 = 1;
/// Fix quality: 2-D fix
pub const MODE_2D: u8 = 2;
/// Fix quality: 3-D fix
pub const MODE_3D: u8 = 3;

/// One position report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationFix {
    pub mode: u8,
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in m/s
    pub speed: f64,
    pub gdop: f64,
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub tdop: f64,
    pub altitude: f64,
    /// Receiver device path
    pub device: String,
    #[serde(skip)]
    pub received_at: Instant,
}

impl LocationFix {
    /// Mode 2 or better
    pub fn has_position(&self) -> bool {
        self.mode >= MODE_2D
    }

    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

/// Query interface the scheduler reads fixes from
pub trait LocationSource: Send + Sync {
    /// Latest usable fix, if any
    fn fix(&self) -> Option<LocationFix>;
}

impl<T: LocationSource + ?Sized> LocationSource for Arc<T> {
    fn fix(&self) -> Option<LocationFix> {
        (**self).fix()
    }
}

/// Source that never reports a fix
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationSource for NoLocation {
    fn fix(&self) -> Option<LocationFix> {
        None
    }
}

/// Blocking feed of position reports (gpsd client, NMEA reader, replay file)
pub trait FixReceiver: Send + 'static {
    /// Wait a bounded time for the next report; `Ok(None)` when none arrived
    fn next_fix(&mut self) -> std::io::Result<Option<LocationFix>>;
}

type Shared<T> = Arc<Mutex<T>>;

/// Background thread publishing the most recent fix
pub struct GpsPoller {
    latest: Shared<Option<LocationFix>>,
    running: Arc<AtomicBool>,
    receiver: Mutex<Option<Box<dyn FixReceiver>>>,
    handle: Mutex<Option<JoinHandle<Box<dyn FixReceiver>>>>,
    max_fix_age: Duration,
    retry_delay: Duration,
}

impl GpsPoller {
    pub fn new(receiver: Box<dyn FixReceiver>, max_fix_age: Duration) -> Self {
        Self {
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            receiver: Mutex::new(Some(receiver)),
            handle: Mutex::new(None),
            max_fix_age,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Delay before reading again after a receiver error
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Spawn the polling thread
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(SchedulerError::AlreadyRunning("GPS poller"));
        }
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(SchedulerError::AlreadyRunning("GPS poller"))?;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let latest = self.latest.clone();
        let retry_delay = self.retry_delay;

        let spawned = thread::Builder::new()
            .name("gps-poller".to_string())
            .spawn(move || {
                info!("GPS poller started");
                while running.load(Ordering::SeqCst) {
                    match receiver.next_fix() {
                        Ok(Some(fix)) => {
                            debug!("GPS fix mode {} from {}", fix.mode, fix.device);
                            *latest.lock() = Some(fix);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("GPS receiver error: {}", e);
                            thread::park_timeout(retry_delay);
                        }
                    }
                }
                info!("GPS poller stopped");
                receiver
            });

        match spawned {
            Ok(join) => {
                *handle = Some(join);
                Ok(())
            }
            Err(source) => {
                self.running.store(false, Ordering::SeqCst);
                Err(SchedulerError::Spawn {
                    name: "gps-poller",
                    source,
                })
            }
        }
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.thread().unpark();
            match handle.join() {
                Ok(receiver) => {
                    *self.receiver.lock() = Some(receiver);
                }
                Err(_) => warn!("GPS poller thread panicked"),
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl LocationSource for GpsPoller {
    fn fix(&self) -> Option<LocationFix> {
        self.latest
            .lock()
            .as_ref()
            .filter(|fix| fix.age() <= self.max_fix_age)
            .cloned()
    }
}

impl Drop for GpsPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) fn test_fix(mode: u8, speed: f64) -> LocationFix {
    LocationFix {
        mode,
        latitude: 52.52,
        longitude: 13.405,
        speed,
        gdop: 1.2,
        pdop: 1.1,
        hdop: 0.9,
        vdop: 0.8,
        tdop: 0.7,
        altitude: 34.0,
        device: "/dev/ttyACM0".to_string(),
        received_at: Instant::now(),
    }
}
