//! Sample Record Observers

use pid_decoder::SampleRecord;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Result an observer reports back to the loop
pub type ObserverResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives every record the loop produces, on the loop thread
pub trait Observer: Send + Sync {
    fn on_record(&self, record: &SampleRecord) -> ObserverResult;
}

impl<F> Observer for F
where
    F: Fn(&SampleRecord) -> ObserverResult + Send + Sync,
{
    fn on_record(&self, record: &SampleRecord) -> ObserverResult {
        self(record)
    }
}

/// Handle returned by registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Ordered observer list with per-observer failure isolation
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Arc<dyn Observer>)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: impl Observer + 'static) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, Arc::new(observer)));
        debug!("Registered observer {:?}", id);
        id
    }

    /// Returns whether `id` was registered
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        before != observers.len()
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every observer in registration order. Returns how many succeeded.
    ///
    /// The list is snapshotted first, so observers may register, unregister
    /// or stop the loop from inside the callback.
    pub fn dispatch(&self, record: &SampleRecord) -> usize {
        let snapshot: Vec<_> = self.observers.lock().clone();

        let mut delivered = 0;
        for (id, observer) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| observer.on_record(record))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Observer {:?} failed: {}", id, e),
                Err(_) => error!("Observer {:?} panicked", id),
            }
        }
        delivered
    }
}

/// Forwards records into a tokio channel without blocking the loop
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<SampleRecord>,
}

impl ChannelObserver {
    /// Observer plus the receiving end of a channel holding `capacity` records
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SampleRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn from_sender(tx: mpsc::Sender<SampleRecord>) -> Self {
        Self { tx }
    }
}

impl Observer for ChannelObserver {
    fn on_record(&self, record: &SampleRecord) -> ObserverResult {
        match self.tx.try_send(record.clone()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Record channel full, dropping sample");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err("record channel closed".into()),
        }
    }
}
