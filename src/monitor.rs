//! Outcome reporting for published events.
//!
//! The dispatcher calls [`MessageMonitor::on_ingested`] once per send and
//! reports the outcome on the returned [`MonitorCallback`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::envelope::EventEnvelope;
use crate::Error;

pub trait MessageMonitor: Send + Sync {
    fn on_ingested(&self, envelope: &EventEnvelope) -> Box<dyn MonitorCallback>;
}

pub trait MonitorCallback: Send {
    fn report_success(&self);

    fn report_failure(&self, error: &Error);

    fn report_ignored(&self) {}
}

/// Monitor that discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMonitor;

struct NoOpCallback;

impl MonitorCallback for NoOpCallback {
    fn report_success(&self) {}

    fn report_failure(&self, _error: &Error) {}
}

impl MessageMonitor for NoOpMonitor {
    fn on_ingested(&self, _envelope: &EventEnvelope) -> Box<dyn MonitorCallback> {
        Box::new(NoOpCallback)
    }
}

/// Monitor that logs every outcome through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

struct TracingCallback {
    identifier: String,
    payload_type: String,
}

impl MonitorCallback for TracingCallback {
    fn report_success(&self) {
        debug!(
            event_id = %self.identifier,
            payload_type = %self.payload_type,
            "Event published"
        );
    }

    fn report_failure(&self, error: &Error) {
        warn!(
            event_id = %self.identifier,
            payload_type = %self.payload_type,
            error = %error,
            "Event publication failed"
        );
    }

    fn report_ignored(&self) {
        debug!(event_id = %self.identifier, "Event ignored");
    }
}

impl MessageMonitor for TracingMonitor {
    fn on_ingested(&self, envelope: &EventEnvelope) -> Box<dyn MonitorCallback> {
        Box::new(TracingCallback {
            identifier: envelope.identifier.clone(),
            payload_type: envelope.payload_type.clone(),
        })
    }
}

#[derive(Debug, Default)]
struct Counters {
    ingested: AtomicUsize,
    successes: AtomicUsize,
    failures: AtomicUsize,
    ignored: AtomicUsize,
}

/// Monitor that counts notifications, handy in tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingMonitor {
    counters: Arc<Counters>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingested(&self) -> usize {
        self.counters.ingested.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> usize {
        self.counters.successes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.counters.failures.load(Ordering::SeqCst)
    }

    pub fn ignored(&self) -> usize {
        self.counters.ignored.load(Ordering::SeqCst)
    }
}

struct RecordingCallback {
    counters: Arc<Counters>,
}

impl MonitorCallback for RecordingCallback {
    fn report_success(&self) {
        self.counters.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn report_failure(&self, _error: &Error) {
        self.counters.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn report_ignored(&self) {
        self.counters.ignored.fetch_add(1, Ordering::SeqCst);
    }
}

impl MessageMonitor for RecordingMonitor {
    fn on_ingested(&self, _envelope: &EventEnvelope) -> Box<dyn MonitorCallback> {
        self.counters.ingested.fetch_add(1, Ordering::SeqCst);
        Box::new(RecordingCallback {
            counters: Arc::clone(&self.counters),
        })
    }
}
