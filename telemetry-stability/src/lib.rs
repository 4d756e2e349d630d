//! Rolling-window stability detection across telemetry channels.
//!
//! The telemetry consumer records classified samples into a
//! [`StabilityMonitor`]; the capture path blocks on
//! [`StabilityMonitor::wait_for_stability`] until every channel group is
//! simultaneously stable. Stability of a channel means its observation
//! window is fully populated and holds a single distinct value.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use capture_types::{Channel, TelemetrySample};
use tokio::sync::Notify;

/// Number of samples over which pan and tilt must hold constant.
pub const PAN_TILT_WINDOW: usize = 15;
/// Number of samples over which each zoom channel must hold constant.
pub const ZOOM_WINDOW: usize = 5;
/// Default re-check interval of the stability gate.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("telemetry did not stabilize within {0:?}")]
pub struct StabilityTimeout(pub Duration);

/// Fixed-capacity FIFO buffer of the most recent samples for one channel.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, evicting the oldest one when at capacity.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// True when the window is full and every stored value is bit-for-bit
    /// identical. Partially-filled windows are never singleton.
    pub fn is_singleton(&self) -> bool {
        if !self.is_full() {
            return false;
        }
        let mut bits = self.values.iter().map(|v| v.to_bits());
        match bits.next() {
            Some(first) => bits.all(|b| b == first),
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}

/// One rolling window per telemetry channel, plus the group predicates.
#[derive(Debug)]
pub struct TelemetryTracker {
    pan: RollingWindow,
    tilt: RollingWindow,
    zoom_a: RollingWindow,
    zoom_b: RollingWindow,
}

impl Default for TelemetryTracker {
    fn default() -> Self {
        Self::with_capacities(PAN_TILT_WINDOW, ZOOM_WINDOW)
    }
}

impl TelemetryTracker {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_capacities(pan_tilt: usize, zoom: usize) -> Self {
        Self {
            pan: RollingWindow::new(pan_tilt),
            tilt: RollingWindow::new(pan_tilt),
            zoom_a: RollingWindow::new(zoom),
            zoom_b: RollingWindow::new(zoom),
        }
    }

    /// Route one classified sample to its channel's window.
    pub fn record(&mut self, sample: TelemetrySample) {
        self.window_mut(sample.channel).push(sample.value);
    }

    pub fn window(&self, channel: Channel) -> &RollingWindow {
        match channel {
            Channel::Pan => &self.pan,
            Channel::Tilt => &self.tilt,
            Channel::ZoomA => &self.zoom_a,
            Channel::ZoomB => &self.zoom_b,
        }
    }

    fn window_mut(&mut self, channel: Channel) -> &mut RollingWindow {
        match channel {
            Channel::Pan => &mut self.pan,
            Channel::Tilt => &mut self.tilt,
            Channel::ZoomA => &mut self.zoom_a,
            Channel::ZoomB => &mut self.zoom_b,
        }
    }

    /// Pan and tilt are evaluated jointly: both windows full and singleton.
    /// No relationship between the pan and tilt values is required.
    pub fn pan_tilt_stable(&self) -> bool {
        self.pan.is_full()
            && self.pan.is_singleton()
            && self.tilt.is_full()
            && self.tilt.is_singleton()
    }

    pub fn zoom_a_stable(&self) -> bool {
        self.zoom_a.is_full() && self.zoom_a.is_singleton()
    }

    pub fn zoom_b_stable(&self) -> bool {
        self.zoom_b.is_full() && self.zoom_b.is_singleton()
    }

    /// All group predicates evaluated against the same tracker state.
    pub fn all_stable(&self) -> bool {
        self.pan_tilt_stable() && self.zoom_a_stable() && self.zoom_b_stable()
    }
}

struct Inner {
    tracker: Mutex<TelemetryTracker>,
    changed: Notify,
}

/// Shared, lock-protected tracker with change notification.
///
/// All predicate reads take one snapshot under the lock, so a waiter can
/// never observe the three group predicates at different instants.
#[derive(Clone)]
pub struct StabilityMonitor {
    inner: Arc<Inner>,
}

impl StabilityMonitor {
    pub fn new(tracker: TelemetryTracker) -> Self {
        Self {
            inner: Arc::new(Inner {
                tracker: Mutex::new(tracker),
                changed: Notify::new(),
            }),
        }
    }

    /// Record one sample and wake any stability waiters.
    pub fn record(&self, sample: TelemetrySample) {
        self.inner.tracker.lock().unwrap().record(sample);
        self.inner.changed.notify_waiters();
    }

    /// Whether all channel groups are stable, as one atomic snapshot.
    pub fn is_stable(&self) -> bool {
        self.inner.tracker.lock().unwrap().all_stable()
    }

    /// Run a closure against a consistent snapshot of the tracker.
    pub fn with_tracker<R>(&self, f: impl FnOnce(&TelemetryTracker) -> R) -> R {
        f(&self.inner.tracker.lock().unwrap())
    }

    /// Block until all channel groups are simultaneously stable.
    ///
    /// Wakes on every recorded sample and additionally re-checks every
    /// `poll_interval` as a fallback. With `timeout` of `None` the wait is
    /// unbounded.
    pub async fn wait_for_stability(
        &self,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<(), StabilityTimeout> {
        let wait = async {
            loop {
                // The notified future is created before the check; a sample
                // recorded in the gap is caught at the next poll tick.
                let changed = self.inner.changed.notified();
                if self.is_stable() {
                    return;
                }
                tokio::select! {
                    _ = changed => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| StabilityTimeout(limit)),
            None => {
                wait.await;
                Ok(())
            }
        }
    }
}

// tests below here ---------------------
