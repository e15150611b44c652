//! In-memory simulated cluster.
//!
//! Implements both collaborator seams against a scripted utilization
//! feed and plain capacity bookkeeping, so the full loop can run in
//! dry-run mode and in tests without touching a real cluster.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use downshift_core::UtilizationSample;

use crate::collaborators::{CapacityController, CapacityError, TelemetryError, TelemetrySource};

struct SimState {
    feed: VecDeque<f64>,
    last_served: Option<f64>,
    /// When the feed runs dry, keep serving the last value instead
    /// of an empty range. Used by long-running dry runs.
    repeat_last: bool,
    original_capacity: u32,
    current_capacity: u32,
    active: bool,
    fail_next_telemetry: bool,
    reject_capacity_changes: bool,
    capacity_log: Vec<u32>,
}

/// Simulated cluster shared across the two collaborator seams.
///
/// `Clone` shares the underlying state, so a test can keep a handle
/// for assertions after handing clones to the orchestrator.
#[derive(Clone)]
pub struct SimulatedCluster {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedCluster {
    pub fn new(original_capacity: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                feed: VecDeque::new(),
                last_served: None,
                repeat_last: false,
                original_capacity,
                current_capacity: original_capacity,
                active: true,
                fail_next_telemetry: false,
                reject_capacity_changes: false,
                capacity_log: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue utilization readings, one per tick.
    pub fn extend_feed(&self, values: impl IntoIterator<Item = f64>) {
        self.state().feed.extend(values);
    }

    /// Keep serving the final feed value once the script runs out.
    pub fn repeat_last(self) -> Self {
        self.state().repeat_last = true;
        self
    }

    pub fn set_active(&self, active: bool) {
        self.state().active = active;
    }

    /// Make the next telemetry call fail with a transport error.
    pub fn fail_next_telemetry(&self) {
        self.state().fail_next_telemetry = true;
    }

    /// Make every capacity change fail until cleared.
    pub fn reject_capacity_changes(&self, reject: bool) {
        self.state().reject_capacity_changes = reject;
    }

    pub fn current_capacity(&self) -> u32 {
        self.state().current_capacity
    }

    /// Every capacity value applied so far, in order.
    pub fn capacity_changes(&self) -> Vec<u32> {
        self.state().capacity_log.clone()
    }
}

impl TelemetrySource for SimulatedCluster {
    async fn utilization(
        &self,
        _cluster_id: &str,
        _since: u64,
        until: u64,
    ) -> Result<Vec<UtilizationSample>, TelemetryError> {
        let mut state = self.state();
        if state.fail_next_telemetry {
            state.fail_next_telemetry = false;
            return Err(TelemetryError::Transport("injected failure".to_string()));
        }

        let value = match state.feed.pop_front() {
            Some(v) => Some(v),
            None if state.repeat_last => state.last_served,
            None => None,
        };
        Ok(match value {
            Some(v) => {
                state.last_served = Some(v);
                vec![UtilizationSample::new(until, v)]
            }
            None => Vec::new(),
        })
    }
}

impl CapacityController for SimulatedCluster {
    async fn is_active(&self, _cluster_id: &str) -> Result<bool, CapacityError> {
        Ok(self.state().active)
    }

    async fn current_capacity(&self, _cluster_id: &str) -> Result<u32, CapacityError> {
        Ok(self.state().current_capacity)
    }

    async fn original_capacity(&self, _cluster_id: &str) -> Result<u32, CapacityError> {
        Ok(self.state().original_capacity)
    }

    async fn set_capacity(&self, cluster_id: &str, target: u32) -> Result<(), CapacityError> {
        let mut state = self.state();
        if state.reject_capacity_changes {
            return Err(CapacityError::Rejected(format!(
                "capacity changes disabled for {cluster_id}"
            )));
        }
        state.current_capacity = target;
        state.capacity_log.push(target);
        Ok(())
    }
}
