//! The scaling orchestrator — tick sequence and state machine.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use downshift_core::{ScalingParameters, ScalingSummary, ScalingVerdict, Settings};
use downshift_engine::{SampleWindow, decision};

use crate::collaborators::{CapacityController, TelemetrySource};

/// How far back each tick queries telemetry, in sampling intervals.
/// Two intervals tolerate one missed datapoint at the source.
const TELEMETRY_LOOKBACK_INTERVALS: u64 = 2;

/// Scaling state of the managed cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingMode {
    /// Capacity is at its original value.
    Normal,
    /// Capacity has been trimmed; watching for a restore trigger.
    ScaledDown,
}

/// Single active decision-maker for one cluster.
///
/// Owns the sample window; the engine sees a read-only view per tick
/// and keeps nothing. One tick runs to completion before the next is
/// scheduled, so window, mode, and parameters are never touched
/// concurrently.
pub struct ScalingOrchestrator<T, C> {
    telemetry: T,
    capacity: C,
    settings: Settings,
    window: SampleWindow,
    mode: ScalingMode,
    ticks: u64,
    /// Emit a status summary every this many ticks (roughly hourly).
    status_every: u64,
    /// Delivers re-validated parameter sets to the run loop.
    reload: Option<watch::Receiver<ScalingParameters>>,
}

impl<T: TelemetrySource, C: CapacityController> ScalingOrchestrator<T, C> {
    pub fn new(settings: Settings, telemetry: T, capacity: C) -> Self {
        let window = SampleWindow::new(settings.parameters.history_periods);
        let interval_secs = settings.sampling_interval.as_secs().max(1);
        Self {
            telemetry,
            capacity,
            settings,
            window,
            mode: ScalingMode::Normal,
            ticks: 0,
            status_every: (3600 / interval_secs).max(1),
            reload: None,
        }
    }

    /// Set the channel that feeds re-validated parameter sets into
    /// the run loop. Each value received is swapped in wholesale
    /// between ticks via [`Self::replace_parameters`].
    pub fn with_reload(mut self, reload: watch::Receiver<ScalingParameters>) -> Self {
        self.reload = Some(reload);
        self
    }

    pub fn mode(&self) -> ScalingMode {
        self.mode
    }

    /// Decision factors for the current window.
    pub fn summary(&self) -> ScalingSummary {
        decision::scaling_summary(self.window.samples(), &self.settings.parameters)
    }

    /// Swap in a reloaded parameter set.
    ///
    /// The whole value is replaced at once, between ticks; a tick
    /// never observes a mix of old and new fields. The window is
    /// resized to the new retention limit.
    pub fn replace_parameters(&mut self, parameters: ScalingParameters) {
        self.window.set_capacity(parameters.history_periods);
        info!(
            low = parameters.low_threshold,
            high = parameters.high_threshold,
            target = parameters.target_utilization,
            "scaling parameters replaced"
        );
        self.settings.parameters = parameters;
    }

    /// Run one poll tick: fetch, append, decide, apply.
    ///
    /// A collaborator failure propagates as an error; the run loop
    /// logs it and skips to the next tick with the window unchanged.
    pub async fn tick(&mut self) -> anyhow::Result<ScalingVerdict> {
        self.ticks += 1;
        let cluster_id = self.settings.cluster_id.clone();

        if !self.capacity.is_active(&cluster_id).await? {
            warn!(%cluster_id, "cluster not active, skipping tick");
            return Ok(ScalingVerdict::NoAction);
        }

        let now = epoch_secs();
        let lookback = TELEMETRY_LOOKBACK_INTERVALS * self.settings.sampling_interval.as_secs();
        let samples = self
            .telemetry
            .utilization(&cluster_id, now.saturating_sub(lookback), now)
            .await?;

        // Latest reading wins; equal timestamps resolve to the last
        // delivered.
        let Some(reading) = samples.into_iter().max_by_key(|s| s.epoch) else {
            warn!(%cluster_id, "no telemetry datapoints, skipping tick");
            return Ok(ScalingVerdict::NoAction);
        };

        self.window.append(reading);
        debug!(
            %cluster_id,
            utilization = reading.utilization,
            window = self.window.len(),
            "sample recorded"
        );

        let verdict = match self.mode {
            ScalingMode::ScaledDown => self.consider_restore(&cluster_id, reading.utilization).await?,
            ScalingMode::Normal => self.consider_scale_down(&cluster_id, reading.utilization).await?,
        };

        if self.ticks % self.status_every == 0 {
            self.log_status(&cluster_id);
        }

        Ok(verdict)
    }

    async fn consider_restore(
        &mut self,
        cluster_id: &str,
        current_utilization: f64,
    ) -> anyhow::Result<ScalingVerdict> {
        if !decision::should_restore_capacity(current_utilization, &self.settings.parameters) {
            return Ok(ScalingVerdict::NoAction);
        }

        let original = self.capacity.original_capacity(cluster_id).await?;
        self.capacity.set_capacity(cluster_id, original).await?;
        self.mode = ScalingMode::Normal;
        info!(
            %cluster_id,
            utilization = current_utilization,
            capacity = original,
            "high utilization, original capacity restored"
        );
        Ok(ScalingVerdict::Restore)
    }

    async fn consider_scale_down(
        &mut self,
        cluster_id: &str,
        current_utilization: f64,
    ) -> anyhow::Result<ScalingVerdict> {
        let params = &self.settings.parameters;
        if !decision::should_scale_down(self.window.samples(), params) {
            return Ok(ScalingVerdict::NoAction);
        }

        let current = self.capacity.current_capacity(cluster_id).await?;
        let target = decision::calculate_target_capacity(current_utilization, current, params);

        if target >= current {
            info!(
                %cluster_id,
                target,
                current,
                "computed target does not reduce capacity, holding"
            );
            return Ok(ScalingVerdict::NoAction);
        }

        self.capacity.set_capacity(cluster_id, target).await?;
        self.mode = ScalingMode::ScaledDown;
        info!(
            %cluster_id,
            from = current,
            to = target,
            utilization = current_utilization,
            "low utilization, capacity scaled down"
        );
        Ok(ScalingVerdict::ScaleDown {
            target_capacity: target,
        })
    }

    /// Restore original capacity if the cluster is still scaled down.
    /// Called by `run` on the way out; safe to call when `Normal`.
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        if self.mode != ScalingMode::ScaledDown {
            return Ok(());
        }
        let cluster_id = self.settings.cluster_id.clone();
        let original = self.capacity.original_capacity(&cluster_id).await?;
        self.capacity.set_capacity(&cluster_id, original).await?;
        self.mode = ScalingMode::Normal;
        info!(%cluster_id, capacity = original, "capacity restored on shutdown");
        Ok(())
    }

    /// Run the polling loop until the shutdown signal flips.
    ///
    /// A parameter set arriving on the reload channel is applied
    /// between ticks; a tick never sees a half-swapped configuration.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            cluster_id = %self.settings.cluster_id,
            interval_secs = interval.as_secs(),
            "orchestrator started"
        );
        let mut reload = self.reload.take();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "tick failed, skipping");
                    }
                }
                changed = reload_signal(&mut reload) => {
                    if changed {
                        if let Some(rx) = reload.as_mut() {
                            let parameters = rx.borrow_and_update().clone();
                            self.replace_parameters(parameters);
                        }
                    } else {
                        // Sender side is gone; stop watching.
                        reload = None;
                    }
                }
                _ = shutdown.changed() => {
                    info!("orchestrator shutting down");
                    if let Err(e) = self.shutdown().await {
                        tracing::error!(error = %e, "failed to restore capacity on shutdown");
                    }
                    break;
                }
            }
        }
    }

    fn log_status(&self, cluster_id: &str) {
        let summary = self.summary();
        info!(
            %cluster_id,
            mode = ?self.mode,
            samples = summary.sample_count,
            avg = summary.avg_utilization,
            weighted_avg = summary.weighted_avg,
            below_threshold = summary.below_threshold_count,
            weighted_below = summary.weighted_below_count,
            would_scale_down = summary.should_scale_down,
            "status"
        );
    }
}

/// Resolves when a reloaded parameter set arrives; pends forever when
/// no reload channel is wired in, so the select branch stays quiet.
async fn reload_signal(reload: &mut Option<watch::Receiver<ScalingParameters>>) -> bool {
    match reload {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedCluster;
    use downshift_core::ScalingParameters;

    fn settings() -> Settings {
        Settings {
            cluster_id: "c-test".to_string(),
            sampling_interval: Duration::from_secs(300),
            parameters: ScalingParameters {
                low_threshold: 0.4,
                high_threshold: 0.8,
                target_utilization: 0.6,
                decay_factor: 0.9,
                threshold_periods: 4,
                history_periods: 6,
                min_capacity: 1,
            },
        }
    }

    fn orchestrator(
        sim: &SimulatedCluster,
    ) -> ScalingOrchestrator<SimulatedCluster, SimulatedCluster> {
        ScalingOrchestrator::new(settings(), sim.clone(), sim.clone())
    }

    #[tokio::test]
    async fn cold_start_needs_threshold_periods_samples() {
        let sim = SimulatedCluster::new(20);
        sim.extend_feed([0.1, 0.1, 0.1]);
        let mut orch = orchestrator(&sim);

        for _ in 0..3 {
            assert_eq!(orch.tick().await.unwrap(), ScalingVerdict::NoAction);
        }
        assert_eq!(orch.mode(), ScalingMode::Normal);
        assert!(sim.capacity_changes().is_empty());
    }

    #[tokio::test]
    async fn scales_down_then_restores() {
        let sim = SimulatedCluster::new(20);
        sim.extend_feed([0.3, 0.3, 0.3, 0.3]);
        let mut orch = orchestrator(&sim);

        let mut last = ScalingVerdict::NoAction;
        for _ in 0..4 {
            last = orch.tick().await.unwrap();
        }
        // 20 × (0.3 / 0.6) = 10.
        assert_eq!(last, ScalingVerdict::ScaleDown { target_capacity: 10 });
        assert_eq!(orch.mode(), ScalingMode::ScaledDown);
        assert_eq!(sim.current_capacity(), 10);

        // Still scaled down on a quiet reading, restores on a hot one.
        sim.extend_feed([0.5, 0.9]);
        assert_eq!(orch.tick().await.unwrap(), ScalingVerdict::NoAction);
        assert_eq!(orch.tick().await.unwrap(), ScalingVerdict::Restore);
        assert_eq!(orch.mode(), ScalingMode::Normal);
        assert_eq!(sim.current_capacity(), 20);
    }

    #[tokio::test]
    async fn holds_when_target_does_not_reduce_capacity() {
        let sim = SimulatedCluster::new(2);
        // Below the 0.4 threshold, but 2 × (0.39 / 0.4) rounds back
        // to 2.
        sim.extend_feed([0.39, 0.39, 0.39, 0.39]);

        let mut s = settings();
        s.parameters.target_utilization = 0.4;
        let mut orch = ScalingOrchestrator::new(s, sim.clone(), sim.clone());

        for _ in 0..4 {
            assert_eq!(orch.tick().await.unwrap(), ScalingVerdict::NoAction);
        }
        assert_eq!(orch.mode(), ScalingMode::Normal);
        assert!(sim.capacity_changes().is_empty());
    }

    #[tokio::test]
    async fn telemetry_failure_skips_the_tick() {
        let sim = SimulatedCluster::new(20);
        sim.fail_next_telemetry();
        sim.extend_feed([0.3]);
        let mut orch = orchestrator(&sim);

        assert!(orch.tick().await.is_err());
        assert_eq!(orch.summary().sample_count, 0);

        // Next tick proceeds normally.
        assert_eq!(orch.tick().await.unwrap(), ScalingVerdict::NoAction);
        assert_eq!(orch.summary().sample_count, 1);
    }

    #[tokio::test]
    async fn inactive_cluster_records_nothing() {
        let sim = SimulatedCluster::new(20);
        sim.set_active(false);
        sim.extend_feed([0.3]);
        let mut orch = orchestrator(&sim);

        assert_eq!(orch.tick().await.unwrap(), ScalingVerdict::NoAction);
        assert_eq!(orch.summary().sample_count, 0);
    }

    #[tokio::test]
    async fn empty_telemetry_range_is_not_an_error() {
        let sim = SimulatedCluster::new(20);
        let mut orch = orchestrator(&sim);

        assert_eq!(orch.tick().await.unwrap(), ScalingVerdict::NoAction);
        assert_eq!(orch.summary().sample_count, 0);
    }

    #[tokio::test]
    async fn shutdown_restores_original_capacity() {
        let sim = SimulatedCluster::new(20);
        sim.extend_feed([0.3, 0.3, 0.3, 0.3]);
        let mut orch = orchestrator(&sim);
        for _ in 0..4 {
            orch.tick().await.unwrap();
        }
        assert_eq!(sim.current_capacity(), 10);

        orch.shutdown().await.unwrap();
        assert_eq!(sim.current_capacity(), 20);
        assert_eq!(orch.mode(), ScalingMode::Normal);

        // Idempotent from Normal.
        orch.shutdown().await.unwrap();
        assert_eq!(sim.current_capacity(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn run_applies_parameters_reloaded_mid_flight() {
        let sim = SimulatedCluster::new(20);
        sim.extend_feed([0.45; 8]);

        let (reload_tx, reload_rx) = watch::channel(settings().parameters);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut orch = orchestrator(&sim).with_reload(reload_rx);

        let handle = tokio::spawn(async move {
            orch.run(Duration::from_secs(300), shutdown_rx).await;
            orch
        });

        // Drain the scripted feed: 0.45 never qualifies under the
        // shipped 0.4 threshold, so capacity stays put.
        tokio::time::sleep(Duration::from_secs(3000)).await;
        assert!(sim.capacity_changes().is_empty());

        // Raise the low threshold on the live loop; the swap lands
        // between ticks.
        let mut raised = settings().parameters;
        raised.low_threshold = 0.5;
        reload_tx.send(raised).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The same load now qualifies: 20 × (0.45 / 0.6) = 15.
        sim.extend_feed([0.45]);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(sim.current_capacity(), 15);
        assert_eq!(sim.capacity_changes(), vec![15]);

        // Shutdown restores the original capacity from ScaledDown.
        shutdown_tx.send(true).unwrap();
        let orch = handle.await.unwrap();
        assert_eq!(orch.mode(), ScalingMode::Normal);
        assert_eq!(sim.current_capacity(), 20);
    }

    #[tokio::test]
    async fn parameter_swap_resizes_the_window() {
        let sim = SimulatedCluster::new(20);
        sim.extend_feed([0.5, 0.5, 0.5, 0.5, 0.5, 0.5]);
        let mut orch = orchestrator(&sim);
        for _ in 0..6 {
            orch.tick().await.unwrap();
        }
        assert_eq!(orch.summary().sample_count, 6);

        let mut p = settings().parameters;
        p.history_periods = 3;
        p.threshold_periods = 3;
        orch.replace_parameters(p);
        assert_eq!(orch.summary().sample_count, 3);
    }
}
