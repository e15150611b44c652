//! Collaborator seams consumed by the orchestrator.
//!
//! The decision core performs no I/O; everything it needs from the
//! outside world arrives through these two traits. Implementations
//! own their transport, auth, and retry policy — a failure surfaces
//! here as a single typed error and costs the orchestrator one
//! skipped tick.

use std::future::Future;

use thiserror::Error;

use downshift_core::UtilizationSample;

/// Errors from the telemetry side.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry transport failure: {0}")]
    Transport(String),

    #[error("telemetry authorization failure: {0}")]
    Auth(String),
}

/// Errors from the capacity side.
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("capacity transport failure: {0}")]
    Transport(String),

    #[error("capacity change rejected: {0}")]
    Rejected(String),

    #[error("cluster {0} has no managed capacity policy")]
    NoPolicy(String),
}

/// Source of utilization readings for a cluster.
pub trait TelemetrySource {
    /// Utilization samples observed in `[since, until]` (epoch
    /// seconds). May return an empty set when no datapoints exist
    /// for the range; that is not an error.
    fn utilization(
        &self,
        cluster_id: &str,
        since: u64,
        until: u64,
    ) -> impl Future<Output = Result<Vec<UtilizationSample>, TelemetryError>> + Send;
}

/// Read/write access to a cluster's managed capacity.
pub trait CapacityController {
    /// Whether the cluster is in a state where scaling makes sense.
    fn is_active(&self, cluster_id: &str)
    -> impl Future<Output = Result<bool, CapacityError>> + Send;

    /// The capacity currently in effect.
    fn current_capacity(
        &self,
        cluster_id: &str,
    ) -> impl Future<Output = Result<u32, CapacityError>> + Send;

    /// The capacity recorded before any scale-down.
    fn original_capacity(
        &self,
        cluster_id: &str,
    ) -> impl Future<Output = Result<u32, CapacityError>> + Send;

    /// Apply a new capacity.
    fn set_capacity(
        &self,
        cluster_id: &str,
        target: u32,
    ) -> impl Future<Output = Result<(), CapacityError>> + Send;
}
