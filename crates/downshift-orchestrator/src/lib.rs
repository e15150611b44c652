//! downshift-orchestrator — drives the scaling loop.
//!
//! Owns the sample window and the `Normal ⇄ ScaledDown` state
//! machine. Each tick pulls one utilization reading through the
//! `TelemetrySource` seam, appends it, asks the engine for a verdict,
//! and applies it through the `CapacityController` seam.
//!
//! # Architecture
//!
//! ```text
//! ScalingOrchestrator<T, C>
//!   ├── tick()     ← fetch → append → decide → apply
//!   ├── run()      ← interval loop with shutdown watch
//!   └── shutdown() ← restores capacity if still scaled down
//!
//! SimulatedCluster
//!   └── in-memory TelemetrySource + CapacityController for
//!       dry runs and tests
//! ```

pub mod collaborators;
pub mod orchestrator;
pub mod sim;

pub use collaborators::{CapacityController, CapacityError, TelemetryError, TelemetrySource};
pub use orchestrator::{ScalingMode, ScalingOrchestrator};
pub use sim::SimulatedCluster;
