//! downshift-engine — the scaling decision core.
//!
//! Pure CPU-only logic: a bounded sample window and a set of stateless
//! functions that turn a utilization series plus parameters into a
//! scale-down/restore decision and a target capacity.
//!
//! # Architecture
//!
//! ```text
//! SampleWindow                      decision::*
//!   ├── append() ← one per tick       ├── weighted_average()
//!   ├── samples() → &[sample] ──────▶ ├── should_scale_down()
//!   └── FIFO eviction at capacity     ├── should_restore_capacity()
//!                                     ├── calculate_target_capacity()
//!                                     └── scaling_summary()
//! ```
//!
//! Nothing here performs I/O, logs, or retains state between calls;
//! the orchestrator owns the window and derives diagnostics from
//! `scaling_summary`.

pub mod decision;
pub mod window;

pub use decision::{NEAR_ZERO_UTILIZATION, SCALE_DOWN_WEIGHT_FRACTION};
pub use window::SampleWindow;
