//! downshift-core — shared types for the downshift capacity trimmer.
//!
//! Holds the domain types (utilization samples, scaling parameters,
//! verdicts, summaries), the TOML configuration loader, and the
//! configuration error taxonomy. No I/O beyond reading the config file,
//! no async, no policy — the decision logic lives in `downshift-engine`.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DownshiftConfig, Settings};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
