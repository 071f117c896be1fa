//! Periodic top-K reports
//!
//! - `config`: interval, K, budget and layout
//! - `render`: normal and folded stack formats
//! - `reporting_loop`: the non-overlapping timer loop

pub mod config;
pub mod render;
pub mod reporting_loop;

pub use config::{OutputMode, ReportBudget, ReportConfig};
pub use render::{write_folded, write_normal};
pub use reporting_loop::{LoopPhase, LoopStats, ReportingLoop, TickOutcome};
