//! Trace session: the kernel sampler feeding the aggregator
//!
//! - [`SessionConfig`] / [`SampleEvent`]: what to sample and where
//! - [`EbpfSession`]: capture thread lifecycle
//! - [`StopSignal`]: shared, idempotent shutdown

pub mod capture;
pub mod config;
pub mod stop;

pub use capture::{CaptureStats, EbpfSession};
pub use config::{SampleEvent, SessionConfig, MAX_FREQUENCY_HZ};
pub use stop::StopSignal;
