//! Structured error types for livestacks
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Only configuration and session setup can fail; everything past startup
//! degrades instead of erroring.

use super::types::Pid;
use thiserror::Error;

/// Invalid report or session parameters, detected before sampling starts
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Reporting interval must be greater than zero")]
    ZeroInterval,

    #[error("Unknown sample event '{0}' (expected one of: {known})", known = crate::session::SampleEvent::NAMES.join(", "))]
    UnknownEvent(String),

    #[error("Sampling frequency must be between 1 and {max} Hz, got {got}")]
    InvalidFrequency { got: u64, max: u64 },

    #[error("Too many processes to filter: {got} (at most {max})")]
    TooManyPids { got: usize, max: usize },

    #[error("Process {0} not found")]
    ProcessNotFound(Pid),
}

/// Failures while bringing up or running the trace session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to load eBPF program: {0}")]
    EbpfLoadFailed(String),

    #[error("eBPF map {0} not found")]
    MapNotFound(&'static str),

    #[error("eBPF program {0} not found")]
    ProgramNotFound(&'static str),

    #[error("Failed to attach sampler to CPU {cpu}: {error}")]
    AttachFailed { cpu: u32, error: String },

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Capture thread exited before reporting readiness")]
    CaptureThreadLost,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ebpf(#[from] aya::EbpfError),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),

    #[error(transparent)]
    Program(#[from] aya::programs::ProgramError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_not_found_display() {
        let err = ConfigError::ProcessNotFound(Pid(1234));
        assert_eq!(err.to_string(), "Process PID:1234 not found");
    }

    #[test]
    fn test_unknown_event_lists_known_names() {
        let err = ConfigError::UnknownEvent("kernel:profile".to_string());
        let msg = err.to_string();
        assert!(msg.contains("kernel:profile"));
        assert!(msg.contains("cpu-clock"));
        assert!(msg.contains("page-faults"));
    }

    #[test]
    fn test_config_error_converts_into_session_error() {
        let err: SessionError = ConfigError::ZeroInterval.into();
        assert!(matches!(err, SessionError::Config(ConfigError::ZeroInterval)));
        assert_eq!(err.to_string(), "Reporting interval must be greater than zero");
    }
}
