//! Trace session parameters

use std::fmt;
use std::str::FromStr;

use livestacks_common::MAX_TARGET_PIDS;

use crate::domain::{ConfigError, Pid};
use crate::process_lookup::process_exists;

/// Upper bound on the sampling frequency (kernel default for
/// `perf_event_max_sample_rate`)
pub const MAX_FREQUENCY_HZ: u64 = 100_000;

/// The perf event whose overflow triggers a stack sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleEvent {
    /// Wall-clock CPU timer (on-CPU profiling)
    #[default]
    CpuClock,
    /// Per-task CPU timer
    TaskClock,
    /// Hardware CPU cycles
    CpuCycles,
    /// Retired instructions
    Instructions,
    /// Last-level cache misses
    CacheMisses,
    /// Page faults
    PageFaults,
    /// Context switches (where threads go off-CPU)
    ContextSwitches,
}

impl SampleEvent {
    /// Accepted names, in the order they are listed in help and errors
    pub const NAMES: &'static [&'static str] = &[
        "cpu-clock",
        "task-clock",
        "cpu-cycles",
        "instructions",
        "cache-misses",
        "page-faults",
        "context-switches",
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CpuClock => "cpu-clock",
            Self::TaskClock => "task-clock",
            Self::CpuCycles => "cpu-cycles",
            Self::Instructions => "instructions",
            Self::CacheMisses => "cache-misses",
            Self::PageFaults => "page-faults",
            Self::ContextSwitches => "context-switches",
        }
    }
}

impl FromStr for SampleEvent {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu-clock" => Ok(Self::CpuClock),
            "task-clock" => Ok(Self::TaskClock),
            "cpu-cycles" | "cycles" => Ok(Self::CpuCycles),
            "instructions" => Ok(Self::Instructions),
            "cache-misses" => Ok(Self::CacheMisses),
            "page-faults" | "faults" => Ok(Self::PageFaults),
            "context-switches" | "cs" => Ok(Self::ContextSwitches),
            _ => Err(ConfigError::UnknownEvent(s.to_string())),
        }
    }
}

impl fmt::Display for SampleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the trace session needs to start capturing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub event: SampleEvent,
    /// Processes to sample; empty means every process
    pub pids: Vec<Pid>,
    pub include_kernel_frames: bool,
    pub frequency_hz: u64,
}

impl SessionConfig {
    /// Validate and build a session configuration
    ///
    /// Duplicate pids are collapsed.
    ///
    /// # Errors
    /// - frequency outside `1..=MAX_FREQUENCY_HZ`
    /// - more pids than the kernel-side filter holds
    /// - a pid that doesn't exist
    pub fn new(
        event: SampleEvent,
        mut pids: Vec<Pid>,
        include_kernel_frames: bool,
        frequency_hz: u64,
    ) -> Result<Self, ConfigError> {
        if !(1..=MAX_FREQUENCY_HZ).contains(&frequency_hz) {
            return Err(ConfigError::InvalidFrequency { got: frequency_hz, max: MAX_FREQUENCY_HZ });
        }

        pids.sort_unstable();
        pids.dedup();

        let max = MAX_TARGET_PIDS as usize;
        if pids.len() > max {
            return Err(ConfigError::TooManyPids { got: pids.len(), max });
        }

        if let Some(missing) = pids.iter().find(|pid| !process_exists(**pid)) {
            return Err(ConfigError::ProcessNotFound(*missing));
        }

        Ok(Self { event, pids, include_kernel_frames, frequency_hz })
    }

    /// Whether the kernel-side pid filter is active
    #[must_use]
    pub fn filters_pids(&self) -> bool {
        !self.pids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_listed_name() {
        for name in SampleEvent::NAMES {
            let event: SampleEvent = name.parse().expect("listed name parses");
            assert_eq!(event.name(), *name);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("cycles".parse::<SampleEvent>(), Ok(SampleEvent::CpuCycles));
        assert_eq!("cs".parse::<SampleEvent>(), Ok(SampleEvent::ContextSwitches));
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(
            "invalid-event-name".parse::<SampleEvent>(),
            Err(ConfigError::UnknownEvent("invalid-event-name".to_string()))
        );
    }

    #[test]
    fn test_config_dedups_pids() {
        let me = Pid(std::process::id());
        let config = SessionConfig::new(SampleEvent::CpuClock, vec![me, me], false, 99).unwrap();
        assert_eq!(config.pids, vec![me]);
        assert!(config.filters_pids());
    }

    #[test]
    fn test_config_without_pids_samples_everything() {
        let config = SessionConfig::new(SampleEvent::default(), Vec::new(), true, 99).unwrap();
        assert!(!config.filters_pids());
        assert!(config.include_kernel_frames);
    }

    #[test]
    fn test_config_rejects_bad_frequency() {
        assert_eq!(
            SessionConfig::new(SampleEvent::CpuClock, Vec::new(), false, 0),
            Err(ConfigError::InvalidFrequency { got: 0, max: MAX_FREQUENCY_HZ })
        );
        assert!(SessionConfig::new(SampleEvent::CpuClock, Vec::new(), false, 1_000_000).is_err());
    }

    #[test]
    fn test_config_rejects_missing_process() {
        let gone = Pid(u32::MAX - 1);
        assert_eq!(
            SessionConfig::new(SampleEvent::CpuClock, vec![gone], false, 99),
            Err(ConfigError::ProcessNotFound(gone))
        );
    }
}
