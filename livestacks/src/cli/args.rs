//! CLI argument definitions

use clap::Parser;
use std::time::Duration;

use crate::domain::{ConfigError, Pid};
use crate::reporting::{OutputMode, ReportBudget, ReportConfig};
use crate::session::{SampleEvent, SessionConfig};

#[derive(Parser, Debug)]
#[command(
    name = "livestacks",
    version,
    about = "Live top-N call stacks, sampled with eBPF",
    after_help = "\
EXAMPLES:
    sudo livestacks                              Hottest stacks system-wide every 5s
    sudo livestacks -p 1234 -i 1 -T 5            Top 5 stacks of one process every second
    sudo livestacks -p 1234 -f -c 6 > out.folded Six folded windows for a flame graph
    sudo livestacks -e page-faults -k            Where page faults come from, with kernel frames"
)]
pub struct Args {
    /// Seconds between reports
    #[arg(short, long, value_name = "SECS", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Stacks printed per report
    #[arg(short = 'T', long, value_name = "K", default_value_t = 10)]
    pub top: usize,

    /// Stop after N reports (default: run until Ctrl+C)
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub count: Option<u32>,

    /// Sampling event: cpu-clock, task-clock, cpu-cycles, instructions,
    /// cache-misses, page-faults, context-switches
    #[arg(short, long, value_name = "NAME", default_value = "cpu-clock")]
    pub event: String,

    /// Only sample these processes (repeatable; default: all processes)
    #[arg(short, long = "pid", value_name = "PID")]
    pub pids: Vec<u32>,

    /// Include kernel frames in the stacks
    #[arg(short, long)]
    pub kernel_frames: bool,

    /// Print folded stacks (flame-graph input) instead of blocks
    #[arg(short, long)]
    pub folded: bool,

    /// Clear the screen before each report
    #[arg(short = 'C', long)]
    pub clear: bool,

    /// Sampling frequency per CPU
    #[arg(short = 'F', long, value_name = "HZ", default_value_t = 99)]
    pub frequency: u64,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn target_pids(&self) -> Vec<Pid> {
        self.pids.iter().copied().map(Pid).collect()
    }

    /// # Errors
    /// Returns an error for a zero interval
    pub fn report_config(&self) -> Result<ReportConfig, ConfigError> {
        let config = ReportConfig {
            interval: Duration::from_secs(self.interval),
            top_stacks: self.top,
            budget: ReportBudget::from_count(self.count),
            mode: if self.folded { OutputMode::Folded } else { OutputMode::Normal },
            clear_screen: self.clear,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error for an unknown event, a bad frequency or a missing pid
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        SessionConfig::new(
            self.event.parse::<SampleEvent>()?,
            self.target_pids(),
            self.kernel_frames,
            self.frequency,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("livestacks").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let report = args.report_config().unwrap();
        assert_eq!(report.interval, Duration::from_secs(5));
        assert_eq!(report.top_stacks, 10);
        assert_eq!(report.budget, ReportBudget::Unbounded);
        assert_eq!(report.mode, OutputMode::Normal);
        assert!(!report.clear_screen);

        let session = args.session_config().unwrap();
        assert_eq!(session.event, SampleEvent::CpuClock);
        assert!(session.pids.is_empty());
        assert_eq!(session.frequency_hz, 99);
    }

    #[test]
    fn test_short_flags() {
        let me = std::process::id().to_string();
        let args = parse(&["-i", "2", "-T", "3", "-c", "4", "-p", &me, "-k", "-f", "-C", "-q"]);
        let report = args.report_config().unwrap();
        assert_eq!(report.interval, Duration::from_secs(2));
        assert_eq!(report.top_stacks, 3);
        assert_eq!(report.budget.remaining(), Some(4));
        assert_eq!(report.mode, OutputMode::Folded);
        assert!(report.clear_screen);
        assert!(args.quiet);

        let session = args.session_config().unwrap();
        assert_eq!(session.pids, vec![Pid(std::process::id())]);
        assert!(session.include_kernel_frames);
    }

    #[test]
    fn test_repeated_pids() {
        let args = parse(&["-p", "1", "--pid", "2"]);
        assert_eq!(args.target_pids(), vec![Pid(1), Pid(2)]);
    }

    #[test]
    fn test_rejects_zero_interval_and_count() {
        let argv = |extra: &[&'static str]| {
            Args::try_parse_from(std::iter::once("livestacks").chain(extra.iter().copied()))
        };
        assert!(argv(&["-i", "0"]).is_err());
        assert!(argv(&["-c", "0"]).is_err());
    }

    #[test]
    fn test_unknown_event_is_config_error() {
        let args = parse(&["-e", "bogus"]);
        assert_eq!(
            args.session_config().unwrap_err(),
            ConfigError::UnknownEvent("bogus".to_string())
        );
    }
}
