//! Reporting parameters, fixed for the lifetime of the loop

use std::num::NonZeroU32;
use std::time::Duration;

use crate::domain::ConfigError;

/// How many reports to print before stopping the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportBudget {
    /// Report until stopped externally
    #[default]
    Unbounded,
    /// Stop after exactly this many reports
    Limited(NonZeroU32),
}

impl ReportBudget {
    /// `None` and `Some(0)` both mean unbounded
    #[must_use]
    pub fn from_count(count: Option<u32>) -> Self {
        count.and_then(NonZeroU32::new).map_or(Self::Unbounded, Self::Limited)
    }

    /// Reports left before the stop fires, `None` when unbounded
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        match self {
            Self::Unbounded => None,
            Self::Limited(n) => Some(n.get()),
        }
    }
}

/// Report layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Timestamped blocks, one frame per line
    #[default]
    Normal,
    /// One `name (pid);root;...;leaf count` line per stack
    Folded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Time between two reports
    pub interval: Duration,
    /// Stacks printed per report; 0 drains and prints nothing
    pub top_stacks: usize,
    pub budget: ReportBudget,
    pub mode: OutputMode,
    /// Clear the terminal before each report
    pub clear_screen: bool,
}

impl ReportConfig {
    /// # Errors
    /// Returns [`ConfigError::ZeroInterval`] for a zero interval
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            top_stacks: 10,
            budget: ReportBudget::Unbounded,
            mode: OutputMode::Normal,
            clear_screen: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_from_count() {
        assert_eq!(ReportBudget::from_count(None), ReportBudget::Unbounded);
        assert_eq!(ReportBudget::from_count(Some(0)), ReportBudget::Unbounded);
        assert_eq!(ReportBudget::from_count(Some(3)).remaining(), Some(3));
        assert_eq!(ReportBudget::Unbounded.remaining(), None);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = ReportConfig { interval: Duration::ZERO, ..ReportConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));
        assert!(ReportConfig::default().validate().is_ok());
    }
}
