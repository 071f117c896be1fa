//! Newtype wrappers for the identifiers that cross module boundaries

use std::fmt;

/// Process ID (TGID in kernel terms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Stack trace id from the kernel's `STACK_TRACES` map
///
/// Negative values carry the error returned by `bpf_get_stackid()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackId(pub i64);

impl StackId {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }

    /// Key into the stack trace map (only meaningful when valid)
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn as_map_key(&self) -> u32 {
        self.0 as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_id_validity() {
        assert!(StackId(0).is_valid());
        assert!(StackId(42).is_valid());
        assert!(!StackId(-14).is_valid());
        assert_eq!(StackId(42).as_map_key(), 42);
    }

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
    }
}
