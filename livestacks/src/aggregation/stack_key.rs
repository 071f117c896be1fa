//! Identity and counts of a distinct call stack

use std::cmp::Ordering;

use crate::domain::Pid;

/// A distinct stack shape: process plus ordered instruction addresses
///
/// Addresses are stored innermost frame first, the order in which the
/// kernel stack walker reports them. Two samples are the same key when
/// pid, length, addresses and order all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackKey {
    pub pid: Pid,
    pub addresses: Box<[u64]>,
}

impl StackKey {
    #[must_use]
    pub fn new(pid: Pid, addresses: impl Into<Box<[u64]>>) -> Self {
        Self { pid, addresses: addresses.into() }
    }
}

/// Ascending pid, then lexicographic address order
impl Ord for StackKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pid.cmp(&other.pid).then_with(|| self.addresses.cmp(&other.addresses))
    }
}

impl PartialOrd for StackKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A stack and how many times it was observed in one window
///
/// Always an owned copy; callers never see the live table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedStack {
    pub key: StackKey,
    pub count: u64,
}

impl AggregatedStack {
    #[must_use]
    pub fn pid(&self) -> Pid {
        self.key.pid
    }

    #[must_use]
    pub fn addresses(&self) -> &[u64] {
        &self.key.addresses
    }
}

/// Report order: higher counts first, ties by ascending key
///
/// `Greater` means "ranks ahead", so a max-heap or a descending sort puts
/// the hottest stack first.
impl Ord for AggregatedStack {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count.cmp(&other.count).then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for AggregatedStack {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(pid: u32, addrs: &[u64], count: u64) -> AggregatedStack {
        AggregatedStack { key: StackKey::new(Pid(pid), addrs), count }
    }

    #[test]
    fn test_key_equality_requires_same_order() {
        assert_eq!(StackKey::new(Pid(1), [1, 2]), StackKey::new(Pid(1), [1, 2]));
        assert_ne!(StackKey::new(Pid(1), [1, 2]), StackKey::new(Pid(1), [2, 1]));
        assert_ne!(StackKey::new(Pid(1), [1, 2]), StackKey::new(Pid(2), [1, 2]));
        assert_ne!(StackKey::new(Pid(1), [1]), StackKey::new(Pid(1), [1, 0]));
    }

    #[test]
    fn test_higher_count_ranks_ahead() {
        assert!(stack(9, &[9], 5) > stack(1, &[1], 3));
    }

    #[test]
    fn test_ties_rank_lower_key_ahead() {
        assert!(stack(1, &[0x10], 4) > stack(2, &[0x01], 4));
        assert!(stack(1, &[0x01, 0x02], 4) > stack(1, &[0x01, 0x03], 4));
        assert!(stack(1, &[0x01], 4) > stack(1, &[0x01, 0x00], 4));
    }
}
