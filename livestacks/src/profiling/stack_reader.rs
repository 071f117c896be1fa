//! Stack trace lookup in the kernel's `STACK_TRACES` map

use aya::maps::{MapData, StackTraceMap};
use log::trace;
use std::borrow::Borrow;

use crate::domain::StackId;

/// Append the frames of `stack_id` to `out`, innermost first
///
/// Returns `false` when the id carries a capture error or the entry has
/// already been evicted from the map.
pub fn read_stack<T: Borrow<MapData>>(
    stack_traces: &StackTraceMap<T>,
    stack_id: StackId,
    out: &mut Vec<u64>,
) -> bool {
    if !stack_id.is_valid() {
        return false;
    }

    match stack_traces.get(&stack_id.as_map_key(), 0) {
        Ok(stack_trace) => {
            push_frames(out, stack_trace.frames().iter().map(|frame| frame.ip));
            true
        }
        Err(e) => {
            trace!("Stack {} not readable: {e}", stack_id.0);
            false
        }
    }
}

/// Append instruction pointers up to the first null frame
pub fn push_frames(out: &mut Vec<u64>, ips: impl IntoIterator<Item = u64>) {
    out.extend(ips.into_iter().take_while(|&ip| ip != 0));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_frames_stops_at_null() {
        let mut out = vec![0xffff_ffff_8100_0000];
        push_frames(&mut out, [0x4010, 0x4020, 0, 0x4030]);
        assert_eq!(out, vec![0xffff_ffff_8100_0000, 0x4010, 0x4020]);
    }

    #[test]
    fn test_push_frames_empty() {
        let mut out = Vec::new();
        push_frames(&mut out, [0, 0x4010]);
        assert!(out.is_empty());
    }
}
