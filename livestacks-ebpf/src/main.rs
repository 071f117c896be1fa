//! # eBPF Kernel-Side Sampler
//!
//! A single `perf_event` program, attached to every online CPU, that captures
//! the user (and optionally kernel) call stack of whatever is running when the
//! sampling event fires.
//!
//! ## Maps (Shared with Userspace)
//!
//! - `EVENTS` - Ring buffer (4MB) of `SampleEvent`s
//! - `STACK_TRACES` - Deduplicated stack traces by ID
//! - `TARGET_PIDS` - Process filter, populated by userspace
//! - `CONFIG` - Runtime configuration (pid filter on/off, kernel frames on/off)
//!
//! ## Build
//!
//! Always compiled in release mode (debug includes incompatible formatting code):
//! ```bash
//! cargo xtask build-ebpf
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::{bpf_get_current_pid_tgid, bpf_get_smp_processor_id, bpf_ktime_get_ns},
    macros::{map, perf_event},
    maps::{HashMap, RingBuf, StackTrace},
    programs::PerfEventContext,
};
use aya_log_ebpf::warn;
use livestacks_common::{
    SampleEvent, CONFIG_FILTER_PIDS, CONFIG_KERNEL_FRAMES, KERNEL_STACK_FLAGS, MAX_TARGET_PIDS,
    STACK_NOT_CAPTURED, USER_STACK_FLAGS,
};

// ============================================================================
// eBPF Maps - Shared data structures between kernel and userspace
// ============================================================================

/// Ring buffer for sending samples to userspace
///
/// Sized for bursts: at 99 Hz on 64 CPUs a 100ms userspace poll needs
/// well under 1MB, the rest absorbs slow polls.
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(4 * 1024 * 1024, 0);

/// Stack trace map for storing deduplicated stack traces by ID
///
/// A full map causes `bpf_get_stackid` to fail (-ENOMEM) for every new
/// stack, which userspace counts as a stack failure.
#[map]
static STACK_TRACES: StackTrace = StackTrace::with_max_entries(16384, 0);

/// Map: Process ID (TGID) → 1
///
/// Only consulted when `CONFIG[CONFIG_FILTER_PIDS]` is non-zero.
#[map]
static TARGET_PIDS: HashMap<u32, u8> = HashMap::with_max_entries(MAX_TARGET_PIDS, 0);

/// Map: Config key → Config value
#[map]
static CONFIG: HashMap<u32, u64> = HashMap::with_max_entries(16, 0);

// ============================================================================
// Debug Counters
// ============================================================================

/// Total number of perf_event invocations
#[map]
static PERF_EVENT_COUNTER: HashMap<u32, u64> = HashMap::with_max_entries(1, 0);

/// Number of perf_events that passed the pid filter
#[map]
static PERF_EVENT_PASSED_PID_FILTER: HashMap<u32, u64> = HashMap::with_max_entries(1, 0);

/// Number of failed ring buffer writes (ring buffer full)
#[map]
static PERF_EVENT_OUTPUT_FAILED: HashMap<u32, u64> = HashMap::with_max_entries(1, 0);

// ============================================================================
// Program
// ============================================================================

#[perf_event]
pub fn on_cpu_sample(ctx: PerfEventContext) -> u32 {
    match try_on_cpu_sample(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_on_cpu_sample(ctx: &PerfEventContext) -> Result<(), i64> {
    bump(&PERF_EVENT_COUNTER);

    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let pid = (pid_tgid >> 32) as u32;
    let tid = pid_tgid as u32;

    // Idle task
    if pid == 0 {
        return Ok(());
    }

    if config(CONFIG_FILTER_PIDS) != 0 && unsafe { TARGET_PIDS.get(&pid).is_none() } {
        return Ok(());
    }

    bump(&PERF_EVENT_PASSED_PID_FILTER);

    // Preserve raw error codes so userspace can count failures
    let user_stack_id =
        unsafe { STACK_TRACES.get_stackid(ctx, USER_STACK_FLAGS).unwrap_or_else(|e| e) };
    let kernel_stack_id = if config(CONFIG_KERNEL_FRAMES) != 0 {
        unsafe { STACK_TRACES.get_stackid(ctx, KERNEL_STACK_FLAGS).unwrap_or_else(|e| e) }
    } else {
        STACK_NOT_CAPTURED
    };

    let event = SampleEvent {
        pid,
        tid,
        timestamp_ns: unsafe { bpf_ktime_get_ns() },
        user_stack_id,
        kernel_stack_id,
        cpu_id: unsafe { bpf_get_smp_processor_id() },
        _padding: [0u8; 4],
    };

    if unsafe { EVENTS.output(&event, 0) }.is_err() {
        bump(&PERF_EVENT_OUTPUT_FAILED);
        warn!(ctx, "ring buffer full, dropped sample of pid {}", pid);
        return Err(1);
    }

    Ok(())
}

fn config(key: u32) -> u64 {
    unsafe { CONFIG.get(&key).copied().unwrap_or(0) }
}

fn bump(counter: &HashMap<u32, u64>) {
    let key = 0u32;
    unsafe {
        let current = counter.get(&key).copied().unwrap_or(0);
        let _ = counter.insert(&key, &(current + 1), 0);
    }
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
