//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines data structures and constants shared between the kernel-side
//! sampler and userspace. All types use `#[repr(C)]` for consistent memory
//! layout across the kernel/userspace boundary.
//!
//! ## Key Types
//!
//! - [`SampleEvent`] - One stack sample passed via ring buffer
//!
//! ## Maps
//!
//! - `EVENTS` - Ring buffer carrying [`SampleEvent`]s
//! - `STACK_TRACES` - Deduplicated stack traces by ID
//! - `TARGET_PIDS` - Process filter (pid → 1)
//! - `CONFIG` - Runtime configuration, keyed by the `CONFIG_*` constants

#![no_std]

// ============================================================================
// Config Keys
// ============================================================================

/// `CONFIG` key: non-zero when only pids in `TARGET_PIDS` are sampled
pub const CONFIG_FILTER_PIDS: u32 = 0;

/// `CONFIG` key: non-zero when kernel frames are captured alongside user frames
pub const CONFIG_KERNEL_FRAMES: u32 = 1;

/// Maximum number of stack frames to capture
///
/// Kernel eBPF programs are limited to 127 frames due to verifier constraints.
/// Exceeding this limit will cause the eBPF program to fail verification.
pub const MAX_STACK_DEPTH: usize = 127;

/// Maximum number of processes accepted by the `TARGET_PIDS` filter
pub const MAX_TARGET_PIDS: u32 = 1024;

/// Stack id recorded when no stack was requested (kernel frames disabled)
pub const STACK_NOT_CAPTURED: i64 = i64::MIN;

// ============================================================================
// Stack Capture Flags
// ============================================================================

/// `BPF_F_USER_STACK`: walk the user-space stack instead of the kernel stack
pub const BPF_F_USER_STACK: u64 = 0x100;

/// `BPF_F_FAST_STACK_CMP`: compare stacks by hash only
pub const BPF_F_FAST_STACK_CMP: u64 = 0x200;

/// `BPF_F_REUSE_STACKID`: overwrite an existing bucket on hash collision
pub const BPF_F_REUSE_STACKID: u64 = 0x400;

/// Flags for capturing the user-space half of a sample
pub const USER_STACK_FLAGS: u64 = BPF_F_USER_STACK | BPF_F_FAST_STACK_CMP | BPF_F_REUSE_STACKID;

/// Flags for capturing the kernel half of a sample
pub const KERNEL_STACK_FLAGS: u64 = BPF_F_FAST_STACK_CMP | BPF_F_REUSE_STACKID;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// One stack sample sent from eBPF to userspace via ring buffer
///
/// The stacks themselves live in the `STACK_TRACES` map; the event only
/// carries their ids so the ring buffer stays small.
///
/// **Memory Layout**: `#[repr(C)]`, 40 bytes, 8-byte aligned
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct SampleEvent {
    /// Process ID (TGID in Linux terms)
    pub pid: u32,

    /// Thread ID (PID in Linux terms)
    pub tid: u32,

    /// Timestamp in nanoseconds (from `bpf_ktime_get_ns()`)
    pub timestamp_ns: u64,

    /// User-space stack id in `STACK_TRACES`
    ///
    /// Negative values are the raw error returned by `bpf_get_stackid()`.
    pub user_stack_id: i64,

    /// Kernel stack id in `STACK_TRACES`
    ///
    /// [`STACK_NOT_CAPTURED`] when kernel frames are disabled, otherwise a
    /// non-negative id or the raw (negative) error code.
    pub kernel_stack_id: i64,

    /// CPU the sample was taken on
    pub cpu_id: u32,

    /// Padding for 8-byte alignment
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 4],
}

impl SampleEvent {
    /// Whether the kernel half of the sample was requested
    #[must_use]
    pub fn wants_kernel_stack(&self) -> bool {
        self.kernel_stack_id != STACK_NOT_CAPTURED
    }
}

#[cfg(feature = "user")]
use aya::Pod;

// Pod trait ensures types can be safely transmitted as plain bytes
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for SampleEvent {}
