//! Kernel sampler plumbing
//!
//! - eBPF program loading, map configuration and per-CPU attachment
//! - Stack trace map lookups
//! - CPU utilities
//! - Debug diagnostics

pub mod cpu_utils;
pub mod diagnostics;
pub mod ebpf_setup;
pub mod stack_reader;

pub use cpu_utils::online_cpus;
pub use diagnostics::{log_sampler_counters, SamplerCounters};
pub use ebpf_setup::{attach_sampler, configure_filters, init_ebpf_logger, load_ebpf_program};
pub use stack_reader::{push_frames, read_stack};
