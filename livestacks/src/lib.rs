//! # livestacks - live top-N call stacks via eBPF
//!
//! livestacks samples the call stacks of running processes with a per-CPU
//! perf event and prints, every interval, the stacks that were seen most
//! often in that interval. Each report covers exactly one window: counts are
//! reset at every report.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  eBPF sampler (livestacks-ebpf)                 │
//! │   perf_event on every CPU → stack ids → EVENTS ring buffer     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ SampleEvent { pid, user/kernel stack id }
//!                         ▼
//! ┌──────────────┐  record(pid, &[addr])  ┌──────────────────┐
//! │  EbpfSession │───────────────────────▶│ StackAggregator  │
//! │ (capture thr)│                        │ (sharded window) │
//! └──────────────┘                        └────────┬─────────┘
//!                                                  │ drain_top(K)
//!                                                  ▼
//!                 ┌──────────────┐        ┌──────────────────┐
//!                 │ ProcResolver │◀───────│  ReportingLoop   │──▶ stdout
//!                 │ (DWARF, ELF, │resolve │ (timer thread)   │
//!                 │  kallsyms)   │        └──────────────────┘
//!                 └──────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`aggregation`]: concurrent per-window stack counting with atomic drain
//! - [`reporting`]: the non-overlapping timer loop and the two output formats
//! - [`session`]: eBPF trace session, its configuration and the stop signal
//! - [`profiling`]: eBPF loading, map setup, per-CPU attachment
//! - [`symbolization`]: addresses to `module!function`
//! - [`cli`]: command-line arguments
//! - [`domain`]: identifiers and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! # Top 10 stacks system-wide, every 5 seconds
//! sudo livestacks
//!
//! # Folded output of one process for 30 seconds, ready for flamegraph.pl
//! sudo livestacks -p 1234 -f -i 30 -c 1 > app.folded
//! ```

pub mod aggregation;
pub mod cli;
pub mod domain;
pub mod preflight;
pub mod process_lookup;
pub mod profiling;
pub mod reporting;
pub mod session;
pub mod symbolization;
