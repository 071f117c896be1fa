//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled sampler and attaches it to one perf event per CPU.
//!
//! ## Functions
//!
//! - [`load_ebpf_program()`] - Load eBPF bytecode from embedded binary
//! - [`configure_filters()`] - Write the pid filter and kernel-frame flag
//! - [`attach_sampler()`] - Attach `on_cpu_sample` to every online CPU

use aya::{
    include_bytes_aligned,
    maps::HashMap,
    programs::{
        perf_event::{perf_hw_id, perf_sw_ids, PerfEventScope, PerfTypeId, SamplePolicy},
        PerfEvent,
    },
    Ebpf,
};
use aya_log::EbpfLogger;
use livestacks_common::{CONFIG_FILTER_PIDS, CONFIG_KERNEL_FRAMES};
use log::{debug, info};

use crate::domain::SessionError;
use crate::profiling::online_cpus;
use crate::session::{SampleEvent, SessionConfig};

const SAMPLER_PROGRAM: &str = "on_cpu_sample";

/// Load the eBPF program binary
///
/// Always uses the release build because debug builds pull in formatting
/// code that's incompatible with BPF.
///
/// # Errors
/// Returns an error if the eBPF program binary cannot be loaded
pub fn load_ebpf_program() -> Result<Ebpf, SessionError> {
    Ebpf::load(include_bytes_aligned!("../../../target/bpfel-unknown-none/release/livestacks"))
        .map_err(|e| SessionError::EbpfLoadFailed(e.to_string()))
}

/// Initialize eBPF logger
///
/// The logger forwards from a tokio task, so this is a no-op outside a
/// runtime context.
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if tokio::runtime::Handle::try_current().is_err() {
        debug!("No tokio runtime, eBPF log forwarding disabled");
        return;
    }
    if let Err(e) = EbpfLogger::init(bpf) {
        debug!("eBPF logger unavailable: {e}");
    }
}

/// Perf type and config value for a sample event
#[must_use]
pub fn perf_event_type(event: SampleEvent) -> (PerfTypeId, u64) {
    match event {
        SampleEvent::CpuClock => {
            (PerfTypeId::Software, perf_sw_ids::PERF_COUNT_SW_CPU_CLOCK as u64)
        }
        SampleEvent::TaskClock => {
            (PerfTypeId::Software, perf_sw_ids::PERF_COUNT_SW_TASK_CLOCK as u64)
        }
        SampleEvent::PageFaults => {
            (PerfTypeId::Software, perf_sw_ids::PERF_COUNT_SW_PAGE_FAULTS as u64)
        }
        SampleEvent::ContextSwitches => {
            (PerfTypeId::Software, perf_sw_ids::PERF_COUNT_SW_CONTEXT_SWITCHES as u64)
        }
        SampleEvent::CpuCycles => {
            (PerfTypeId::Hardware, perf_hw_id::PERF_COUNT_HW_CPU_CYCLES as u64)
        }
        SampleEvent::Instructions => {
            (PerfTypeId::Hardware, perf_hw_id::PERF_COUNT_HW_INSTRUCTIONS as u64)
        }
        SampleEvent::CacheMisses => {
            (PerfTypeId::Hardware, perf_hw_id::PERF_COUNT_HW_CACHE_MISSES as u64)
        }
    }
}

/// Write the session's pid filter and kernel-frame flag into the maps
///
/// Must run before the sampler is attached, otherwise the first samples
/// ignore the filter.
///
/// # Errors
/// Returns an error if a map is missing or an insert fails
pub fn configure_filters(bpf: &mut Ebpf, config: &SessionConfig) -> Result<(), SessionError> {
    let mut target_pids: HashMap<_, u32, u8> =
        HashMap::try_from(bpf.map_mut("TARGET_PIDS").ok_or(SessionError::MapNotFound("TARGET_PIDS"))?)?;
    for pid in &config.pids {
        target_pids.insert(pid.0, 1, 0)?;
    }

    let mut config_map: HashMap<_, u32, u64> =
        HashMap::try_from(bpf.map_mut("CONFIG").ok_or(SessionError::MapNotFound("CONFIG"))?)?;
    config_map.insert(CONFIG_FILTER_PIDS, u64::from(config.filters_pids()), 0)?;
    config_map.insert(CONFIG_KERNEL_FRAMES, u64::from(config.include_kernel_frames), 0)?;

    if config.filters_pids() {
        info!("✓ Filtering for {} process(es)", config.pids.len());
    } else {
        info!("✓ Sampling all processes");
    }
    Ok(())
}

/// Attach the sampler to every online CPU
///
/// Returns the number of CPUs attached.
///
/// # Errors
/// Returns an error if the program is missing, fails to load, or any CPU
/// refuses the perf event (e.g. hardware counters in a VM)
pub fn attach_sampler(bpf: &mut Ebpf, config: &SessionConfig) -> Result<usize, SessionError> {
    let program: &mut PerfEvent = bpf
        .program_mut(SAMPLER_PROGRAM)
        .ok_or(SessionError::ProgramNotFound(SAMPLER_PROGRAM))?
        .try_into()?;
    program.load()?;

    let cpus = online_cpus().map_err(|e| SessionError::Io(std::io::Error::other(format!("{e:#}"))))?;
    let (perf_type, perf_config) = perf_event_type(config.event);

    for &cpu in &cpus {
        program
            .attach(
                perf_type.clone(),
                perf_config,
                PerfEventScope::AllProcessesOneCpu { cpu },
                SamplePolicy::Frequency(config.frequency_hz),
                false,
            )
            .map_err(|e| SessionError::AttachFailed { cpu, error: e.to_string() })?;
    }

    info!(
        "✓ Attached {} sampler to {} CPUs at {} Hz",
        config.event,
        cpus.len(),
        config.frequency_hz
    );
    Ok(cpus.len())
}
