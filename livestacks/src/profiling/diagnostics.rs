use aya::maps::HashMap;
use aya::Ebpf;
use log::{info, warn};

/// Counters maintained by the kernel-side sampler
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SamplerCounters {
    /// Times the `perf_event` handler ran
    pub invocations: u64,
    /// Samples that passed the pid filter
    pub passed_filter: u64,
    /// Samples lost because the ring buffer was full
    pub output_failed: u64,
}

impl SamplerCounters {
    /// Read the counters; a missing or empty map reads as zero
    #[must_use]
    pub fn read(bpf: &Ebpf) -> Self {
        Self {
            invocations: read_counter(bpf, "PERF_EVENT_COUNTER"),
            passed_filter: read_counter(bpf, "PERF_EVENT_PASSED_PID_FILTER"),
            output_failed: read_counter(bpf, "PERF_EVENT_OUTPUT_FAILED"),
        }
    }
}

fn read_counter(bpf: &Ebpf, name: &str) -> u64 {
    let Some(map) = bpf.map(name) else {
        return 0;
    };
    HashMap::<_, u32, u64>::try_from(map).ok().and_then(|m| m.get(&0u32, 0).ok()).unwrap_or(0)
}

/// Log the sampler's debug counters
///
/// Called once on shutdown to help debug event flow.
pub fn log_sampler_counters(bpf: &Ebpf) {
    let counters = SamplerCounters::read(bpf);
    info!(
        "perf_event handler called {} times, {} passed pid filter",
        counters.invocations, counters.passed_filter
    );
    if counters.output_failed > 0 {
        warn!("{} samples dropped (ring buffer full)", counters.output_failed);
    }
}
