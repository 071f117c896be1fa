//! # eBPF trace session
//!
//! Owns the kernel sampler for the lifetime of a profiling run. All `aya`
//! objects live on a dedicated capture thread: it loads and attaches the
//! sampler, reports setup success or failure back to [`EbpfSession::start`],
//! then drains the ring buffer into a [`StackSink`] until the stop signal
//! fires. Dropping the `Ebpf` object on exit detaches every perf event.

use aya::maps::{MapData, RingBuf, StackTraceMap};
use aya::Ebpf;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use livestacks_common::{SampleEvent, MAX_STACK_DEPTH};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::config::SessionConfig;
use super::stop::StopSignal;
use crate::aggregation::StackSink;
use crate::domain::{Pid, SessionError, StackId};
use crate::profiling::{
    attach_sampler, configure_filters, init_ebpf_logger, load_ebpf_program, log_sampler_counters,
    read_stack,
};

/// How long the capture thread sleeps when the ring buffer is empty
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Totals collected by the capture thread
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    /// Samples pushed into the sink
    pub samples: u64,
    /// Samples whose user stack could not be read
    pub user_stack_failures: u64,
    /// Samples whose kernel stack was requested but could not be read
    pub kernel_stack_failures: u64,
    /// Samples with neither user nor kernel frames (not recorded)
    pub empty_samples: u64,
    /// Ring buffer records too short to be a sample
    pub malformed_events: u64,
}

impl CaptureStats {
    /// Fold one sample into the totals and return the frames to record
    ///
    /// Kernel frames come first, then user frames, both innermost first.
    /// Returns `false` when the sample carries no frames at all.
    fn collect<F>(&mut self, event: &SampleEvent, frames: &mut Vec<u64>, mut read: F) -> bool
    where
        F: FnMut(StackId, &mut Vec<u64>) -> bool,
    {
        frames.clear();
        if event.wants_kernel_stack() && !read(StackId(event.kernel_stack_id), frames) {
            self.kernel_stack_failures += 1;
        }
        if !read(StackId(event.user_stack_id), frames) {
            self.user_stack_failures += 1;
        }

        if frames.is_empty() {
            self.empty_samples += 1;
            return false;
        }
        self.samples += 1;
        true
    }
}

/// A trace session backed by the `livestacks-ebpf` sampler
pub struct EbpfSession {
    config: SessionConfig,
    stop: StopSignal,
    handle: Option<JoinHandle<CaptureStats>>,
    started: bool,
}

impl EbpfSession {
    #[must_use]
    pub fn new(config: SessionConfig, stop: StopSignal) -> Self {
        Self { config, stop, handle: None, started: false }
    }

    /// Start capturing into `sink`
    ///
    /// Blocks until the sampler is attached on every CPU (or setup failed).
    /// When called from within a tokio runtime, eBPF-side logs are forwarded
    /// through that runtime.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyStarted`] on a second call
    /// - any load, map or attach failure from the capture thread
    pub fn start(&mut self, sink: Arc<dyn StackSink>) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::AlreadyStarted);
        }
        self.started = true;

        let (ready_tx, ready_rx) = bounded(1);
        let config = self.config.clone();
        let stop = self.stop.clone();
        let runtime = tokio::runtime::Handle::try_current().ok();

        let handle = thread::Builder::new().name("livestacks-capture".to_string()).spawn(
            move || {
                let _guard = runtime.as_ref().map(tokio::runtime::Handle::enter);
                capture_thread(&config, sink.as_ref(), &stop, &ready_tx)
            },
        )?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SessionError::CaptureThreadLost)
            }
        }
    }

    /// Request the capture thread to stop
    ///
    /// Idempotent and callable from any thread holding the session's
    /// [`StopSignal`]. Returns whether this call performed the stop.
    pub fn stop(&self) -> bool {
        self.stop.stop()
    }

    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Wait for the capture thread to finish
    ///
    /// Does not stop the session by itself. Returns default stats if the
    /// session never started.
    pub fn join(&mut self) -> CaptureStats {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                warn!("Capture thread panicked");
                CaptureStats::default()
            }
            None => CaptureStats::default(),
        }
    }
}

impl Drop for EbpfSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop.stop();
            self.join();
        }
    }
}

struct Capture {
    bpf: Ebpf,
    ring_buf: RingBuf<MapData>,
    stack_traces: StackTraceMap<MapData>,
}

impl Capture {
    fn setup(config: &SessionConfig) -> Result<Self, SessionError> {
        let mut bpf = load_ebpf_program()?;
        init_ebpf_logger(&mut bpf);
        configure_filters(&mut bpf, config)?;

        let ring_buf =
            RingBuf::try_from(bpf.take_map("EVENTS").ok_or(SessionError::MapNotFound("EVENTS"))?)?;
        let stack_traces = StackTraceMap::try_from(
            bpf.take_map("STACK_TRACES").ok_or(SessionError::MapNotFound("STACK_TRACES"))?,
        )?;

        attach_sampler(&mut bpf, config)?;
        Ok(Self { bpf, ring_buf, stack_traces })
    }

    fn run(&mut self, sink: &dyn StackSink, stop: &StopSignal) -> CaptureStats {
        let stop_rx = stop.receiver();
        let mut stats = CaptureStats::default();
        let mut frames = Vec::with_capacity(2 * MAX_STACK_DEPTH);

        loop {
            while let Some(item) = self.ring_buf.next() {
                let bytes: &[u8] = &item;
                if bytes.len() < std::mem::size_of::<SampleEvent>() {
                    stats.malformed_events += 1;
                    continue;
                }

                // SAFETY: length checked above; the sampler writes SampleEvent records
                #[allow(unsafe_code)]
                let event =
                    unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<SampleEvent>()) };

                let stack_traces = &self.stack_traces;
                if stats.collect(&event, &mut frames, |id, out| read_stack(stack_traces, id, out)) {
                    sink.record(Pid(event.pid), &frames);
                }
            }

            match stop_rx.recv_timeout(POLL_INTERVAL) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        log_sampler_counters(&self.bpf);
        stats
    }
}

fn capture_thread(
    config: &SessionConfig,
    sink: &dyn StackSink,
    stop: &StopSignal,
    ready: &Sender<Result<(), SessionError>>,
) -> CaptureStats {
    let mut capture = match Capture::setup(config) {
        Ok(capture) => capture,
        Err(e) => {
            let _ = ready.send(Err(e));
            return CaptureStats::default();
        }
    };
    if ready.send(Ok(())).is_err() {
        return CaptureStats::default();
    }

    info!("Capture started ({} at {} Hz)", config.event, config.frequency_hz);
    let stats = capture.run(sink, stop);
    debug!("Capture stopped: {stats:?}");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use livestacks_common::STACK_NOT_CAPTURED;
    use std::collections::HashMap;

    fn event(user: i64, kernel: i64) -> SampleEvent {
        SampleEvent {
            pid: 42,
            tid: 42,
            timestamp_ns: 0,
            user_stack_id: user,
            kernel_stack_id: kernel,
            cpu_id: 0,
            _padding: [0; 4],
        }
    }

    fn reader(stacks: &HashMap<i64, Vec<u64>>) -> impl FnMut(StackId, &mut Vec<u64>) -> bool + '_ {
        |id, out| match stacks.get(&id.0) {
            Some(frames) if id.is_valid() => {
                out.extend_from_slice(frames);
                true
            }
            _ => false,
        }
    }

    #[test]
    fn test_kernel_frames_precede_user_frames() {
        let stacks = HashMap::from([(1, vec![0x4010, 0x4020]), (2, vec![0xffff_ffff_8100_0010])]);
        let mut stats = CaptureStats::default();
        let mut frames = Vec::new();

        assert!(stats.collect(&event(1, 2), &mut frames, reader(&stacks)));
        assert_eq!(frames, vec![0xffff_ffff_8100_0010, 0x4010, 0x4020]);
        assert_eq!(stats.samples, 1);
    }

    #[test]
    fn test_kernel_stack_not_requested() {
        let stacks = HashMap::from([(1, vec![0x4010])]);
        let mut stats = CaptureStats::default();
        let mut frames = vec![0xdead];

        assert!(stats.collect(&event(1, STACK_NOT_CAPTURED), &mut frames, reader(&stacks)));
        assert_eq!(frames, vec![0x4010]);
        assert_eq!(stats.kernel_stack_failures, 0);
    }

    #[test]
    fn test_failures_are_counted() {
        // Kernel thread: no user stack, kernel stack present
        let stacks = HashMap::from([(2, vec![0xffff_ffff_8100_0010])]);
        let mut stats = CaptureStats::default();
        let mut frames = Vec::new();

        assert!(stats.collect(&event(-14, 2), &mut frames, reader(&stacks)));
        assert_eq!(stats.user_stack_failures, 1);

        assert!(!stats.collect(&event(-14, -17), &mut frames, reader(&stacks)));
        assert_eq!(stats.user_stack_failures, 2);
        assert_eq!(stats.kernel_stack_failures, 1);
        assert_eq!(stats.empty_samples, 1);
        assert_eq!(stats.samples, 1);
    }

    #[test]
    fn test_join_without_start() {
        let mut session = EbpfSession::new(
            SessionConfig::new(crate::session::SampleEvent::CpuClock, Vec::new(), false, 99)
                .unwrap(),
            StopSignal::new(),
        );
        assert!(session.stop());
        assert!(!session.stop());
        assert_eq!(session.join(), CaptureStats::default());
    }
}
