//! # Periodic reporting loop
//!
//! Every interval the loop drains the aggregator's top stacks, resolves
//! and prints them. At most one tick body runs at any time: the tick state
//! sits behind a `Mutex` taken with `try_lock`, so a tick requested while
//! another is in flight is skipped rather than queued.
//!
//! ## Phases
//!
//! ```text
//! Idle ──run()──▶ Armed ──tick──▶ Ticking ──▶ Armed ──▶ ...
//!                   │                │
//!                   └──── stop ──────┴──▶ Stopped
//! ```
//!
//! A stop that lands during a tick takes effect once that tick has finished
//! rendering. The invocation budget is decremented inside the tick, and the
//! tick that exhausts it fires the stop signal itself.

use chrono::Local;
use crossbeam_channel::select;
use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;
use log::{debug, info, warn};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::config::{OutputMode, ReportConfig};
use super::render::{write_folded, write_normal};
use crate::aggregation::StackAggregator;
use crate::domain::ConfigError;
use crate::session::StopSignal;
use crate::symbolization::SymbolResolver;

/// Result of a single [`ReportingLoop::tick`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A report was printed
    Reported,
    /// Another tick was in flight
    Skipped,
    /// The loop is stopped; nothing was printed
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopPhase {
    Idle = 0,
    Armed = 1,
    Ticking = 2,
    Stopped = 3,
}

impl LoopPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Armed,
            2 => Self::Ticking,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub reported: u64,
    pub skipped: u64,
}

/// Everything a tick mutates; owned by whoever holds the tick lock
struct TickState {
    resolver: Box<dyn SymbolResolver>,
    out: Box<dyn Write + Send>,
    /// Reports left, `None` when unbounded
    remaining: Option<u32>,
}

pub struct ReportingLoop {
    aggregator: Arc<StackAggregator>,
    config: ReportConfig,
    stop: StopSignal,
    state: Mutex<TickState>,
    phase: AtomicU8,
    reported: AtomicU64,
    skipped: AtomicU64,
}

impl ReportingLoop {
    /// # Errors
    /// Returns an error if `config` is invalid
    pub fn new(
        aggregator: Arc<StackAggregator>,
        resolver: impl SymbolResolver + 'static,
        config: ReportConfig,
        stop: StopSignal,
        out: impl Write + Send + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let remaining = config.budget.remaining();
        Ok(Self {
            aggregator,
            config,
            stop,
            state: Mutex::new(TickState {
                resolver: Box::new(resolver),
                out: Box::new(out),
                remaining,
            }),
            phase: AtomicU8::new(LoopPhase::Idle as u8),
            reported: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn phase(&self) -> LoopPhase {
        LoopPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn stats(&self) -> LoopStats {
        LoopStats {
            reported: self.reported.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    fn set_phase(&self, phase: LoopPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Run one report unless another one is in flight or the loop is stopped
    pub fn tick(&self) -> TickOutcome {
        if self.stop.is_stopped() {
            self.set_phase(LoopPhase::Stopped);
            return TickOutcome::Stopped;
        }

        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                debug!("Tick skipped, previous report still running");
                return TickOutcome::Skipped;
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        // Stop landed while we were waiting for the lock
        if self.stop.is_stopped() {
            self.set_phase(LoopPhase::Stopped);
            return TickOutcome::Stopped;
        }

        self.set_phase(LoopPhase::Ticking);

        if let Err(e) = self.report(&mut state) {
            warn!("Failed to write report, stopping: {e}");
            self.set_phase(LoopPhase::Stopped);
            self.stop.stop();
            return TickOutcome::Stopped;
        }
        self.reported.fetch_add(1, Ordering::Relaxed);

        if let Some(remaining) = state.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                info!("Report budget exhausted, stopping");
                self.set_phase(LoopPhase::Stopped);
                self.stop.stop();
                return TickOutcome::Reported;
            }
        }

        let next = if self.stop.is_stopped() { LoopPhase::Stopped } else { LoopPhase::Armed };
        self.set_phase(next);
        TickOutcome::Reported
    }

    fn report(&self, state: &mut TickState) -> io::Result<()> {
        let started = Instant::now();
        let TickState { resolver, out, .. } = state;

        if self.config.clear_screen {
            out.queue(Clear(ClearType::All))?.queue(MoveTo(0, 0))?;
        }
        if self.config.mode == OutputMode::Normal {
            writeln!(out, "{}", Local::now().format("%H:%M:%S"))?;
        }

        let stacks = self.aggregator.drain_top(self.config.top_stacks);
        for stack in &stacks {
            let process_name = resolver.process_name(stack.pid());
            let symbols = resolver.resolve(stack.pid(), stack.addresses());
            match self.config.mode {
                OutputMode::Normal => write_normal(out, stack, &process_name, &symbols)?,
                OutputMode::Folded => write_folded(out, stack, &process_name, &symbols)?,
            }
        }

        if self.config.mode == OutputMode::Normal {
            writeln!(out, "  Time aggregating/resolving: {}ms", started.elapsed().as_millis())?;
        }
        out.flush()
    }

    /// Tick every interval until stopped
    ///
    /// Returns immediately if the stop signal has already fired.
    pub fn run(&self) -> LoopStats {
        if self.stop.is_stopped() {
            self.set_phase(LoopPhase::Stopped);
            return self.stats();
        }
        self.set_phase(LoopPhase::Armed);

        let ticker = crossbeam_channel::tick(self.config.interval);
        let stop_rx = self.stop.receiver();
        loop {
            select! {
                recv(ticker) -> _ => {
                    if self.tick() == TickOutcome::Stopped {
                        break;
                    }
                }
                recv(stop_rx) -> _ => break,
            }
        }

        // Waits out a tick still running on another thread
        drop(self.state.lock());
        self.set_phase(LoopPhase::Stopped);
        self.stats()
    }

    /// Run the loop on a dedicated thread
    ///
    /// # Errors
    /// Returns an error if the thread can't be spawned
    pub fn spawn(self: Arc<Self>) -> io::Result<JoinHandle<LoopStats>> {
        thread::Builder::new().name("livestacks-report".to_string()).spawn(move || self.run())
    }
}
