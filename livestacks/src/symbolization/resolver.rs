//! Process-aware symbol resolution
//!
//! [`SymbolResolver`] is the seam the reporting loop depends on.
//! [`ProcResolver`] implements it for live Linux processes on top of
//! `/proc/<pid>/maps`, per-module [`Symbolizer`]s and `/proc/kallsyms`.
//!
//! Resolution never fails: anything that cannot be resolved degrades to a
//! `module!0x<offset>` or raw `0x<address>` placeholder so one bad frame or
//! one exited process never drops a stack from the report.

use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::kallsyms::{is_kernel_address, KernelSymbols};
use super::memory_maps::ProcessModules;
use super::symbolizer::Symbolizer;
use crate::domain::Pid;
use crate::process_lookup::process_name;

/// Display name for processes whose name can no longer be read
pub const UNKNOWN_PROCESS: &str = "<unknown>";

/// Module name shown for kernel frames
pub const KERNEL_MODULE: &str = "kernel";

/// Cached processes before the cache is reset (pids are recycled)
const MAX_CACHED_PROCESSES: usize = 4096;

/// Minimum time between two reloads of the same process's maps
const MAPS_RELOAD_INTERVAL: Duration = Duration::from_secs(1);

/// A resolved frame, ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Runtime address as captured
    pub address: u64,
    /// Module file name (`libc.so.6`, `myapp`, `kernel`)
    pub module: Option<String>,
    /// Demangled function name
    pub function: Option<String>,
    /// Address relative to the module's load base
    pub offset: u64,
}

impl Symbol {
    /// A frame nothing is known about
    #[must_use]
    pub fn unresolved(address: u64) -> Self {
        Self { address, module: None, function: None, offset: address }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.module, &self.function) {
            (Some(module), Some(function)) => write!(f, "{module}!{function}"),
            (Some(module), None) => write!(f, "{module}!0x{:x}", self.offset),
            (None, Some(function)) => f.write_str(function),
            (None, None) => write!(f, "0x{:x}", self.address),
        }
    }
}

/// Maps raw addresses of a process to displayable symbols
///
/// Implementations may cache internally; callers treat them as stateless.
pub trait SymbolResolver: Send {
    /// Display name of a process
    fn process_name(&mut self, pid: Pid) -> String;

    /// Resolve every address of a stack, preserving order
    fn resolve(&mut self, pid: Pid, addresses: &[u64]) -> Vec<Symbol>;
}

struct ProcessEntry {
    name: Option<String>,
    modules: ProcessModules,
    loaded_at: Instant,
}

impl ProcessEntry {
    fn load(pid: Pid) -> Self {
        let modules = ProcessModules::load(pid).unwrap_or_else(|e| {
            debug!("No memory maps for {pid}: {e}");
            ProcessModules::default()
        });
        Self { name: process_name(pid), modules, loaded_at: Instant::now() }
    }
}

/// [`SymbolResolver`] for live processes on the local machine
#[derive(Default)]
pub struct ProcResolver {
    processes: HashMap<Pid, ProcessEntry>,
    /// `None` records a module that failed to load so it isn't retried
    modules: HashMap<Arc<str>, Option<Symbolizer>>,
    kernel: Option<KernelSymbols>,
}

impl ProcResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, pid: Pid) -> &mut ProcessEntry {
        if self.processes.len() >= MAX_CACHED_PROCESSES && !self.processes.contains_key(&pid) {
            debug!("Process cache full, resetting");
            self.processes.clear();
        }
        self.processes.entry(pid).or_insert_with(|| ProcessEntry::load(pid))
    }

    fn resolve_user(&mut self, pid: Pid, addr: u64) -> Symbol {
        let entry = self.entry(pid);
        let mut mapping = entry.modules.find(addr).cloned();

        // Library loaded after we last read the maps
        if mapping.is_none() && entry.loaded_at.elapsed() >= MAPS_RELOAD_INTERVAL {
            *entry = ProcessEntry::load(pid);
            mapping = entry.modules.find(addr).cloned();
        }

        let Some(mapping) = mapping else {
            return Symbol::unresolved(addr);
        };

        let relative = mapping.relative(addr);
        let function = self.symbolizer(&mapping.path).and_then(|symbolizer| {
            let probe = symbolizer.probe_address(addr, relative);
            symbolizer.resolve(probe).function().map(str::to_string)
        });

        Symbol { address: addr, module: Some(mapping.name().to_string()), function, offset: relative }
    }

    fn resolve_kernel(&mut self, addr: u64) -> Symbol {
        let kernel = self.kernel.get_or_insert_with(|| {
            KernelSymbols::load().unwrap_or_else(|e| {
                warn!("Kernel frames will not be symbolized: {e}");
                KernelSymbols::default()
            })
        });

        match kernel.lookup(addr) {
            Some((name, offset)) => Symbol {
                address: addr,
                module: Some(KERNEL_MODULE.to_string()),
                function: Some(name.to_string()),
                offset,
            },
            None => Symbol::unresolved(addr),
        }
    }

    fn symbolizer(&mut self, path: &Arc<str>) -> Option<&mut Symbolizer> {
        self.modules
            .entry(Arc::clone(path))
            .or_insert_with(|| match Symbolizer::new(&**path) {
                Ok(symbolizer) => Some(symbolizer),
                Err(e) => {
                    warn!("Failed to load symbols for {path}: {e:#}");
                    None
                }
            })
            .as_mut()
    }
}

impl SymbolResolver for ProcResolver {
    fn process_name(&mut self, pid: Pid) -> String {
        self.entry(pid).name.clone().unwrap_or_else(|| UNKNOWN_PROCESS.to_string())
    }

    fn resolve(&mut self, pid: Pid, addresses: &[u64]) -> Vec<Symbol> {
        addresses
            .iter()
            .map(|&addr| {
                if is_kernel_address(addr) {
                    self.resolve_kernel(addr)
                } else {
                    self.resolve_user(pid, addr)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_display_forms() {
        let full = Symbol {
            address: 0x5581_d6a0_3456,
            module: Some("myapp".to_string()),
            function: Some("myapp::main".to_string()),
            offset: 0x3456,
        };
        assert_eq!(full.to_string(), "myapp!myapp::main");

        let module_only = Symbol { function: None, ..full.clone() };
        assert_eq!(module_only.to_string(), "myapp!0x3456");

        assert_eq!(Symbol::unresolved(0xdead_beef).to_string(), "0xdeadbeef");
    }

    #[test]
    fn test_resolve_preserves_order_and_length() {
        let mut resolver = ProcResolver::new();
        let pid = Pid(std::process::id());
        let addresses = [0x10, 0x20, 0x30];

        let symbols = resolver.resolve(pid, &addresses);
        let resolved: Vec<u64> = symbols.iter().map(|s| s.address).collect();
        assert_eq!(resolved, addresses);
    }

    #[test]
    fn test_resolve_own_function() {
        let mut resolver = ProcResolver::new();
        let pid = Pid(std::process::id());
        let addr = test_resolve_own_function as usize as u64;

        let symbols = resolver.resolve(pid, &[addr]);
        assert_eq!(symbols.len(), 1);
        assert!(symbols[0].module.is_some(), "test binary mapping not found: {:?}", symbols[0]);
    }

    #[test]
    fn test_exited_process_degrades_to_placeholders() {
        let mut resolver = ProcResolver::new();
        // Above the default pid_max of 4194304
        let pid = Pid(u32::MAX - 1);

        assert_eq!(resolver.process_name(pid), UNKNOWN_PROCESS);
        let symbols = resolver.resolve(pid, &[0x4010]);
        assert_eq!(symbols, vec![Symbol::unresolved(0x4010)]);
    }
}
