//! Kernel symbol lookup via `/proc/kallsyms`
//!
//! Kernel frames only show up when `--kernel-frames` is set. Without root
//! (or with `kptr_restrict`) every address in kallsyms reads as zero, in
//! which case the table is treated as empty and frames stay numeric.

use anyhow::{Context, Result};
use std::fs;

/// Start of the kernel half of the address space on 64-bit Linux
pub const KERNEL_SPACE_START: u64 = 0xffff_8000_0000_0000;

/// Whether `addr` belongs to the kernel rather than a user process
#[must_use]
pub fn is_kernel_address(addr: u64) -> bool {
    addr >= KERNEL_SPACE_START
}

/// Sorted kernel text symbols
#[derive(Debug, Default)]
pub struct KernelSymbols {
    symbols: Vec<(u64, String)>,
}

impl KernelSymbols {
    /// Read `/proc/kallsyms`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    pub fn load() -> Result<Self> {
        let content =
            fs::read_to_string("/proc/kallsyms").context("Failed to read /proc/kallsyms")?;
        Ok(Self::parse(&content))
    }

    /// Parse kallsyms content: "address type name [module]"
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut symbols: Vec<(u64, String)> = content
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let addr = u64::from_str_radix(parts.next()?, 16).ok()?;
                let kind = parts.next()?;
                let name = parts.next()?;
                let is_text = matches!(kind, "t" | "T" | "w" | "W");
                (addr != 0 && is_text).then(|| (addr, name.to_string()))
            })
            .collect();
        symbols.sort_unstable_by_key(|(addr, _)| *addr);
        Self { symbols }
    }

    /// Nearest symbol at or below `addr`, with the offset into it
    #[must_use]
    pub fn lookup(&self, addr: u64) -> Option<(&str, u64)> {
        let idx = self.symbols.partition_point(|(start, _)| *start <= addr);
        let (start, name) = self.symbols.get(idx.checked_sub(1)?)?;
        Some((name.as_str(), addr - start))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
