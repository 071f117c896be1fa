//! Memory mapping utilities for process address space analysis
//!
//! This module parses /proc/pid/maps into the executable, file-backed
//! modules of a process and their load base, which is what turns a runtime
//! address into an address inside the module's ELF file (PIE/ASLR).

use anyhow::{Context, Result};
use std::fs;
use std::sync::Arc;

use crate::domain::Pid;

/// Address range of one mapping in a process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// An executable mapping and the module it belongs to
#[derive(Debug, Clone)]
pub struct ModuleMapping {
    /// Executable range of the mapping
    pub range: MemoryRange,
    /// Lowest start address of any mapping of the same file
    pub base: u64,
    /// Path of the backing file
    pub path: Arc<str>,
}

impl ModuleMapping {
    /// Offset of `addr` from the module's load base
    #[must_use]
    pub fn relative(&self, addr: u64) -> u64 {
        addr - self.base
    }

    /// File name without directories, as shown in reports
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// The executable modules of one process, sorted by address
#[derive(Debug, Clone, Default)]
pub struct ProcessModules {
    mappings: Vec<ModuleMapping>,
}

impl ProcessModules {
    /// Read and parse `/proc/<pid>/maps`
    ///
    /// # Errors
    /// Returns an error if the maps file cannot be read (process exited or
    /// insufficient permissions)
    pub fn load(pid: Pid) -> Result<Self> {
        let maps_path = format!("/proc/{}/maps", pid.0);
        let maps = fs::read_to_string(&maps_path).context(format!("Failed to read {maps_path}"))?;
        Ok(Self::parse(&maps))
    }

    /// Parse the contents of a maps file
    ///
    /// Lines that don't parse, anonymous mappings and pseudo-files
    /// (`[vdso]`, `[heap]`, ...) are skipped.
    #[must_use]
    pub fn parse(maps: &str) -> Self {
        let lines: Vec<MapLine<'_>> = maps.lines().filter_map(parse_map_line).collect();

        let mut mappings: Vec<ModuleMapping> = Vec::new();
        let mut interned: Vec<Arc<str>> = Vec::new();
        for line in lines.iter().filter(|l| l.executable) {
            // Track the minimum start over ALL mappings of this file
            let base = lines
                .iter()
                .filter(|other| other.path == line.path)
                .map(|other| other.start)
                .min()
                .unwrap_or(line.start);

            let path = if let Some(existing) = interned.iter().find(|p| &***p == line.path) {
                Arc::clone(existing)
            } else {
                let path: Arc<str> = Arc::from(line.path);
                interned.push(Arc::clone(&path));
                path
            };

            mappings.push(ModuleMapping {
                range: MemoryRange { start: line.start, end: line.end },
                base,
                path,
            });
        }

        mappings.sort_by_key(|m| m.range.start);
        Self { mappings }
    }

    /// The module mapping containing `addr`, if any
    #[must_use]
    pub fn find(&self, addr: u64) -> Option<&ModuleMapping> {
        let idx = self.mappings.partition_point(|m| m.range.start <= addr);
        let candidate = self.mappings.get(idx.checked_sub(1)?)?;
        candidate.range.contains(addr).then_some(candidate)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

struct MapLine<'a> {
    start: u64,
    end: u64,
    executable: bool,
    path: &'a str,
}

/// Format: "start-end perms offset dev inode pathname"
fn parse_map_line(line: &str) -> Option<MapLine<'_>> {
    let mut parts = line.split_whitespace();
    let (start, end) = parts.next()?.split_once('-')?;
    let perms = parts.next()?;
    // offset, dev, inode
    let path = parts.nth(3)?;

    if !path.starts_with('/') {
        return None;
    }

    Some(MapLine {
        start: u64::from_str_radix(start, 16).ok()?,
        end: u64::from_str_radix(end, 16).ok()?,
        executable: perms.contains('x'),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
5581d6a00000-5581d6a02000 r--p 00000000 08:01 1311 /usr/bin/myapp
5581d6a02000-5581d6a08000 r-xp 00002000 08:01 1311 /usr/bin/myapp
5581d6a08000-5581d6a0a000 r--p 00008000 08:01 1311 /usr/bin/myapp
5581d7c4e000-5581d7c6f000 rw-p 00000000 00:00 0          [heap]
7f1c2a000000-7f1c2a028000 r--p 00000000 08:01 2044 /usr/lib/libc.so.6
7f1c2a028000-7f1c2a1bd000 r-xp 00028000 08:01 2044 /usr/lib/libc.so.6
7f1c2a300000-7f1c2a301000 r-xp 00000000 00:00 0
7ffd1a5f0000-7ffd1a5f2000 r-xp 00000000 00:00 0          [vdso]
";

    #[test]
    fn test_memory_range_contains() {
        let range = MemoryRange { start: 0x1000, end: 0x2000 };

        assert!(range.contains(0x1000));
        assert!(range.contains(0x1500));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x0FFF));
        assert!(!range.contains(0x2000));
        assert!(!range.contains(0x2001));
    }

    #[test]
    fn test_parse_keeps_only_executable_file_mappings() {
        let modules = ProcessModules::parse(MAPS);
        assert_eq!(modules.len(), 2);
    }

    #[test]
    fn test_find_uses_lowest_mapping_as_base() {
        let modules = ProcessModules::parse(MAPS);

        let exe = modules.find(0x5581_d6a0_3456).expect("address in myapp text");
        assert_eq!(exe.name(), "myapp");
        assert_eq!(exe.base, 0x5581_d6a0_0000);
        assert_eq!(exe.relative(0x5581_d6a0_3456), 0x3456);

        let libc = modules.find(0x7f1c_2a03_0000).expect("address in libc text");
        assert_eq!(&*libc.path, "/usr/lib/libc.so.6");
        assert_eq!(libc.relative(0x7f1c_2a03_0000), 0x30000);
    }

    #[test]
    fn test_find_outside_executable_mappings() {
        let modules = ProcessModules::parse(MAPS);

        // read-only segment of myapp
        assert!(modules.find(0x5581_d6a0_1000).is_none());
        // anonymous executable memory (JIT)
        assert!(modules.find(0x7f1c_2a30_0010).is_none());
        assert!(modules.find(0x10).is_none());
        assert!(modules.find(u64::MAX).is_none());
    }

    #[test]
    fn test_load_self() {
        let modules = ProcessModules::load(Pid(std::process::id())).expect("read own maps");
        assert!(!modules.is_empty());
    }
}
