use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianArcSlice, RunTimeEndian};
use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, SymbolKind};
use rustc_demangle::demangle;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Resolved addresses kept per module before the cache is reset
const MAX_CACHED_ADDRESSES: usize = 50_000;

/// Symbolizer for resolving addresses inside one ELF module
///
/// Tries DWARF first (function, file, line, inlined frames) and falls back to
/// the ELF symbol tables, which are present in most stripped shared
/// libraries. Resolutions are cached by address.
pub struct Symbolizer {
    ctx: Context<EndianArcSlice<RunTimeEndian>>,
    /// `.symtab` + `.dynsym` function symbols sorted by address
    symbols: Vec<ElfSymbol>,
    /// Non-PIE executables are linked at their runtime addresses
    absolute_addresses: bool,
    cache: HashMap<u64, ResolvedFrame>,
}

#[derive(Debug, Clone)]
struct ElfSymbol {
    addr: u64,
    size: u64,
    name: String,
}

impl Symbolizer {
    /// Create a new symbolizer for the given binary
    ///
    /// # Errors
    /// Returns an error if the binary file cannot be read or parsed
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self> {
        let binary_data = fs::read(binary_path.as_ref()).context("Failed to read binary file")?;

        let obj_file = object::File::parse(&*binary_data).context("Failed to parse object file")?;

        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianArcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianArcSlice::new(Arc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let ctx = Context::from_dwarf(dwarf).context("Failed to load DWARF debug information")?;

        let mut symbols: Vec<ElfSymbol> = obj_file
            .symbols()
            .chain(obj_file.dynamic_symbols())
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.address() != 0)
            .filter_map(|sym| {
                let name = sym.name().ok()?.to_string();
                Some(ElfSymbol { addr: sym.address(), size: sym.size(), name })
            })
            .collect();
        symbols.sort_by_key(|s| s.addr);
        symbols.dedup_by_key(|s| s.addr);

        Ok(Self {
            ctx,
            symbols,
            absolute_addresses: obj_file.kind() == ObjectKind::Executable,
            cache: HashMap::new(),
        })
    }

    /// Translate a runtime address into the module's address space
    ///
    /// `relative` is the address minus the module's load base.
    #[must_use]
    pub fn probe_address(&self, runtime: u64, relative: u64) -> u64 {
        if self.absolute_addresses {
            runtime
        } else {
            relative
        }
    }

    /// Resolve a module address to source location information
    ///
    /// Never fails: unresolvable addresses produce a single `<unknown>` frame.
    pub fn resolve(&mut self, addr: u64) -> ResolvedFrame {
        if let Some(cached) = self.cache.get(&addr) {
            return cached.clone();
        }

        let mut result = Vec::new();

        if let Ok(mut frame_iter) = self.ctx.find_frames(addr).skip_all_loads() {
            while let Ok(Some(frame)) = frame_iter.next() {
                let Some(function) =
                    frame.function.and_then(|f| f.demangle().ok().map(|s| s.to_string()))
                else {
                    continue;
                };

                let location = frame.location.map(|loc| SourceLocation {
                    file: loc.file.map(std::string::ToString::to_string),
                    line: loc.line,
                    column: loc.column,
                });

                result.push(InlinedFrame { function, location });
            }
        }

        if result.is_empty() {
            if let Some(name) = self.symbol_for(addr) {
                result.push(InlinedFrame { function: Self::demangle_symbol(name), location: None });
            }
        }

        let resolved = ResolvedFrame {
            addr,
            frames: if result.is_empty() {
                vec![InlinedFrame { function: UNKNOWN_FUNCTION.to_string(), location: None }]
            } else {
                result
            },
        };

        if self.cache.len() >= MAX_CACHED_ADDRESSES {
            self.cache.clear();
        }
        self.cache.insert(addr, resolved.clone());

        resolved
    }

    /// Symbol table entry covering `addr`
    fn symbol_for(&self, addr: u64) -> Option<&str> {
        let idx = self.symbols.partition_point(|s| s.addr <= addr);
        let sym = self.symbols.get(idx.checked_sub(1)?)?;
        // Zero-sized symbols (hand-written asm) cover up to the next symbol
        let covers = sym.size == 0 || addr < sym.addr + sym.size;
        covers.then_some(sym.name.as_str())
    }

    /// Demangle a Rust symbol name
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        format!("{:#}", demangle(symbol))
    }
}

/// Function name used when neither DWARF nor the symbol table know the address
pub const UNKNOWN_FUNCTION: &str = "<unknown>";

/// A resolved stack frame (may contain multiple inlined frames)
#[derive(Debug, Clone)]
pub struct ResolvedFrame {
    pub addr: u64,
    pub frames: Vec<InlinedFrame>,
}

impl ResolvedFrame {
    /// Innermost function name, if the address was resolved at all
    #[must_use]
    pub fn function(&self) -> Option<&str> {
        self.frames
            .first()
            .map(|f| f.function.as_str())
            .filter(|name| *name != UNKNOWN_FUNCTION)
    }
}

/// An inlined frame within a resolved frame
#[derive(Debug, Clone)]
pub struct InlinedFrame {
    pub function: String,
    pub location: Option<SourceLocation>,
}

/// Source code location
#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demangle_rust_symbol() {
        let demangled = Symbolizer::demangle_symbol("_ZN4core3fmt5write17h0123456789abcdefE");
        assert_eq!(demangled, "core::fmt::write");
    }

    #[test]
    fn test_demangle_passes_through_c_symbols() {
        assert_eq!(Symbolizer::demangle_symbol("malloc"), "malloc");
    }

    #[test]
    fn test_unknown_frame_has_no_function() {
        let frame = ResolvedFrame {
            addr: 0x10,
            frames: vec![InlinedFrame { function: UNKNOWN_FUNCTION.to_string(), location: None }],
        };
        assert_eq!(frame.function(), None);
    }
}
