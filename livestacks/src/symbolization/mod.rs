//! # Symbol Resolution and Address Translation
//!
//! Converts the raw instruction pointers captured by the sampler into
//! `module!function` names for the report.
//!
//! ## Address Translation Flow
//!
//! ```text
//! 1. Sampler captures a stack (innermost first)
//!    [0xffffffff810a1240, 0x55f3a2b4c780, 0x7f8b3c1a2a10, ...]
//!
//! 2. Kernel addresses (>= 0xffff800000000000)
//!    → nearest symbol in /proc/kallsyms          kernel!do_syscall_64
//!
//! 3. User addresses: find the executable mapping in /proc/<pid>/maps
//!    /usr/bin/myapp loaded at 0x55f3a2b4c000 (lowest mapping of the file)
//!
//! 4. file offset = 0x55f3a2b4c780 - 0x55f3a2b4c000 = 0x780
//!    (non-PIE executables are looked up at the runtime address)
//!
//! 5. Look up the offset in DWARF, else in .symtab/.dynsym
//!    0x780 → myapp::worker::run                  myapp!myapp::worker::run
//!
//! 6. Nothing found → myapp!0x780, or 0x55f3a2b4c780 outside any module
//! ```
//!
//! **Libraries used**:
//! - `gimli`: Low-level DWARF parser
//! - `addr2line`: High-level symbolization library built on gimli
//! - `object`: ELF binary parser (sections and symbol tables)
//! - `rustc-demangle`: Rust symbol demangling for symbol-table names
//!
//! ## Module Structure
//!
//! - **`resolver`**: the [`SymbolResolver`] seam and the `/proc`-backed
//!   [`ProcResolver`]
//! - **`symbolizer`**: per-module DWARF + symbol table lookups
//! - **`memory_maps`**: `/proc/<pid>/maps` parsing
//! - **`kallsyms`**: kernel symbol table
//!
//! ## Limitations
//!
//! - Stripped binaries without `.dynsym` entries only show `module!0x<offset>`
//! - Inlined frames are collapsed into the innermost function
//! - JIT code and anonymous executable memory stay numeric

pub mod kallsyms;
pub mod memory_maps;
pub mod resolver;
pub mod symbolizer;

pub use kallsyms::KernelSymbols;
pub use memory_maps::{MemoryRange, ModuleMapping, ProcessModules};
pub use resolver::{ProcResolver, Symbol, SymbolResolver};
pub use symbolizer::Symbolizer;
