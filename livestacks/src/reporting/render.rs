//! Report rendering
//!
//! Symbols arrive in capture order (innermost frame first).
//!
//! Normal:
//! ```text
//!          42 [myapp 1234]
//!     myapp!worker::spin
//!     myapp!main
//!
//! ```
//!
//! Folded (root first, flame-graph collapse format):
//! ```text
//! myapp (1234);myapp!main;myapp!worker::spin 42
//! ```

use std::io::{self, Write};

use crate::aggregation::AggregatedStack;
use crate::symbolization::Symbol;

/// Write one stack as a normal-mode block
///
/// # Errors
/// Propagates write errors from `out`
pub fn write_normal(
    out: &mut dyn Write,
    stack: &AggregatedStack,
    process_name: &str,
    symbols: &[Symbol],
) -> io::Result<()> {
    writeln!(out, "  {:>10} [{} {}]", stack.count, process_name, stack.pid().0)?;
    for symbol in symbols {
        writeln!(out, "    {symbol}")?;
    }
    writeln!(out)
}

/// Write one stack as a folded line
///
/// # Errors
/// Propagates write errors from `out`
pub fn write_folded(
    out: &mut dyn Write,
    stack: &AggregatedStack,
    process_name: &str,
    symbols: &[Symbol],
) -> io::Result<()> {
    write!(out, "{} ({})", process_name, stack.pid().0)?;
    for symbol in symbols.iter().rev() {
        write!(out, ";{symbol}")?;
    }
    writeln!(out, " {}", stack.count)
}
