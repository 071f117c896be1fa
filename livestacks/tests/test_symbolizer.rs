use livestacks::symbolization::symbolizer::UNKNOWN_FUNCTION;
use livestacks::symbolization::Symbolizer;

/// Text symbols of the built binary as (address, demangled name), via nm
fn text_symbols(binary_path: &str) -> Vec<(u64, String)> {
    let nm_output = std::process::Command::new("nm")
        .args(["-C", binary_path])
        .output()
        .expect("Failed to run nm");

    String::from_utf8_lossy(&nm_output.stdout)
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ' ');
            let addr = u64::from_str_radix(parts.next()?, 16).ok()?;
            let kind = parts.next()?;
            let name = parts.next()?;
            (kind == "T" || kind == "t").then(|| (addr, name.to_string()))
        })
        .collect()
}

#[test]
fn test_symbolizer_creation() {
    let binary_path = env!("CARGO_BIN_EXE_livestacks");
    let symbolizer = Symbolizer::new(binary_path);
    assert!(symbolizer.is_ok(), "Failed to create symbolizer: {:?}", symbolizer.err());
}

#[test]
fn test_symbolizer_resolves_function_names() {
    let binary_path = env!("CARGO_BIN_EXE_livestacks");
    let mut symbolizer = Symbolizer::new(binary_path).expect("Failed to create symbolizer");

    let candidates: Vec<_> = text_symbols(binary_path)
        .into_iter()
        .filter(|(_, name)| name.starts_with("livestacks::"))
        .take(20)
        .collect();
    assert!(!candidates.is_empty(), "nm found no livestacks:: symbols");

    let resolved = candidates
        .iter()
        .filter(|(addr, _)| symbolizer.resolve(*addr).function().is_some())
        .count();
    assert!(
        resolved > 0,
        "Symbolizer should resolve at least one of {} addresses to a function name",
        candidates.len()
    );
}

#[test]
fn test_symbolizer_resolution_is_cached_consistently() {
    let binary_path = env!("CARGO_BIN_EXE_livestacks");
    let mut symbolizer = Symbolizer::new(binary_path).expect("Failed to create symbolizer");

    let Some((addr, _)) = text_symbols(binary_path).into_iter().find(|(_, n)| n.contains("main"))
    else {
        return;
    };
    let first = symbolizer.resolve(addr).function().map(str::to_string);
    let second = symbolizer.resolve(addr).function().map(str::to_string);
    assert_eq!(first, second);
}

#[test]
fn test_address_before_text_is_unknown() {
    let binary_path = env!("CARGO_BIN_EXE_livestacks");
    let mut symbolizer = Symbolizer::new(binary_path).expect("Failed to create symbolizer");

    // Below every text symbol
    let resolved = symbolizer.resolve(0x1);
    assert_eq!(resolved.function(), None);
    assert!(resolved.frames.iter().all(|f| f.function == UNKNOWN_FUNCTION));
}

#[test]
#[ignore] // Depends on the build carrying DWARF line info
fn test_dwarf_source_locations_available() {
    let binary_path = env!("CARGO_BIN_EXE_livestacks");
    let mut symbolizer = Symbolizer::new(binary_path).expect("Failed to create symbolizer");

    for (addr, _) in text_symbols(binary_path).into_iter().take(50) {
        let resolved = symbolizer.resolve(addr);
        if resolved
            .frames
            .iter()
            .any(|f| f.location.as_ref().is_some_and(|l| l.file.is_some() && l.line.is_some()))
        {
            return;
        }
    }
    panic!("No source location found - DWARF debug info not available in this build");
}
