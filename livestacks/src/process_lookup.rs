//! Process names and liveness from `/proc`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::domain::Pid;

/// Command name of a process.
///
/// Reads `/proc/<pid>/comm`, falling back to the `(comm)` field of
/// `/proc/<pid>/stat`. Returns `None` once the process is gone.
#[must_use]
pub fn process_name(pid: Pid) -> Option<String> {
    if let Ok(comm) = fs::read_to_string(format!("/proc/{}/comm", pid.0)) {
        let comm = comm.trim_end_matches('\n');
        if !comm.is_empty() {
            return Some(comm.to_string());
        }
    }

    let stat = fs::read_to_string(format!("/proc/{}/stat", pid.0)).ok()?;
    extract_comm(&stat).ok()
}

/// Whether `/proc/<pid>` exists.
#[must_use]
pub fn process_exists(pid: Pid) -> bool {
    Path::new(&format!("/proc/{}", pid.0)).exists()
}

/// Extract command name from `/proc/<pid>/stat`.
/// Format: "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Result<String> {
    let open = stat_line.find('(').context("Invalid stat format")?;
    let close = stat_line.rfind(')').context("Invalid stat format")?;
    if open >= close {
        bail!("Invalid stat format");
    }
    Ok(stat_line[open + 1..close].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_comm() {
        let stat = "1234 (my-app) S 1 1234 1234 0 -1 4194304";
        assert_eq!(extract_comm(stat).unwrap(), "my-app");
    }

    #[test]
    fn test_extract_comm_with_parens() {
        // Command names can contain parentheses
        let stat = "1234 (app (v2)) S 1 1234";
        assert_eq!(extract_comm(stat).unwrap(), "app (v2)");
    }

    #[test]
    fn test_extract_comm_rejects_garbage() {
        assert!(extract_comm("1234 my-app S").is_err());
        assert!(extract_comm(") (").is_err());
    }

    #[test]
    fn test_own_process() {
        let me = Pid(std::process::id());
        assert!(process_exists(me));
        assert!(process_name(me).is_some_and(|name| !name.is_empty()));
    }

    #[test]
    fn test_missing_process() {
        let gone = Pid(u32::MAX - 1);
        assert!(!process_exists(gone));
        assert_eq!(process_name(gone), None);
    }
}
