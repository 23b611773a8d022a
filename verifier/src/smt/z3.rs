//! Z3 run as an external process
//!
//! Each query spawns `z3 -in -smt2 -t:<ms>` and feeds the script on stdin.
//! Z3's own `-t` limit is backed by a wall-clock guard that kills the
//! process if it overruns.

use std::cell::OnceCell;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use super::{SatResult, SmtScript, SmtSolver};
use crate::error::SmtError;

/// Extra wall-clock time granted beyond the solver's own timeout
const KILL_GRACE: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug)]
pub struct Z3Solver {
    path: String,
    available: OnceCell<bool>,
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            path: "z3".to_string(),
            available: OnceCell::new(),
        }
    }

    /// Use a specific z3 binary instead of the one on PATH
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self.available = OnceCell::new();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn probe(&self) -> bool {
        let ok = Command::new(&self.path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false);
        tracing::debug!(path = %self.path, available = ok, "probed z3");
        ok
    }

    fn run(&self, script: &SmtScript, timeout_ms: u64) -> Result<SatResult, SmtError> {
        let mut child = Command::new(&self.path)
            .arg("-in")
            .arg("-smt2")
            .arg(format!("-t:{timeout_ms}"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.render().as_bytes())?;
            // stdin dropped here so z3 sees EOF
        }

        let deadline = Duration::from_millis(timeout_ms) + KILL_GRACE;
        if !wait_with_deadline(&mut child, deadline)? {
            tracing::debug!(timeout_ms, "z3 overran its deadline, killed");
            return Ok(SatResult::Unknown);
        }

        let mut output = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout.read_to_string(&mut output)?;
        }
        parse_output(&output)
    }
}

/// Poll until the child exits; kill it at the deadline. Returns whether it
/// exited on its own.
fn wait_with_deadline(child: &mut Child, deadline: Duration) -> std::io::Result<bool> {
    let start = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        if start.elapsed() >= deadline {
            let _ = child.kill();
            child.wait()?;
            return Ok(false);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn parse_output(output: &str) -> Result<SatResult, SmtError> {
    let first = output.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("");
    match first {
        "sat" => Ok(SatResult::Sat),
        "unsat" => Ok(SatResult::Unsat),
        "unknown" | "timeout" => Ok(SatResult::Unknown),
        other => Err(SmtError::Output(other.to_string())),
    }
}

impl SmtSolver for Z3Solver {
    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| self.probe())
    }

    fn check_sat(&self, script: &SmtScript, timeout_ms: u64) -> SatResult {
        if !self.is_available() {
            return SatResult::Unknown;
        }
        match self.run(script, timeout_ms) {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(error = %err, "z3 query failed");
                SatResult::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        assert_eq!(parse_output("sat\n").unwrap(), SatResult::Sat);
        assert_eq!(parse_output("\nunsat\n").unwrap(), SatResult::Unsat);
        assert_eq!(parse_output("unknown\n").unwrap(), SatResult::Unknown);
        assert_eq!(parse_output("timeout\n").unwrap(), SatResult::Unknown);
        assert!(parse_output("(error \"line 1: unknown constant\")").is_err());
        assert!(parse_output("").is_err());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let solver = Z3Solver::new().with_path("/nonexistent/z3-binary");
        assert!(!solver.is_available());
        assert_eq!(solver.check_sat(&SmtScript::new(), 100), SatResult::Unknown);
    }

    #[test]
    fn test_real_z3_when_installed() {
        let solver = Z3Solver::new();
        if !solver.is_available() {
            return;
        }
        let mut script = SmtScript::new();
        script.declare_const("x", crate::smt::SmtSort::Int);
        script.assert("(> x 0)");
        script.assert("(< x 0)");
        assert_eq!(solver.check_sat(&script, 2_000), SatResult::Unsat);
    }
}
