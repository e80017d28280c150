//! Script hosts that carry automation calls to the engine.
//!
//! On Windows a single PowerShell process stays alive for the whole session
//! so COM objects created by one call are visible to the next; each call is
//! one line on its stdin and one marked line back on its stdout. On macOS
//! every call is a separate `osascript` run, the session state living in the
//! application itself.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::AutomationError;

const OK_MARKER: &str = "@@EXCEL2PDF-OK@@";
const ERR_MARKER: &str = "@@EXCEL2PDF-ERR@@";

/// How long a host gets to exit on its own after its input is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Executes automation scripts in some dialect.
#[cfg_attr(test, mockall::automock)]
pub trait ScriptHost {
    /// Runs one script and returns what it printed.
    fn run(&mut self, script: &str) -> Result<String, AutomationError>;

    /// Stops the host process, if any.
    fn shutdown(&mut self);

    /// Forcibly ends the engine process `pid`.
    fn kill_process(&mut self, pid: u32) -> Result<(), AutomationError> {
        terminate_process(pid)
    }
}

/// `taskkill /F` on Windows, `kill -9` elsewhere.
pub fn terminate_process(pid: u32) -> Result<(), AutomationError> {
    let pid_arg = pid.to_string();
    let mut cmd = if cfg!(target_os = "windows") {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/F", "/T", "/PID", &pid_arg]);
        cmd
    } else {
        let mut cmd = Command::new("kill");
        cmd.args(["-9", &pid_arg]);
        cmd
    };
    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(AutomationError::Launch)?;
    if status.success() {
        debug!(pid, "engine process terminated");
        Ok(())
    } else {
        Err(AutomationError::Script(format!("could not terminate process {pid}: {status}")))
    }
}

/// A long-running PowerShell process.
pub struct PowerShellHost {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl PowerShellHost {
    pub fn spawn(program: &Path) -> Result<Self, AutomationError> {
        let mut child = Command::new(program)
            .args([
                "-NoLogo",
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(AutomationError::Launch)?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.kill();
            return Err(AutomationError::Protocol("PowerShell pipes unavailable".to_string()));
        };

        debug!(program = %program.display(), pid = child.id(), "PowerShell host started");
        let mut host = Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        };
        host.run("$ErrorActionPreference = 'Stop'")?;
        Ok(host)
    }
}

/// Wraps a script so its result, or the message of whatever it threw, comes
/// back as one marked line. The script is dot-sourced so variables it sets
/// survive into later calls.
fn wrap_powershell(script: &str) -> String {
    format!(
        "try {{ $__out = . {{ {script} }}; [Console]::Out.WriteLine('{OK_MARKER}' + (@($__out) -join \"`t\")) }} \
         catch {{ [Console]::Out.WriteLine('{ERR_MARKER}' + ($_.Exception.Message -replace \"\\r?\\n\", ' ')) }}"
    )
}

impl ScriptHost for PowerShellHost {
    fn run(&mut self, script: &str) -> Result<String, AutomationError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AutomationError::Protocol("PowerShell host already shut down".to_string()))?;
        writeln!(stdin, "{}", wrap_powershell(script))?;
        stdin.flush()?;

        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(AutomationError::Protocol("PowerShell host exited".to_string()));
            }
            let line = line.trim_end_matches(&['\r', '\n'][..]);
            if let Some(out) = line.strip_prefix(OK_MARKER) {
                return Ok(out.to_string());
            }
            if let Some(err) = line.strip_prefix(ERR_MARKER) {
                return Err(AutomationError::Script(err.trim().to_string()));
            }
            trace!(line, "PowerShell output");
        }
    }

    fn shutdown(&mut self) {
        if self.stdin.take().is_none() {
            return;
        }
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "PowerShell host exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
                _ => break,
            }
        }
        warn!("PowerShell host did not exit, killing it");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for PowerShellHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs each script through `osascript`.
pub struct OsaScriptHost {
    program: PathBuf,
}

impl OsaScriptHost {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ScriptHost for OsaScriptHost {
    fn run(&mut self, script: &str) -> Result<String, AutomationError> {
        let mut cmd = Command::new(&self.program);
        for line in script.lines() {
            cmd.arg("-e").arg(line);
        }
        let output = cmd.stdin(Stdio::null()).output().map_err(AutomationError::Launch)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutomationError::Script(stderr.trim().to_string()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.strip_suffix('\n').unwrap_or(&stdout).to_string())
    }

    fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_powershell_dot_sources_script() {
        let wrapped = wrap_powershell("$wb = $excel.Workbooks.Open('a.xlsx')");
        assert!(wrapped.starts_with("try { $__out = . { $wb = $excel.Workbooks.Open('a.xlsx') };"));
        assert!(wrapped.contains(OK_MARKER));
        assert!(wrapped.contains(ERR_MARKER));
        assert!(!wrapped.contains('\n'));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_process_kills_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        terminate_process(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_osascript_missing_binary_is_launch_error() {
        let mut host = OsaScriptHost::new("/nonexistent/osascript");
        let err = host.run("return 1").unwrap_err();
        assert!(matches!(err, AutomationError::Launch(_)));
    }
}
