//! OD-020: Child-process validation — the candidate is piped to `opdeck check -`.

use super::{DefinitionValidator, ExecOutput};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `program args...` with `input` on stdin, killing it after `timeout`.
///
/// stdin is written and stdout/stderr drained on their own threads, so
/// neither a large candidate nor large output can stall the child.
pub fn exec_with_stdin(
    program: &Path,
    args: &[String],
    input: &str,
    timeout: Duration,
) -> Result<ExecOutput, String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn {}: {}", program.display(), e))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let stdin = child.stdin.take();
    let input = input.to_owned();
    let writer = std::thread::spawn(move || match stdin {
        Some(mut stdin) => stdin.write_all(input.as_bytes()),
        None => Ok(()),
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                reap(&mut child);
                return Err(format!(
                    "validator timed out after {}s",
                    timeout.as_secs_f64()
                ));
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => {
                reap(&mut child);
                return Err(format!("wait error: {}", e));
            }
        }
    };

    match writer.join() {
        // The child may exit without reading all of its input.
        Ok(Err(e)) if e.kind() != ErrorKind::BrokenPipe => {
            return Err(format!("stdin write error: {}", e));
        }
        _ => {}
    }
    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    Ok(ExecOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
    })
}

/// Validates in a separate process so untrusted SQL never runs in the caller.
#[derive(Debug, Clone)]
pub struct ProcessValidator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessValidator {
    /// `<this executable> check - --config <config>`.
    pub fn current_exe(config: &Path) -> Result<Self, String> {
        let program =
            std::env::current_exe().map_err(|e| format!("cannot locate executable: {}", e))?;
        Ok(Self::command(
            program,
            vec![
                "check".to_string(),
                "-".to_string(),
                "--config".to_string(),
                config.display().to_string(),
            ],
        ))
    }

    pub fn command(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl DefinitionValidator for ProcessValidator {
    fn validate(&self, candidate: &str) -> Result<(), String> {
        tracing::debug!(program = %self.program.display(), "validating in child process");
        let out = exec_with_stdin(&self.program, &self.args, candidate, self.timeout)?;
        if out.success() {
            Ok(())
        } else {
            Err(out.failure_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bash(script: &str) -> ProcessValidator {
        ProcessValidator::command("bash", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_od020_stdin_reaches_child() {
        let out = exec_with_stdin(
            Path::new("bash"),
            &["-c".to_string(), "wc -l".to_string()],
            "a\nb\nc\n",
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "3");
    }

    #[test]
    fn test_od020_process_validator_accepts() {
        let v = bash("grep -q 'dispatch-begin'");
        assert!(v.validate("-- opdeck:dispatch-begin\n").is_ok());
    }

    #[test]
    fn test_od020_process_validator_rejects_with_stderr() {
        let v = bash("cat >/dev/null; echo 'bad statement' >&2; exit 3");
        assert_eq!(v.validate("x").unwrap_err(), "bad statement");
    }

    #[test]
    fn test_od020_process_validator_timeout() {
        let v = bash("sleep 5").with_timeout(Duration::from_millis(100));
        assert!(v.validate("").unwrap_err().contains("timed out"));
    }

    #[test]
    fn test_od020_large_output_does_not_stall() {
        let started = Instant::now();
        let out = exec_with_stdin(
            Path::new("bash"),
            &[
                "-c".to_string(),
                "head -c 200000 /dev/zero | tr '\\0' x; head -c 100000 /dev/zero | tr '\\0' y >&2"
                    .to_string(),
            ],
            "",
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.len(), 200_000);
        assert_eq!(out.stderr.len(), 100_000);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_od020_child_ignoring_stdin() {
        let big = "x".repeat(1 << 20);
        let out = exec_with_stdin(
            Path::new("bash"),
            &["-c".to_string(), "exit 4".to_string()],
            &big,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(out.exit_code, 4);
    }

    #[test]
    fn test_od020_spawn_failure() {
        let v = ProcessValidator::command("/nonexistent/opdeck", vec![]);
        assert!(v.validate("").unwrap_err().contains("failed to spawn"));
    }
}
