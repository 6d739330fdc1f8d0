//! OD-020: Candidate definition validation — in a restricted connection or a child process.

pub mod local;
pub mod sandbox;

/// Output from a validation child process.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The most useful failure text: stderr, else stdout, else the exit code.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("validator exited with code {}", self.exit_code)
    }
}

/// Decides whether a candidate application definition may be persisted.
pub trait DefinitionValidator: Send + Sync {
    /// `Err` carries a human-readable reason.
    fn validate(&self, candidate: &str) -> Result<(), String>;
}
