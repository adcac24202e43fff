//! The shell-and-file-transfer surface the core expects from a remote host.

use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Captured output of one remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A reconnectable session on one host.
///
/// Implementations serialize calls per host (one session per host thread);
/// every operation carries a deadline, and a deadline overrun surfaces as
/// `RemoteTransient` so the synchronizer can back off and retry.
pub trait RemoteShell: Send + Sync {
    fn host_id(&self) -> &str;

    /// Establish (or re-establish) the session; used as the liveness probe.
    fn connect(&self, deadline: Duration) -> Result<()>;

    fn run_command(&self, command: &str, deadline: Duration) -> Result<CommandOutput>;

    fn put(&self, local: &Path, remote: &str, deadline: Duration) -> Result<()>;

    fn get(&self, remote: &str, local: &Path, deadline: Duration) -> Result<()>;

    /// Recursively remove a remote directory.
    fn remove_dir(&self, remote: &str, deadline: Duration) -> Result<()> {
        let quoted = shell_quote(remote);
        let output = self.run_command(&format!("rm -rf {quoted}"), deadline)?;
        if !output.success() {
            return Err(crate::error::Error::RemoteTransient {
                host: self.host_id().to_string(),
                message: format!("rm -rf failed: {}", output.stderr.trim()),
            });
        }
        Ok(())
    }
}

/// Quote a path for inclusion in a remote shell command.
pub fn shell_quote(s: &str) -> String {
    if s.chars().all(|c| c.is_ascii_alphanumeric() || "/_-.~".contains(c)) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/scratch/run/sim_a"), "/scratch/run/sim_a");
        assert_eq!(shell_quote("dir with space"), "'dir with space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
