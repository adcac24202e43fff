//! OpenSSH-backed remote shell.
//!
//! Commands run through `ssh`, transfers through `scp`, with a shared
//! control socket so repeated calls reuse one authenticated connection.
//! Deadlines are enforced by polling the child process and killing it on
//! overrun.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::hosts::HostSpec;
use crate::remote::shell::{CommandOutput, RemoteShell};

const POLL_STEP: Duration = Duration::from_millis(50);

/// One OpenSSH session per host; reconnects transparently through the
/// control socket.
#[derive(Debug)]
pub struct SshShell {
    host: HostSpec,
    control_path: PathBuf,
}

impl SshShell {
    pub fn new(host: HostSpec, control_dir: &Path) -> Self {
        let control_path = control_dir.join(format!("ssh-{}.sock", host.id));
        SshShell { host, control_path }
    }

    fn ssh_base(&self) -> Command {
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("ControlMaster=auto")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-o")
            .arg("ControlPersist=300")
            .arg("-p")
            .arg(self.host.port.to_string())
            .arg(self.host.address());
        command
    }

    fn scp_base(&self) -> Command {
        let mut command = Command::new("scp");
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("ControlMaster=auto")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-P")
            .arg(self.host.port.to_string());
        command
    }

    fn transient(&self, message: impl Into<String>) -> Error {
        Error::RemoteTransient {
            host: self.host.id.clone(),
            message: message.into(),
        }
    }

    /// Run a child to completion under a deadline, killing it on overrun.
    fn wait_with_deadline(&self, mut child: Child, deadline: Duration) -> Result<CommandOutput> {
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_reader = std::thread::spawn(move || {
            let mut buffer = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buffer);
            }
            buffer
        });
        let stderr_reader = std::thread::spawn(move || {
            let mut buffer = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buffer);
            }
            buffer
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if started.elapsed() > deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout_reader.join();
                        let _ = stderr_reader.join();
                        return Err(self.transient(format!(
                            "deadline of {deadline:?} exceeded"
                        )));
                    }
                    std::thread::sleep(POLL_STEP);
                }
                Err(e) => {
                    let _ = child.kill();
                    return Err(self.transient(format!("wait failed: {e}")));
                }
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        })
    }

    fn run(&self, mut command: Command, deadline: Duration) -> Result<CommandOutput> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.transient(format!("spawn failed: {e}")))?;
        self.wait_with_deadline(child, deadline)
    }
}

impl RemoteShell for SshShell {
    fn host_id(&self) -> &str {
        &self.host.id
    }

    fn connect(&self, deadline: Duration) -> Result<()> {
        let mut command = self.ssh_base();
        command
            .arg("-o")
            .arg(format!("ConnectTimeout={}", deadline.as_secs().max(1)))
            .arg("true");
        let output = self.run(command, deadline)?;
        if !output.success() {
            return Err(self.transient(format!("probe failed: {}", output.stderr.trim())));
        }
        Ok(())
    }

    fn run_command(&self, remote_command: &str, deadline: Duration) -> Result<CommandOutput> {
        let mut command = self.ssh_base();
        command.arg(remote_command);
        self.run(command, deadline)
    }

    fn put(&self, local: &Path, remote: &str, deadline: Duration) -> Result<()> {
        let mut command = self.scp_base();
        command
            .arg(local)
            .arg(format!("{}:{}", self.host.address(), remote));
        let output = self.run(command, deadline)?;
        if !output.success() {
            return Err(self.transient(format!(
                "upload of '{}' failed: {}",
                local.display(),
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    fn get(&self, remote: &str, local: &Path, deadline: Duration) -> Result<()> {
        let mut command = self.scp_base();
        command
            .arg("-r")
            .arg(format!("{}:{}", self.host.address(), remote))
            .arg(local);
        let output = self.run(command, deadline)?;
        if !output.success() {
            return Err(self.transient(format!(
                "download of '{remote}' failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}
