// src/sys/ssh.rs

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

use crate::sys::traits::{RemoteOutput, RemoteShell};

/// Remote execution over the system OpenSSH client. `BatchMode=yes` makes
/// every invocation non-interactive: a missing or rejected key fails instead
/// of prompting. `IdentitiesOnly=yes` pins authentication to the configured
/// key, ignoring any ambient agent identities.
pub struct OpenSshShell {
    user: String,
    host: String,
    key_path: PathBuf,
}

impl OpenSshShell {
    pub fn new(user: impl Into<String>, host: impl Into<String>, key_path: PathBuf) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            key_path,
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-i")
            .arg(&self.key_path)
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("IdentitiesOnly=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg("ConnectTimeout=15");
        cmd
    }
}

#[async_trait]
impl RemoteShell for OpenSshShell {
    async fn run(&self, script: &str) -> Result<RemoteOutput, String> {
        let output = self
            .base_command()
            .arg(self.destination())
            .arg(script)
            .output()
            .await
            .map_err(|e| format!("ssh spawn error: {}", e))?;

        Ok(RemoteOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn check_connectivity(&self) -> Result<(), String> {
        // `true` mutates nothing; ssh uses exit code 255 for its own failures.
        let out = self.run("true").await?;
        if !out.success() {
            return Err(format!(
                "ssh probe to {} failed (exit {}): {}",
                self.destination(),
                out.exit_code,
                out.stderr.trim()
            ));
        }
        Ok(())
    }
}
