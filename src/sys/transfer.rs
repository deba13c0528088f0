// src/sys/transfer.rs

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::sys::traits::FileTransfer;

/// Paths never shipped to the remote host: VCS metadata and the usual local
/// dependency caches.
const EXCLUDES: [&str; 5] = [".git", "node_modules", "target", "__pycache__", ".venv"];

/// Incremental rsync over ssh, with a plain `scp -r` full copy when rsync is
/// not installed locally.
pub struct RsyncTransfer {
    user: String,
    host: String,
    key_path: PathBuf,
}

impl RsyncTransfer {
    pub fn new(user: impl Into<String>, host: impl Into<String>, key_path: PathBuf) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            key_path,
        }
    }

    fn remote_spec(&self, remote_dir: &str) -> String {
        format!("{}@{}:{}/", self.user, self.host, remote_dir.trim_end_matches('/'))
    }

    fn ssh_transport(&self) -> String {
        format!(
            "ssh -i {} -o BatchMode=yes -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
            self.key_path.display()
        )
    }

    async fn rsync(&self, local_dir: &Path, remote_dir: &str) -> Result<(), String> {
        let mut cmd = Command::new("rsync");
        cmd.arg("-az")
            .arg("--delete")
            .arg("-e")
            .arg(self.ssh_transport());
        for pattern in EXCLUDES {
            cmd.arg("--exclude").arg(pattern);
        }
        // Trailing slash: sync the tree's contents, not the tree itself.
        let output = cmd
            .arg(format!("{}/", local_dir.display()))
            .arg(self.remote_spec(remote_dir))
            .output()
            .await
            .map_err(|e| format!("rsync unavailable: {}", e))?;

        if !output.status.success() {
            return Err(format!(
                "rsync exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }

    async fn scp_full_copy(&self, local_dir: &Path, remote_dir: &str) -> Result<(), String> {
        let output = Command::new("scp")
            .arg("-i")
            .arg(&self.key_path)
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("IdentitiesOnly=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-r")
            .arg(format!("{}/.", local_dir.display()))
            .arg(self.remote_spec(remote_dir))
            .output()
            .await
            .map_err(|e| format!("scp spawn error: {}", e))?;

        if !output.status.success() {
            return Err(format!(
                "scp exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FileTransfer for RsyncTransfer {
    async fn sync_tree(&self, local_dir: &Path, remote_dir: &str) -> Result<(), String> {
        match self.rsync(local_dir, remote_dir).await {
            Ok(()) => {
                debug!("rsync transfer complete");
                Ok(())
            }
            // rsync missing on either end: exit 127 (remote shell) or a local
            // spawn error. Fall back to a full copy; any other rsync failure
            // is real and also worth one scp attempt before giving up.
            Err(rsync_err) => {
                warn!(error = %rsync_err, "rsync failed, falling back to scp full copy");
                self.scp_full_copy(local_dir, remote_dir)
                    .await
                    .map_err(|scp_err| {
                        format!("rsync failed ({}) and scp failed ({})", rsync_err, scp_err)
                    })
            }
        }
    }
}
