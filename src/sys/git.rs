// src/sys/git.rs

use async_trait::async_trait;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::sys::secrets::AccessCredential;
use crate::sys::traits::{AppMode, SourceControl};

/// Compose descriptors checked at the repository root, in precedence order.
const COMPOSE_FILES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

pub struct SystemGitManager;

impl SystemGitManager {
    /// Redacts credentials embedded in https://[TOKEN]@host or git@[TOKEN]: forms
    /// before any git output reaches the log.
    pub(crate) fn scrub_credentials(input: &str) -> String {
        let re = regex::Regex::new(r"(://|git@)([^@\s]+)@").unwrap();
        re.replace_all(input, "$1[REDACTED]@").to_string()
    }

    /// Writes a 0700 askpass helper that answers every git credential prompt
    /// with the token. The file lives only as long as the clone.
    fn write_askpass_helper(token: &AccessCredential) -> Result<NamedTempFile, String> {
        let mut helper = NamedTempFile::new().map_err(|e| e.to_string())?;
        token.use_secret(|t| {
            helper
                .write_all(format!("#!/bin/sh\nprintf '%s\\n' '{}'\n", t).as_bytes())
                .map_err(|e| e.to_string())
        })?;
        let mut perms = helper
            .as_file()
            .metadata()
            .map_err(|e| e.to_string())?
            .permissions();
        perms.set_mode(0o700);
        helper
            .as_file()
            .set_permissions(perms)
            .map_err(|e| e.to_string())?;
        Ok(helper)
    }
}

#[async_trait]
impl SourceControl for SystemGitManager {
    async fn sync_source(
        &self,
        repo_url: &str,
        branch: &str,
        token: Option<&AccessCredential>,
        target_dir: &Path,
    ) -> Result<(), String> {
        // Argument injection guard: neither value may be mistaken for a flag.
        if repo_url.starts_with('-') || branch.starts_with('-') {
            return Err("Suspicious git arguments detected".into());
        }

        // Transient credential helper, purged when `_askpass` drops.
        let mut _askpass = None;
        let mut cmd = Command::new("git");
        cmd.arg("-c")
            .arg("core.hooksPath=/dev/null")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env(
                "GIT_SSH_COMMAND",
                "ssh -o StrictHostKeyChecking=accept-new -o BatchMode=yes",
            );

        if let Some(cred) = token {
            let helper = Self::write_askpass_helper(cred)?;
            cmd.env("GIT_ASKPASS", helper.path());
            _askpass = Some(helper);
        }

        let output = cmd
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--branch")
            .arg(branch)
            .arg("--") // End of options
            .arg(repo_url)
            .arg(target_dir)
            .output()
            .await
            .map_err(|e| format!("Git spawn error: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let sanitized = Self::scrub_credentials(&stderr.replace(repo_url, "[REPO_URL]"));
            return Err(format!("Git clone failed: {}", sanitized));
        }

        Ok(())
    }
}

/// Inspects a freshly synced working tree and decides how it containerizes.
/// A compose file wins over a plain Dockerfile since it subsumes the build.
pub fn detect_app_mode(dir: &Path) -> Result<AppMode, String> {
    for name in COMPOSE_FILES {
        if dir.join(name).is_file() {
            return Ok(AppMode::Compose);
        }
    }
    if dir.join("Dockerfile").is_file() {
        return Ok(AppMode::BuildFile);
    }
    Err(format!(
        "neither a Dockerfile nor a compose file exists at the root of {}",
        dir.display()
    ))
}
