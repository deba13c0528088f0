// src/sys/provision.rs

use tracing::{debug, info, warn};

use crate::sys::traits::RemoteShell;

/// Package-manager family of the remote host, detected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFamily {
    Apt,
    Dnf,
    Yum,
}

impl PackageFamily {
    /// Parses the output of `command -v apt-get dnf yum`. Preference order
    /// matters: modern Fedora ships a `yum` shim, so dnf wins over yum.
    pub fn detect(probe_stdout: &str) -> Option<Self> {
        let mut found_yum = false;
        for line in probe_stdout.lines() {
            let line = line.trim();
            if line.ends_with("apt-get") {
                return Some(PackageFamily::Apt);
            }
            if line.ends_with("dnf") {
                return Some(PackageFamily::Dnf);
            }
            if line.ends_with("yum") {
                found_yum = true;
            }
        }
        found_yum.then_some(PackageFamily::Yum)
    }

    fn install_script(self) -> &'static str {
        match self {
            PackageFamily::Apt => {
                "sudo apt-get update -y && sudo DEBIAN_FRONTEND=noninteractive apt-get install -y docker.io docker-compose-v2 nginx rsync"
            }
            PackageFamily::Dnf => {
                "sudo dnf install -y docker docker-compose-plugin nginx rsync"
            }
            PackageFamily::Yum => {
                "sudo yum install -y docker docker-compose-plugin nginx rsync"
            }
        }
    }
}

/// Converges the remote host onto: container runtime + compose plugin +
/// nginx, both services enabled. Every action is a no-op when already done.
/// Only an unrecognized package manager is fatal; individual sub-steps are
/// best-effort and logged.
pub struct RemoteProvisioner;

impl RemoteProvisioner {
    pub async fn ensure(&self, shell: &dyn RemoteShell, remote_user: &str) -> Result<(), String> {
        let probe = shell
            .run("command -v apt-get dnf yum 2>/dev/null; true")
            .await?;
        let family = PackageFamily::detect(&probe.stdout).ok_or_else(|| {
            "unsupported package manager on remote host (expected apt, dnf, or yum)".to_string()
        })?;
        info!(family = ?family, "provisioning remote host");

        best_effort(shell, "install packages", family.install_script()).await;
        best_effort(shell, "enable docker", "sudo systemctl enable --now docker").await;
        best_effort(shell, "enable nginx", "sudo systemctl enable --now nginx").await;
        best_effort(
            shell,
            "docker group membership",
            &format!("sudo usermod -aG docker {}", remote_user),
        )
        .await;

        Ok(())
    }
}

/// Runs one provisioning sub-step; failures are logged, never propagated.
async fn best_effort(shell: &dyn RemoteShell, label: &str, script: &str) {
    match shell.run(script).await {
        Ok(out) if out.success() => debug!(step = label, "provisioning step ok"),
        Ok(out) => warn!(
            step = label,
            exit_code = out.exit_code,
            stderr = %out.stderr.trim(),
            "provisioning step failed, continuing"
        ),
        Err(e) => warn!(step = label, error = %e, "provisioning step could not run, continuing"),
    }
}
