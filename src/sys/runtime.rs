// src/sys/runtime.rs

use tracing::{debug, info, warn};

use crate::sys::traits::{AppMode, RemoteShell};

/// Remote container build & run. Teardown of any previous incarnation happens
/// first, so repeated deploys replace rather than accumulate.
pub struct ContainerRuntime;

/// Derives a docker-safe project name from the remote directory basename.
/// "/opt/app" becomes "app"; anything unusable collapses to "app" too.
pub fn project_name(remote_dir: &str) -> String {
    let base = remote_dir
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("app");
    let cleaned: String = base
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches('-').to_string();
    if cleaned.is_empty() {
        "app".to_string()
    } else {
        cleaned
    }
}

impl ContainerRuntime {
    pub async fn deploy(
        &self,
        shell: &dyn RemoteShell,
        mode: AppMode,
        remote_dir: &str,
        internal_port: u16,
    ) -> Result<(), String> {
        match mode {
            AppMode::Compose => self.deploy_compose(shell, remote_dir).await,
            AppMode::BuildFile => self.deploy_build_file(shell, remote_dir, internal_port).await,
        }
    }

    async fn deploy_compose(&self, shell: &dyn RemoteShell, remote_dir: &str) -> Result<(), String> {
        // "Nothing to tear down" is success; only the rebuild is fatal.
        match shell
            .run(&format!(
                "cd {dir} && sudo docker compose down --remove-orphans",
                dir = remote_dir
            ))
            .await
        {
            Ok(out) if !out.success() => {
                debug!(stderr = %out.stderr.trim(), "compose down reported nothing to remove")
            }
            Err(e) => warn!(error = %e, "compose teardown could not run, continuing"),
            _ => {}
        }

        let out = shell
            .run(&format!(
                "cd {dir} && sudo docker compose up -d --build",
                dir = remote_dir
            ))
            .await?;
        if !out.success() {
            return Err(format!(
                "docker compose up failed (exit {}): {}",
                out.exit_code,
                out.stderr.trim()
            ));
        }
        info!("compose stack rebuilt and started");
        Ok(())
    }

    async fn deploy_build_file(
        &self,
        shell: &dyn RemoteShell,
        remote_dir: &str,
        internal_port: u16,
    ) -> Result<(), String> {
        let name = project_name(remote_dir);
        let image = format!("{}:deckhand", name);

        let build = shell
            .run(&format!(
                "sudo docker build -t {image} {dir}",
                image = image,
                dir = remote_dir
            ))
            .await?;
        if !build.success() {
            return Err(format!(
                "docker build failed (exit {}): {}",
                build.exit_code,
                build.stderr.trim()
            ));
        }

        // Absent container is fine; a stale one must go before the fresh run.
        if let Err(e) = shell.run(&format!("sudo docker rm -f {}", name)).await {
            warn!(error = %e, "stale container removal could not run, continuing");
        }

        let run = shell
            .run(&format!(
                "sudo docker run -d --name {name} --restart unless-stopped -p {port}:{port} {image}",
                name = name,
                port = internal_port,
                image = image
            ))
            .await?;
        if !run.success() {
            return Err(format!(
                "docker run failed (exit {}): {}",
                run.exit_code,
                run.stderr.trim()
            ));
        }
        info!(container = %name, port = internal_port, "container started");
        Ok(())
    }

    /// Cleanup-mode teardown: containers, compose stack, project networks.
    /// Every sub-step tolerates absence.
    pub async fn teardown(&self, shell: &dyn RemoteShell, remote_dir: &str) {
        let name = project_name(remote_dir);
        let steps = [
            format!(
                "cd {dir} 2>/dev/null && sudo docker compose down -v --remove-orphans; true",
                dir = remote_dir
            ),
            format!("sudo docker rm -f {}; true", name),
            format!("sudo docker network rm {}_default 2>/dev/null; true", name),
        ];
        for script in steps {
            match shell.run(&script).await {
                Ok(out) if out.success() => debug!(script = %script, "teardown step ok"),
                Ok(out) => debug!(exit_code = out.exit_code, "teardown step had nothing to do"),
                Err(e) => warn!(error = %e, "teardown step could not run, continuing"),
            }
        }
    }
}
