// src/sequencer.rs

use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::config::{CleanupConfig, DeployConfig};
use crate::error::DeployError;
use crate::sys::git::{detect_app_mode, SystemGitManager};
use crate::sys::probe::ReqwestProbe;
use crate::sys::provision::RemoteProvisioner;
use crate::sys::proxy::NginxSiteManager;
use crate::sys::runtime::ContainerRuntime;
use crate::sys::ssh::OpenSshShell;
use crate::sys::traits::{AppMode, FileTransfer, HttpProbe, RemoteShell, SourceControl};
use crate::sys::transfer::RsyncTransfer;

/// Name of the nginx site this tool owns on the remote host.
const SITE_NAME: &str = "deckhand";

/// What a successful deploy leaves behind locally.
#[derive(Debug)]
pub struct DeployOutcome {
    pub workdir: PathBuf,
    pub mode: AppMode,
}

/// Runs the eight deploy stages strictly in order, aborting on the first
/// failure. Capabilities are injected as trait objects so every stage is
/// testable against fakes; the system constructor wires the real managers.
pub struct DeploySequencer {
    source: Box<dyn SourceControl>,
    shell: Box<dyn RemoteShell>,
    transfer: Box<dyn FileTransfer>,
    probe: Box<dyn HttpProbe>,
    provisioner: RemoteProvisioner,
    runtime: ContainerRuntime,
    proxy: NginxSiteManager,
}

impl DeploySequencer {
    pub fn new(cfg: &DeployConfig) -> Result<Self, DeployError> {
        Ok(Self {
            source: Box::new(SystemGitManager),
            shell: Box::new(OpenSshShell::new(
                cfg.remote_user.clone(),
                cfg.remote_host.clone(),
                cfg.key_path.clone(),
            )),
            transfer: Box::new(RsyncTransfer::new(
                cfg.remote_user.clone(),
                cfg.remote_host.clone(),
                cfg.key_path.clone(),
            )),
            probe: Box::new(ReqwestProbe::new().map_err(DeployError::Unexpected)?),
            provisioner: RemoteProvisioner,
            runtime: ContainerRuntime,
            proxy: NginxSiteManager::new(SITE_NAME),
        })
    }

    #[cfg(test)]
    fn with_capabilities(
        source: Box<dyn SourceControl>,
        shell: Box<dyn RemoteShell>,
        transfer: Box<dyn FileTransfer>,
        probe: Box<dyn HttpProbe>,
    ) -> Self {
        Self {
            source,
            shell,
            transfer,
            probe,
            provisioner: RemoteProvisioner,
            runtime: ContainerRuntime,
            proxy: NginxSiteManager::new(SITE_NAME),
        }
    }

    pub async fn run(&self, cfg: &DeployConfig) -> Result<DeployOutcome, DeployError> {
        // ======================================================================
        // 1. Source Sync (local only; no remote contact yet)
        // ======================================================================
        let workdir = make_workspace()?;
        info!(stage = "source-sync", workdir = %workdir.display(), branch = %cfg.branch, "fetching source");
        self.source
            .sync_source(
                &cfg.repo_url,
                &cfg.branch,
                cfg.access_token.as_ref(),
                &workdir,
            )
            .await
            .map_err(DeployError::SourceControl)?;
        let mode = detect_app_mode(&workdir).map_err(DeployError::NoDescriptor)?;
        info!(stage = "source-sync", %mode, "application descriptor detected");

        // ======================================================================
        // 2. Connectivity Check (first remote contact, still non-mutating)
        // ======================================================================
        info!(stage = "connectivity", host = %cfg.remote_host, "probing remote target");
        self.shell
            .check_connectivity()
            .await
            .map_err(DeployError::Connectivity)?;

        // ======================================================================
        // 3. Remote Provisioning (idempotent convergence)
        // ======================================================================
        info!(stage = "provision", "converging remote environment");
        self.provisioner
            .ensure(self.shell.as_ref(), &cfg.remote_user)
            .await
            .map_err(DeployError::Provisioning)?;

        // ======================================================================
        // 4. Artifact Transfer
        // ======================================================================
        info!(stage = "transfer", remote_dir = %cfg.remote_dir, "shipping working tree");
        let prep = self
            .shell
            .run(&format!(
                "sudo mkdir -p {dir} && sudo chown -R {user}: {dir}",
                dir = cfg.remote_dir,
                user = cfg.remote_user
            ))
            .await
            .map_err(DeployError::Transfer)?;
        if !prep.success() {
            return Err(DeployError::Transfer(format!(
                "preparing {} failed: {}",
                cfg.remote_dir,
                prep.stderr.trim()
            )));
        }
        self.transfer
            .sync_tree(&workdir, &cfg.remote_dir)
            .await
            .map_err(DeployError::Transfer)?;

        // ======================================================================
        // 5. Remote Build & Run
        // ======================================================================
        info!(stage = "build-run", %mode, "building and starting containers");
        self.runtime
            .deploy(self.shell.as_ref(), mode, &cfg.remote_dir, cfg.internal_port)
            .await
            .map_err(DeployError::RemoteBuild)?;

        // ======================================================================
        // 6. Reverse-Proxy Configuration
        // ======================================================================
        info!(stage = "proxy", port = cfg.internal_port, "installing nginx site");
        self.proxy
            .install_site(self.shell.as_ref(), cfg.internal_port)
            .await
            .map_err(DeployError::ProxyConfig)?;

        // ======================================================================
        // 7. Post-Deploy Validation
        // ======================================================================
        info!(stage = "validate", "verifying services and HTTP path");
        self.validate(cfg).await?;

        info!(
            stage = "done",
            workdir = %workdir.display(),
            "deployment complete; local working tree kept for inspection"
        );
        Ok(DeployOutcome { workdir, mode })
    }

    async fn validate(&self, cfg: &DeployConfig) -> Result<(), DeployError> {
        for service in ["docker", "nginx"] {
            let out = self
                .shell
                .run(&format!("systemctl is-active --quiet {}", service))
                .await
                .map_err(DeployError::Validation)?;
            if !out.success() {
                return Err(DeployError::Validation(format!(
                    "{} service is not active on the remote host",
                    service
                )));
            }
        }

        // Direct probe, on the remote host, bypassing the proxy.
        let internal = self
            .shell
            .run(&format!(
                "curl -s -o /dev/null -w '%{{http_code}}' --max-time 10 http://127.0.0.1:{}/",
                cfg.internal_port
            ))
            .await
            .map_err(DeployError::Validation)?;
        if !internal.success() {
            return Err(DeployError::Validation(format!(
                "application did not answer on internal port {} (curl exit {})",
                cfg.internal_port, internal.exit_code
            )));
        }
        debug!(status = %internal.stdout.trim(), "internal probe answered");

        // External probe, through the proxy, from the operator's side. This
        // one must be exactly 200.
        let status = self
            .probe
            .status(&format!("http://{}/", cfg.remote_host))
            .await
            .map_err(DeployError::Validation)?;
        if status != 200 {
            return Err(DeployError::Validation(format!(
                "expected HTTP 200 through the reverse proxy, got {}",
                status
            )));
        }
        info!("reverse proxy answered with HTTP 200");
        Ok(())
    }
}

/// Fresh local working area, unique per run, deliberately never deleted.
fn make_workspace() -> Result<PathBuf, DeployError> {
    let dir = tempfile::Builder::new()
        .prefix("deckhand-src-")
        .tempdir()
        .map_err(|e| DeployError::SourceControl(format!("cannot create working area: {}", e)))?;
    Ok(dir.keep())
}

// ==============================================================================
// Cleanup
// ==============================================================================

/// Reverses a deployment on the remote target. Every removal tolerates
/// "already absent"; unexpected sub-step failures are reported in the log but
/// do not stop the remaining teardown.
pub struct CleanupSequencer {
    shell: Box<dyn RemoteShell>,
    runtime: ContainerRuntime,
    proxy: NginxSiteManager,
}

impl CleanupSequencer {
    pub fn new(cfg: &CleanupConfig) -> Self {
        Self {
            shell: Box::new(OpenSshShell::new(
                cfg.remote_user.clone(),
                cfg.remote_host.clone(),
                cfg.key_path.clone(),
            )),
            runtime: ContainerRuntime,
            proxy: NginxSiteManager::new(SITE_NAME),
        }
    }

    #[cfg(test)]
    fn with_shell(shell: Box<dyn RemoteShell>) -> Self {
        Self {
            shell,
            runtime: ContainerRuntime,
            proxy: NginxSiteManager::new(SITE_NAME),
        }
    }

    pub async fn run(&self, cfg: &CleanupConfig) -> Result<(), DeployError> {
        // Guard the rm -rf target even if the config arrived pre-built.
        crate::config::validate_remote_dir(&cfg.remote_dir).map_err(DeployError::InvalidInput)?;

        info!(stage = "connectivity", host = %cfg.remote_host, "probing remote target");
        self.shell
            .check_connectivity()
            .await
            .map_err(DeployError::Connectivity)?;

        info!(stage = "cleanup", "stopping reverse proxy");
        self.tolerant("sudo systemctl stop nginx").await;

        info!(stage = "cleanup", "removing containers and networks");
        self.runtime
            .teardown(self.shell.as_ref(), &cfg.remote_dir)
            .await;

        info!(stage = "cleanup", dir = %cfg.remote_dir, "removing project directory");
        self.tolerant(&format!("sudo rm -rf -- {}", cfg.remote_dir))
            .await;

        info!(stage = "cleanup", "removing nginx site");
        self.proxy.remove_site(self.shell.as_ref()).await;

        match self.shell.run("sudo nginx -t").await {
            Ok(out) if out.success() => debug!("nginx configuration still valid"),
            Ok(out) => warn!(stderr = %out.stderr.trim(), "nginx configuration check failed after cleanup"),
            Err(e) => error!(error = %e, "could not check nginx configuration"),
        }
        self.tolerant("sudo systemctl reload nginx || sudo systemctl restart nginx")
            .await;

        info!(stage = "cleanup", "cleanup complete");
        Ok(())
    }

    /// Absence and non-zero exits are fine; only log what happened.
    async fn tolerant(&self, script: &str) {
        match self.shell.run(script).await {
            Ok(out) if out.success() => debug!(script, "cleanup step ok"),
            Ok(out) => debug!(script, exit_code = out.exit_code, "cleanup step had nothing to do"),
            Err(e) => error!(script, error = %e, "cleanup step could not run"),
        }
    }
}

// ==============================================================================
// Sequencer tests against fake capabilities
// ==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use crate::sys::secrets::AccessCredential;
    use crate::sys::traits::RemoteOutput;

    fn out(exit_code: i32, stdout: &str) -> RemoteOutput {
        RemoteOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: "boom".to_string(),
        }
    }

    /// Records every delivered script; scripts matching a failure needle
    /// return exit 1, everything else succeeds with canned stdout.
    struct FakeShell {
        commands: Mutex<Vec<String>>,
        reachable: bool,
        pkg_probe: String,
        fail_needles: Vec<&'static str>,
    }

    impl FakeShell {
        fn new() -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                reachable: true,
                pkg_probe: "/usr/bin/apt-get\n".to_string(),
                fail_needles: Vec::new(),
            }
        }

        fn unreachable(mut self) -> Self {
            self.reachable = false;
            self
        }

        fn without_package_manager(mut self) -> Self {
            self.pkg_probe = String::new();
            self
        }

        fn fail_matching(mut self, needle: &'static str) -> Self {
            self.fail_needles.push(needle);
            self
        }

        fn recorded(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for FakeShell {
        async fn run(&self, script: &str) -> Result<RemoteOutput, String> {
            self.commands.lock().unwrap().push(script.to_string());
            if self.fail_needles.iter().any(|n| script.contains(n)) {
                return Ok(out(1, ""));
            }
            if script.contains("command -v") {
                return Ok(out(0, &self.pkg_probe));
            }
            if script.contains("%{http_code}") {
                return Ok(out(0, "200"));
            }
            Ok(out(0, ""))
        }

        async fn check_connectivity(&self) -> Result<(), String> {
            if self.reachable {
                Ok(())
            } else {
                Err("connection timed out".to_string())
            }
        }
    }

    #[async_trait]
    impl RemoteShell for Arc<FakeShell> {
        async fn run(&self, script: &str) -> Result<RemoteOutput, String> {
            self.as_ref().run(script).await
        }
        async fn check_connectivity(&self) -> Result<(), String> {
            self.as_ref().check_connectivity().await
        }
    }

    /// Populates the working area with the named files instead of cloning.
    struct FakeGit {
        files: Vec<&'static str>,
    }

    #[async_trait]
    impl SourceControl for FakeGit {
        async fn sync_source(
            &self,
            _repo_url: &str,
            _branch: &str,
            _token: Option<&AccessCredential>,
            target_dir: &Path,
        ) -> Result<(), String> {
            for name in &self.files {
                std::fs::write(target_dir.join(name), "FROM scratch\n")
                    .map_err(|e| e.to_string())?;
            }
            Ok(())
        }
    }

    struct FakeTransfer;

    #[async_trait]
    impl FileTransfer for FakeTransfer {
        async fn sync_tree(&self, _local_dir: &Path, _remote_dir: &str) -> Result<(), String> {
            Ok(())
        }
    }

    struct FakeProbe {
        result: Result<u16, String>,
    }

    #[async_trait]
    impl HttpProbe for FakeProbe {
        async fn status(&self, _url: &str) -> Result<u16, String> {
            self.result.clone()
        }
    }

    fn deploy_config() -> DeployConfig {
        // Bypasses the builder's key-file check on purpose; stage logic under
        // test never opens the key.
        DeployConfig {
            repo_url: "https://github.com/me/app.git".to_string(),
            access_token: None,
            branch: "main".to_string(),
            remote_user: "deploy".to_string(),
            remote_host: "203.0.113.9".to_string(),
            key_path: PathBuf::from("/tmp/key"),
            internal_port: 8080,
            remote_dir: "/opt/app".to_string(),
        }
    }

    fn cleanup_config() -> CleanupConfig {
        CleanupConfig {
            remote_user: "deploy".to_string(),
            remote_host: "203.0.113.9".to_string(),
            key_path: PathBuf::from("/tmp/key"),
            remote_dir: "/opt/app".to_string(),
        }
    }

    fn sequencer_with(
        shell: Arc<FakeShell>,
        files: Vec<&'static str>,
        probe: Result<u16, String>,
    ) -> DeploySequencer {
        DeploySequencer::with_capabilities(
            Box::new(FakeGit { files }),
            Box::new(shell),
            Box::new(FakeTransfer),
            Box::new(FakeProbe { result: probe }),
        )
    }

    #[tokio::test]
    async fn happy_path_runs_every_stage_in_order() {
        let shell = Arc::new(FakeShell::new());
        let seq = sequencer_with(shell.clone(), vec!["Dockerfile"], Ok(200));

        let outcome = seq.run(&deploy_config()).await.unwrap();
        assert_eq!(outcome.mode, AppMode::BuildFile);
        assert!(outcome.workdir.join("Dockerfile").is_file());

        let cmds = shell.recorded();
        let pos = |needle: &str| {
            cmds.iter()
                .position(|c| c.contains(needle))
                .unwrap_or_else(|| panic!("missing command containing '{}'", needle))
        };
        // Provision before transfer, build before proxy, check before reload.
        assert!(pos("command -v") < pos("mkdir -p /opt/app"));
        assert!(pos("docker build") < pos("nginx -t"));
        assert!(pos("nginx -t") < pos("reload nginx"));
        assert!(pos("reload nginx") < pos("is-active --quiet nginx"));
    }

    #[tokio::test]
    async fn compose_repo_uses_the_compose_flow() {
        let shell = Arc::new(FakeShell::new());
        let seq = sequencer_with(shell.clone(), vec!["docker-compose.yml"], Ok(200));

        let outcome = seq.run(&deploy_config()).await.unwrap();
        assert_eq!(outcome.mode, AppMode::Compose);

        let cmds = shell.recorded();
        assert!(cmds.iter().any(|c| c.contains("docker compose up -d --build")));
        assert!(!cmds.iter().any(|c| c.contains("docker run -d")));
    }

    #[tokio::test]
    async fn missing_descriptor_fails_before_any_remote_contact() {
        let shell = Arc::new(FakeShell::new());
        let seq = sequencer_with(shell.clone(), vec![], Ok(200));

        let err = seq.run(&deploy_config()).await.unwrap_err();
        assert_eq!(err.exit_code(), 21);
        assert!(shell.recorded().is_empty(), "remote host was contacted");
    }

    #[tokio::test]
    async fn unreachable_target_aborts_before_mutating_anything() {
        let shell = Arc::new(FakeShell::new().unreachable());
        let seq = sequencer_with(shell.clone(), vec!["Dockerfile"], Ok(200));

        let err = seq.run(&deploy_config()).await.unwrap_err();
        assert_eq!(err.exit_code(), 30);
        assert!(shell.recorded().is_empty(), "mutating command was delivered");
    }

    #[tokio::test]
    async fn unsupported_package_manager_is_stage_fatal() {
        let shell = Arc::new(FakeShell::new().without_package_manager());
        let seq = sequencer_with(shell.clone(), vec!["Dockerfile"], Ok(200));

        let err = seq.run(&deploy_config()).await.unwrap_err();
        assert_eq!(err.exit_code(), 40);
    }

    #[tokio::test]
    async fn failed_config_check_never_reloads_the_proxy() {
        let shell = Arc::new(FakeShell::new().fail_matching("nginx -t"));
        let seq = sequencer_with(shell.clone(), vec!["Dockerfile"], Ok(200));

        let err = seq.run(&deploy_config()).await.unwrap_err();
        assert_eq!(err.exit_code(), 70);
        assert!(
            !shell.recorded().iter().any(|c| c.contains("reload nginx")),
            "proxy was reloaded with a broken config"
        );
    }

    #[tokio::test]
    async fn blocked_port_80_fails_validation_with_the_container_left_running() {
        let shell = Arc::new(FakeShell::new());
        let seq = sequencer_with(
            shell.clone(),
            vec!["Dockerfile"],
            Err("connect timeout".to_string()),
        );

        let err = seq.run(&deploy_config()).await.unwrap_err();
        assert_eq!(err.exit_code(), 80);
        assert!(err.remediation().unwrap().contains("port 80"));
        // The container was started and nothing tears it down on failure.
        let cmds = shell.recorded();
        assert!(cmds.iter().any(|c| c.contains("docker run -d")));
        assert!(!cmds.last().unwrap().contains("docker rm"));
    }

    #[tokio::test]
    async fn wrong_external_status_is_fatal_even_when_internal_probe_passes() {
        let shell = Arc::new(FakeShell::new());
        let seq = sequencer_with(shell.clone(), vec!["Dockerfile"], Ok(503));

        let err = seq.run(&deploy_config()).await.unwrap_err();
        assert_eq!(err.exit_code(), 80);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn build_failure_stops_before_proxy_configuration() {
        let shell = Arc::new(FakeShell::new().fail_matching("docker build"));
        let seq = sequencer_with(shell.clone(), vec!["Dockerfile"], Ok(200));

        let err = seq.run(&deploy_config()).await.unwrap_err();
        assert_eq!(err.exit_code(), 60);
        assert!(!shell.recorded().iter().any(|c| c.contains("sites-available")));
    }

    #[tokio::test]
    async fn rerunning_deploy_issues_the_same_converging_commands() {
        let shell = Arc::new(FakeShell::new());
        let seq = sequencer_with(shell.clone(), vec!["Dockerfile"], Ok(200));
        seq.run(&deploy_config()).await.unwrap();
        let first = shell.recorded();

        let shell2 = Arc::new(FakeShell::new());
        let seq2 = sequencer_with(shell2.clone(), vec!["Dockerfile"], Ok(200));
        seq2.run(&deploy_config()).await.unwrap();

        // Same remote command stream both times: teardown-before-run and
        // sole-site install make the second run converge, not accumulate.
        assert_eq!(first, shell2.recorded());
        assert!(first.iter().any(|c| c.contains("docker rm -f")));
        assert!(first.iter().any(|c| c.contains("rm -f /etc/nginx/sites-enabled/*")));
    }

    #[tokio::test]
    async fn cleanup_on_a_virgin_target_succeeds() {
        // Every removal reports "nothing to do"; absence is success.
        let shell = Arc::new(
            FakeShell::new()
                .fail_matching("docker")
                .fail_matching("rm -rf")
                .fail_matching("systemctl stop nginx"),
        );
        let seq = CleanupSequencer::with_shell(Box::new(shell.clone()));

        seq.run(&cleanup_config()).await.unwrap();
        let cmds = shell.recorded();
        assert!(cmds.iter().any(|c| c.contains("rm -rf -- /opt/app")));
        assert!(cmds.iter().any(|c| c.contains("sites-available/deckhand")));
    }

    #[tokio::test]
    async fn cleanup_refuses_a_hostile_project_directory() {
        let shell = Arc::new(FakeShell::new());
        let seq = CleanupSequencer::with_shell(Box::new(shell.clone()));
        let cfg = CleanupConfig {
            remote_dir: "/".to_string(),
            ..cleanup_config()
        };

        let err = seq.run(&cfg).await.unwrap_err();
        assert_eq!(err.exit_code(), 10);
        assert!(shell.recorded().is_empty());
    }

    #[test]
    fn workspace_outlives_its_creation() {
        // The working area is kept for inspection, not dropped with the
        // TempDir handle.
        let path = make_workspace().unwrap();
        assert!(path.is_dir());
        std::fs::remove_dir_all(&path).unwrap();
    }

    #[tokio::test]
    async fn cleanup_aborts_when_the_target_is_unreachable() {
        let shell = Arc::new(FakeShell::new().unreachable());
        let seq = CleanupSequencer::with_shell(Box::new(shell.clone()));

        let err = seq.run(&cleanup_config()).await.unwrap_err();
        assert_eq!(err.exit_code(), 30);
        assert!(shell.recorded().is_empty());
    }
}
