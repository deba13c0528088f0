// src/sys/traits.rs

use async_trait::async_trait;
use std::path::Path;

use crate::sys::secrets::AccessCredential;

// ==============================================================================
// 1. Source Control
// ==============================================================================

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Fetches the named branch into a fresh, empty target directory.
    /// An optional access credential authenticates https transports; it is
    /// exposed only inside the implementation and never echoed in errors.
    async fn sync_source(
        &self,
        repo_url: &str,
        branch: &str,
        token: Option<&AccessCredential>,
        target_dir: &Path,
    ) -> Result<(), String>;
}

/// How the fetched repository containerizes. Detected once after source sync
/// and immutable for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// A single `Dockerfile` at the repository root: one image, one container.
    BuildFile,
    /// A compose file at the root: a multi-service stack.
    Compose,
}

impl std::fmt::Display for AppMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppMode::BuildFile => write!(f, "build-file"),
            AppMode::Compose => write!(f, "compose"),
        }
    }
}

// ==============================================================================
// 2. Remote Execution
// ==============================================================================

/// Captured result of one remote command.
#[derive(Debug, Clone)]
pub struct RemoteOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Runs one shell script on the remote target, blocking until it exits.
    /// `Err` means the command could not be delivered at all (spawn or
    /// connection failure); a delivered-but-failed command is `Ok` with a
    /// non-zero exit code.
    async fn run(&self, script: &str) -> Result<RemoteOutput, String>;

    /// Non-interactive, non-mutating reachability probe. Must never prompt
    /// and must not touch remote state.
    async fn check_connectivity(&self) -> Result<(), String>;
}

// ==============================================================================
// 3. File Transfer
// ==============================================================================

#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Synchronizes the local working tree into the remote directory,
    /// excluding version-control metadata and dependency caches. The remote
    /// directory must already exist with the right ownership.
    async fn sync_tree(&self, local_dir: &Path, remote_dir: &str) -> Result<(), String>;
}

// ==============================================================================
// 4. HTTP Probing
// ==============================================================================

#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Returns the HTTP status code for a GET of `url`, or `Err` on any
    /// connection-level failure.
    async fn status(&self, url: &str) -> Result<u16, String>;
}
