// src/error.rs

use thiserror::Error;

/// Stage-scoped failure taxonomy. Every variant aborts the whole run and maps
/// to its own exit-code range so wrapper tooling can tell the stages apart.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    #[error("Source sync failed: {0}")]
    SourceControl(String),

    /// The repository fetched fine but contains neither a Dockerfile nor a
    /// compose file. Kept separate from `SourceControl` so operators can tell
    /// a network/auth problem from a content problem.
    #[error("No application descriptor found: {0}")]
    NoDescriptor(String),

    #[error("Remote target unreachable: {0}")]
    Connectivity(String),

    #[error("Remote provisioning failed: {0}")]
    Provisioning(String),

    #[error("Artifact transfer failed: {0}")]
    Transfer(String),

    #[error("Remote build/run failed: {0}")]
    RemoteBuild(String),

    #[error("Reverse-proxy configuration failed: {0}")]
    ProxyConfig(String),

    #[error("Post-deploy validation failed: {0}")]
    Validation(String),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl DeployError {
    /// One decade per failure class; 21 distinguishes "repo had no usable
    /// descriptor" within the source-control range.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::InvalidInput(_) => 10,
            DeployError::SourceControl(_) => 20,
            DeployError::NoDescriptor(_) => 21,
            DeployError::Connectivity(_) => 30,
            DeployError::Provisioning(_) => 40,
            DeployError::Transfer(_) => 50,
            DeployError::RemoteBuild(_) => 60,
            DeployError::ProxyConfig(_) => 70,
            DeployError::Validation(_) => 80,
            DeployError::Unexpected(_) => 1,
        }
    }

    /// Stage label used in structured log events.
    pub fn stage(&self) -> &'static str {
        match self {
            DeployError::InvalidInput(_) => "input",
            DeployError::SourceControl(_) | DeployError::NoDescriptor(_) => "source-sync",
            DeployError::Connectivity(_) => "connectivity",
            DeployError::Provisioning(_) => "provision",
            DeployError::Transfer(_) => "transfer",
            DeployError::RemoteBuild(_) => "build-run",
            DeployError::ProxyConfig(_) => "proxy",
            DeployError::Validation(_) => "validate",
            DeployError::Unexpected(_) => "unexpected",
        }
    }

    /// Operator-facing followup, mirrored to the terminal under the error.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            DeployError::Connectivity(_) => Some(
                "Verify the host address, the remote username, and that the key is authorized for non-interactive login.",
            ),
            DeployError::Provisioning(_) => Some(
                "Only apt, dnf and yum hosts are supported; provision docker, the compose plugin and nginx manually otherwise.",
            ),
            DeployError::Validation(_) => Some(
                "If the application answers on its internal port, the remote firewall or cloud security policy is likely blocking inbound port 80.",
            ),
            _ => None,
        }
    }
}
