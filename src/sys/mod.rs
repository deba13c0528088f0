// Capability seams are the contracts; concrete managers drive external tools.

pub mod traits;     // Global contracts
pub mod secrets;    // Memory hygiene (AccessCredential)
pub mod git;        // Source control & descriptor detection
pub mod ssh;        // Remote execution (OpenSSH)
pub mod transfer;   // Artifact transfer (rsync/scp)
pub mod provision;  // Remote environment convergence
pub mod runtime;    // Container build & run
pub mod proxy;      // Ingress (nginx)
pub mod probe;      // HTTP validation
