// src/sys/secrets.rs

use secrecy::{ExposeSecret, Secret};
use zeroize::Zeroize;

/// AccessCredential is an ephemeral, memory-safe wrapper for the optional
/// repository access token collected at the prompt.
///
/// 1. It cannot be accidentally logged (no `Display`, `Debug` prints `[REDACTED]`).
/// 2. When it goes out of scope the backing memory is zeroized, so the token
///    does not survive in RAM past the end of the run.
pub struct AccessCredential {
    token: Secret<String>,
}

impl AccessCredential {
    /// Takes ownership of the raw token so the plaintext is never duplicated;
    /// the moved allocation is the one that gets zeroized on drop.
    pub fn new(raw_token: String) -> Self {
        Self {
            token: Secret::new(raw_token),
        }
    }

    /// Exposes the token to a closure for a fleeting moment (writing the
    /// askpass helper). The borrow cannot escape the closure.
    pub fn use_secret<F, R>(&self, action: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        action(self.token.expose_secret())
    }

    /// Wraps a prompt answer, scrubbing the source string. Empty answers mean
    /// "no credential".
    pub fn from_prompt(mut raw: String) -> Option<Self> {
        if raw.trim().is_empty() {
            raw.zeroize();
            return None;
        }
        let cred = Self::new(raw.clone());
        raw.zeroize();
        Some(cred)
    }
}

impl std::fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessCredential([REDACTED])")
    }
}
