use sha2::{Digest, Sha256};

/// Identity material for the remote account.
///
/// Only the authenticator writes these; everybody else gets a clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub request_token: Option<String>,
    pub session_id: Option<String>,
    pub account_id: Option<String>,
}

impl Credentials {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    /// Short, non-reversible tag for the current session, safe to log and to
    /// embed in cache keys.
    pub fn session_fingerprint(&self) -> Option<String> {
        self.session_id.as_deref().map(Self::fingerprint)
    }

    pub fn fingerprint(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }
}
