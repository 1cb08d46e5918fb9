use std::fmt;

/// Login progress of the single process-wide identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    /// A request token exists and waits for approval by the user.
    TokenRequested,
    TokenApproved,
    SessionEstablished,
    /// The last login attempt failed; a new one has to start from scratch.
    AuthFailed,
}

impl AuthState {
    pub fn can_begin_login(self) -> bool {
        matches!(
            self,
            AuthState::LoggedOut | AuthState::TokenRequested | AuthState::AuthFailed
        )
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthState::LoggedOut => "logged out",
            AuthState::TokenRequested => "waiting for token approval",
            AuthState::TokenApproved => "token approved",
            AuthState::SessionEstablished => "signed in",
            AuthState::AuthFailed => "login failed",
        };
        f.write_str(label)
    }
}
