//! Outbound token selection for a single request.

/// Which credential a [`RequestCredentials`] currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// The application's own token.
    Application,
    /// The authenticated user's grant token.
    User,
}

/// Token every outbound platform call for one request must use.
///
/// Starts out holding the application token. A successful authentication
/// gate switches it to the user's grant token, and it never switches back.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestCredentials {
    token: String,
    source: TokenSource,
}

impl RequestCredentials {
    /// Credentials holding the application token.
    pub fn application(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            source: TokenSource::Application,
        }
    }

    /// Replace the active token with the user's grant token.
    pub fn switch_to_user(&mut self, token: impl Into<String>) {
        self.token = token.into();
        self.source = TokenSource::User;
    }

    /// The token to attach to outbound calls.
    pub fn access_token(&self) -> &str {
        &self.token
    }

    pub fn source(&self) -> TokenSource {
        self.source
    }

    pub fn is_user(&self) -> bool {
        self.source == TokenSource::User
    }
}

impl std::fmt::Debug for RequestCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCredentials")
            .field("token", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_to_user() {
        let mut credentials = RequestCredentials::application("123|secret");
        assert_eq!(credentials.access_token(), "123|secret");
        assert!(!credentials.is_user());

        credentials.switch_to_user("user-token");
        assert_eq!(credentials.access_token(), "user-token");
        assert_eq!(credentials.source(), TokenSource::User);
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", RequestCredentials::application("123|secret"));
        assert!(!debug.contains("secret"));
    }
}
