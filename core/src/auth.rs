use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Identity every stored record is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Identity for an email/password account. Emails are case-insensitive.
    pub fn from_email(email: &str) -> Result<Self> {
        let email = email.trim().to_lowercase();
        let Some((local, domain)) = email.split_once('@') else {
            bail!("Invalid email '{email}'");
        };
        if local.is_empty()
            || domain.contains('@')
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
            || email.chars().any(char::is_whitespace)
        {
            bail!("Invalid email '{email}'");
        }
        Ok(Self(email))
    }

    /// Identity handed out by an external provider, e.g. `google:1234`.
    pub fn from_provider(provider: &str, subject: &str) -> Result<Self> {
        let provider = provider.trim().to_lowercase();
        let subject = subject.trim();
        if provider.is_empty() || subject.is_empty() || provider.contains(':') {
            bail!("Invalid provider identity '{provider}:{subject}'");
        }
        Ok(Self(format!("{provider}:{subject}")))
    }

    /// Restore an identity that was previously produced by this type.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.contains('@') {
            return Self::from_email(s);
        }
        match s.split_once(':') {
            Some((provider, subject)) => Self::from_provider(provider, subject),
            None => bail!("Invalid user identity '{s}'"),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "user", rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Unauthenticated,
    SignedIn(UserId),
}

impl AuthState {
    pub fn require(&self) -> Result<&UserId> {
        match self {
            Self::SignedIn(user) => Ok(user),
            Self::Unauthenticated => bail!("Not signed in. Use `heft login <email>` first"),
        }
    }
}

/// Observable authentication state.
pub struct AuthSession {
    state: watch::Sender<AuthState>,
}

impl AuthSession {
    #[must_use]
    pub fn new(initial: AuthState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    pub fn sign_in(&self, user: UserId) {
        tracing::info!(user = %user, "signed in");
        self.state.send_replace(AuthState::SignedIn(user));
    }

    pub fn sign_out(&self) {
        let previous = self.state.send_replace(AuthState::Unauthenticated);
        if let AuthState::SignedIn(user) = previous {
            tracing::info!(user = %user, "signed out");
        }
    }

    #[must_use]
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every later sign-in and sign-out.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new(AuthState::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_from_email() {
        let id = UserId::from_email("  Ana@Example.COM ").unwrap();
        assert_eq!(id.as_str(), "ana@example.com");
    }

    #[test]
    fn test_user_id_rejects_bad_email() {
        for bad in ["", "ana", "@example.com", "ana@", "ana@example", "a@b@c.com", "a b@c.com", "ana@.com"] {
            assert!(UserId::from_email(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_user_id_from_provider() {
        let id = UserId::from_provider("Google", "10987").unwrap();
        assert_eq!(id.as_str(), "google:10987");
        assert!(UserId::from_provider("", "1").is_err());
        assert!(UserId::from_provider("google", " ").is_err());
    }

    #[test]
    fn test_user_id_parse_roundtrip() {
        let email = UserId::from_email("ana@example.com").unwrap();
        assert_eq!(UserId::parse(email.as_str()).unwrap(), email);
        let google = UserId::from_provider("google", "42").unwrap();
        assert_eq!(UserId::parse(google.as_str()).unwrap(), google);
        assert!(UserId::parse("nobody").is_err());
    }

    #[test]
    fn test_require_signed_in() {
        assert!(AuthState::Unauthenticated.require().is_err());
        let user = UserId::from_email("ana@example.com").unwrap();
        let state = AuthState::SignedIn(user.clone());
        assert_eq!(state.require().unwrap(), &user);
    }

    #[tokio::test]
    async fn test_session_notifies_subscribers() {
        let session = AuthSession::default();
        let mut rx = session.subscribe();
        assert_eq!(*rx.borrow(), AuthState::Unauthenticated);

        let user = UserId::from_email("ana@example.com").unwrap();
        session.sign_in(user.clone());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AuthState::SignedIn(user));

        session.sign_out();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AuthState::Unauthenticated);
        assert_eq!(session.current(), AuthState::Unauthenticated);
    }
}
