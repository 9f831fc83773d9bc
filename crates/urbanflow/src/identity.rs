//! Signed-in identity.

use serde::{Deserialize, Serialize};

use crate::config::IdentityConfig;

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id.
    pub uid: String,
    /// Email, when known.
    pub email: Option<String>,
}

/// Source of the current identity.
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// The signed-in user, or `None` when anonymous.
    fn current(&self) -> Option<Identity>;
}

/// Identity taken from the `[identity]` configuration section.
#[derive(Debug, Clone, Default)]
pub struct ConfigIdentity {
    identity: Option<Identity>,
}

impl ConfigIdentity {
    /// Build from configuration. A missing or blank uid is anonymous.
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        let identity = config
            .uid
            .as_deref()
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
            .map(|uid| Identity {
                uid: uid.to_string(),
                email: config.email.clone(),
            });
        Self { identity }
    }

    /// An always-anonymous provider.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl IdentityProvider for ConfigIdentity {
    fn current(&self) -> Option<Identity> {
        self.identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_identity() {
        let provider = ConfigIdentity::new(&IdentityConfig {
            uid: Some("u1".to_string()),
            email: Some("a@example.com".to_string()),
        });
        let identity = provider.current().unwrap();
        assert_eq!(identity.uid, "u1");
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn test_blank_uid_is_anonymous() {
        let provider = ConfigIdentity::new(&IdentityConfig {
            uid: Some("  ".to_string()),
            email: None,
        });
        assert!(provider.current().is_none());
        assert!(ConfigIdentity::anonymous().current().is_none());
    }
}
