//! Account identity as seen by the catcher.
//!
//! Credential storage and connection bootstrap live outside this crate; an
//! [`Account`] only carries what the session logic needs to recognise its own
//! messages and to hand an opaque credential to the challenge solver.

use crate::config::AccountConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle for a registered account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Clone)]
pub struct Account {
    pub id: AccountId,
    /// Platform user id, matched against mentions and reply references.
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    credential: Option<String>,
}

impl Account {
    pub fn new(
        id: impl Into<AccountId>,
        user_id: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            username: username.into(),
            display_name: None,
            credential: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Name the game bot prints in balance embeds.
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(self.username.as_str())
    }

    /// Opaque bootstrap credential; only the challenge solver reads it.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .finish()
    }
}

impl From<&AccountConfig> for Account {
    fn from(config: &AccountConfig) -> Self {
        Self {
            id: AccountId::new(config.id.clone()),
            user_id: config.user_id.clone(),
            username: config.username.clone(),
            display_name: config.display_name.clone(),
            credential: config.credential.clone(),
        }
    }
}
