//! Identities of agents, clusters and sources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved source identity addressing every source.
pub const SOURCE_ALL: &str = "*";

/// Reserved cluster identity addressing every cluster.
pub const CLUSTER_ALL: &str = "*";

/// Characters that would split or widen a topic level.
pub const RESERVED_CHARACTERS: [char; 4] = ['.', '/', '+', '#'];

/// Opaque, non-empty name of an agent, cluster or source.
///
/// An identity fills exactly one topic level, so it may not contain the
/// level separator or a broker wildcard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Create an identity.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or contains a reserved character.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IdentityError::Empty);
        }
        if let Some(reserved) = name.chars().find(|c| RESERVED_CHARACTERS.contains(c)) {
            return Err(IdentityError::ReservedCharacter { name, reserved });
        }
        Ok(Self(name))
    }

    /// The reserved identity addressing all sources.
    #[must_use]
    pub fn source_all() -> Self {
        Self(SOURCE_ALL.to_string())
    }

    /// The reserved identity addressing all clusters.
    #[must_use]
    pub fn cluster_all() -> Self {
        Self(CLUSTER_ALL.to_string())
    }

    /// Whether this is the reserved "all" identity.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.0 == SOURCE_ALL
    }

    /// Borrow the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Identity {
    type Error = IdentityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

/// Errors for identity construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Identity was empty
    #[error("identity must not be empty")]
    Empty,
    /// Identity contains a topic separator or wildcard
    #[error("identity {name:?} contains reserved character {reserved:?}")]
    ReservedCharacter {
        /// Rejected name
        name: String,
        /// First reserved character found
        reserved: char,
    },
}
