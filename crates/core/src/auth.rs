use serde::{Deserialize, Serialize};

use crate::PrincipalId;

/// Actor on whose behalf an authorization decision is made.
///
/// Credentials are verified upstream; this type only carries the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    /// Unauthenticated caller. Holds no explicit or group grant.
    Anonymous,
    /// Authenticated caller identified by a verified principal id.
    Authenticated(PrincipalId),
}

impl Principal {
    /// Creates an authenticated principal from a raw id.
    pub fn authenticated(value: impl Into<String>) -> crate::AppResult<Self> {
        PrincipalId::new(value).map(Self::Authenticated)
    }

    /// Returns the principal id for authenticated callers.
    #[must_use]
    pub fn id(&self) -> Option<&PrincipalId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(principal_id) => Some(principal_id),
        }
    }

    /// Returns whether the caller is anonymous.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl From<PrincipalId> for Principal {
    fn from(value: PrincipalId) -> Self {
        Self::Authenticated(value)
    }
}
