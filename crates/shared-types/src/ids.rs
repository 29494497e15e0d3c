//! # Identifiers
//!
//! String-backed identifiers for subjects (users, machines), groups and
//! consensus replicas, plus the UUID v7 `CorrelationId` used to match an
//! on-chain submission with its commit.
//!
//! Subject and group ids may carry an origin suffix (`alice@node-b`). The part
//! after the last `@` names the node that owns the subject; ids without a
//! suffix belong to the local node.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw id.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw id.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the id is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Owning node of this id, if the id carries an `@origin` suffix.
            pub fn origin(&self) -> Option<&str> {
                self.0
                    .rsplit_once('@')
                    .map(|(_, origin)| origin)
                    .filter(|origin| !origin.is_empty())
            }

            /// True when the id belongs to `local_origin` (or has no origin at all).
            pub fn is_local_to(&self, local_origin: &str) -> bool {
                self.origin().map_or(true, |origin| origin == local_origin)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// A subject that can receive signals: a connected user session or a
    /// sandboxed machine.
    UserId
);

string_id!(
    /// A named group (point, room, workspace). Subgroups share the same type.
    GroupId
);

string_id!(
    /// A consensus replica taking part in on-chain execution.
    ReplicaId
);

/// Correlation ID tying an on-chain submission to its commit resolution.
///
/// UUID v7 keeps ids time-ordered, which makes callback tables and logs easy
/// to read in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new correlation ID (UUID v7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from the hyphenated string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
