//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Records created by a player action use UUID v7 (time-ordered). Records
//! created by the scheduler as a consequence of another record (reports, the
//! return leg of an attack) use UUID v5 derived from the parent id, so that
//! replaying the same work always produces the same key.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Derive a stable identifier from a parent id and a label.
            ///
            /// The same `(parent, label)` pair always yields the same id.
            pub fn derived(parent: Uuid, label: &str) -> Self {
                Self(Uuid::new_v5(&parent, label.as_bytes()))
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a village.
    VillageId
}

define_id! {
    /// Unique identifier for an in-flight army movement.
    CommandId
}

define_id! {
    /// Unique identifier for a battle report.
    ReportId
}

define_id! {
    /// Unique identifier for a tribe.
    TribeId
}

define_id! {
    /// Identifier of a player account, issued by the external identity layer.
    UserId
}
