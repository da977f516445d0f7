//! Strongly-typed identifiers shared across the domain crates.
//!
//! Every id wraps a UUIDv7, so creation order is roughly recoverable from the
//! bytes, and serializes transparently as the bare uuid. Domain crates layer
//! their own newtypes on top of [`AggregateId`] (`PartId`, `CycleCountId`).

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s)
                    .map(Self)
                    .map_err(|e| {
                        DomainError::invalid_id(format!(concat!(stringify!($name), ": {}"), e))
                    })
            }
        }
    };
}

uuid_id! {
    /// Tenant boundary. Every stream, projection row and background job is
    /// scoped by one; nothing crosses it.
    TenantId
}

uuid_id! {
    /// Stream identity of one aggregate instance, shared by all of its
    /// events regardless of domain type.
    AggregateId
}
