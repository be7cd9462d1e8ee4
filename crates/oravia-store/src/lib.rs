//! Versioned record store for the Oravia simulation kernel.
//!
//! The kernel never holds locks across records. Every write to a shared
//! record goes through [`Store::transact`], an optimistic read-modify-write
//! that re-runs its body when another writer got there first.
//!
//! # Modules
//!
//! - [`store`] -- The [`Store`] contract, change feed, and [`Subscription`]
//! - [`memory`] -- In-process backend for tests and single-node runs
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) backend with Lua
//!   compare-and-set commits
//! - [`keys`] -- Key layout of every record type
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod keys;
pub mod memory;
pub mod store;

// Re-export primary types for convenience.
pub use dragonfly::DragonflyStore;
pub use error::{StoreError, TxError};
pub use memory::MemoryStore;
pub use store::{CHANGE_CAPACITY, Change, Store, Subscription};
