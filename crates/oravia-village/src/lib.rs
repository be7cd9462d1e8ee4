//! Combat resolution and village state transitions.
//!
//! The functions in this crate are the bodies of store transactions. They
//! take a [`Village`](oravia_types::Village) as read, mutate it into the
//! state to commit, or reject with an [`ActionError`] and leave the commit
//! to be aborted.
//!
//! # Modules
//!
//! - [`combat`] -- Deterministic battle resolution and loot.
//! - [`queue`] -- The construction queue and completion of due orders.
//! - [`actions`] -- Upgrade, recruit, and troop dispatch.
//! - [`settlement`] -- Exactly-once application of arrived commands, and the
//!   reports and return leg derived from a battle.
//! - [`error`] -- The [`ActionError`] rejection type.

pub mod actions;
pub mod combat;
pub mod error;
pub mod queue;
pub mod settlement;

pub use actions::{catch_up, dispatch_troops, recruit_unit, upgrade_building};
pub use combat::resolve;
pub use error::ActionError;
pub use queue::{POINTS_PER_LEVEL, settle_construction};
pub use settlement::{
    Applied, apply_battle, apply_return, battle_report, close_settlement, expire_settlements,
    return_command, unclosed_settlements,
};
