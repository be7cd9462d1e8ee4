//! Shared record definitions for the Oravia simulation kernel.
//!
//! This crate is the single source of truth for the records that flow
//! through the store: villages, in-flight commands, battle reports, and
//! tribes. Types are exported to `TypeScript` via `ts-rs` for the
//! presentation layer.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for every record identifier
//! - [`enums`] -- Closed enumerations (resources, buildings, units, outcomes)
//! - [`structs`] -- Record structs and small value types

pub mod enums;
pub mod ids;
pub mod structs;

pub use enums::{BattleStatus, BuildingType, CommandKind, ReportKind, Resource, UnitType, Winner};
pub use ids::{CommandId, ReportId, TribeId, UserId, VillageId};
pub use structs::{
    Army, BattleOutcome, BuildingLevels, Command, ConstructionOrder, Coords, Report, Resources,
    Settlement, Stockpile, Tribe, Village,
};
