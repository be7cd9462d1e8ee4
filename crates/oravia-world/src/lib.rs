//! World rules and the pure formulas of the Oravia economy.
//!
//! Everything here is deterministic and side-effect free. Callers pass a
//! [`WorldRules`] value explicitly; the same functions serve the UI
//! projection and the authoritative transaction bodies.
//!
//! # Modules
//!
//! - [`rules`] -- Tunable constants and unit/building stat tables.
//! - [`economy`] -- Upgrade costs, production, storage and population caps,
//!   and time-continuous resource accrual.
//! - [`travel`] -- Map distance and army travel time.
//! - [`error`] -- Rule validation errors.

pub mod economy;
pub mod error;
pub mod rules;
pub mod travel;

pub use economy::{
    Projection, UpgradeCost, accrue, max_population, predict, production_rate, recruit_cost,
    storage_capacity, upgrade_cost, used_population,
};
pub use error::WorldError;
pub use rules::{BuildingStats, BuildingTable, UnitStats, UnitTable, WorldRules};
pub use travel::{army_travel_duration, distance, slowest_speed, travel_duration};
