//! Closed enumerations for the Oravia simulation kernel.
//!
//! Building and unit kinds are closed sets so that every stat table and
//! every match over them is checked for exhaustiveness at compile time.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A stockpiled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Resource {
    /// Produced by the timber camp.
    Wood,
    /// Produced by the clay pit.
    Stone,
    /// Produced by the iron mine.
    Iron,
}

impl Resource {
    /// Every resource, in display order.
    pub const ALL: [Self; 3] = [Self::Wood, Self::Stone, Self::Iron];

    /// The building whose level sets this resource's production rate.
    pub const fn producer(self) -> BuildingType {
        match self {
            Self::Wood => BuildingType::TimberCamp,
            Self::Stone => BuildingType::ClayPit,
            Self::Iron => BuildingType::IronMine,
        }
    }
}

// ---------------------------------------------------------------------------
// Buildings
// ---------------------------------------------------------------------------

/// A building that exists in every village at some level (0 = not built).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum BuildingType {
    /// Village centre.
    Headquarters,
    /// Produces wood.
    TimberCamp,
    /// Produces stone.
    ClayPit,
    /// Produces iron.
    IronMine,
    /// Sets the storage cap for every resource.
    Warehouse,
    /// Sets the population cap.
    Farm,
    /// Trains troops.
    Barracks,
    /// Adds the fortification bonus to the defence.
    Wall,
}

impl BuildingType {
    /// Every building type.
    pub const ALL: [Self; 8] = [
        Self::Headquarters,
        Self::TimberCamp,
        Self::ClayPit,
        Self::IronMine,
        Self::Warehouse,
        Self::Farm,
        Self::Barracks,
        Self::Wall,
    ];
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// A troop type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum UnitType {
    /// Cheap defensive infantry.
    Spear,
    /// Heavy defensive infantry.
    Sword,
    /// Offensive infantry.
    Axe,
    /// Fast, unarmed, carries nothing.
    Scout,
    /// Light cavalry.
    Light,
}

impl UnitType {
    /// Every unit type.
    pub const ALL: [Self; 5] = [Self::Spear, Self::Sword, Self::Axe, Self::Scout, Self::Light];
}

// ---------------------------------------------------------------------------
// Commands and reports
// ---------------------------------------------------------------------------

/// The kind of an in-flight army movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CommandKind {
    /// Outbound attack on another village.
    Attack,
    /// Survivors (and loot) travelling home.
    Return,
}

/// Side that won a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Winner {
    /// The attacking force has survivors.
    Attacker,
    /// The attacking force was wiped out.
    Defender,
}

/// Which side of a battle a report was written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ReportKind {
    /// Copy delivered to the owner of the attacking village.
    AttackSent,
    /// Copy delivered to the owner of the defending village.
    Defense,
}

/// Colour-coded summary of a battle, from the attacker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum BattleStatus {
    /// Won without losses.
    Green,
    /// Won with losses.
    Yellow,
    /// Lost.
    Red,
}
