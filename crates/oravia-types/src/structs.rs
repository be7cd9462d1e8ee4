//! Core records persisted by the store: villages, commands, reports, tribes.
//!
//! Records are plain data. The formulas that change them live in
//! `oravia-world` (economy, travel) and `oravia-village` (combat and the
//! transaction bodies of player actions).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{BattleStatus, BuildingType, CommandKind, ReportKind, Resource, UnitType, Winner};
use crate::ids::{CommandId, ReportId, TribeId, UserId, VillageId};

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// A map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coords {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Coords {
    /// Create a coordinate pair.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl core::fmt::Display for Coords {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}|{})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// An amount of each resource. Used for costs, loot, and carried goods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Resources {
    /// Wood.
    pub wood: u64,
    /// Stone.
    pub stone: u64,
    /// Iron.
    pub iron: u64,
}

impl Resources {
    /// No resources at all.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Create an amount from its three components.
    pub const fn new(wood: u64, stone: u64, iron: u64) -> Self {
        Self { wood, stone, iron }
    }

    /// Quantity of one resource.
    pub const fn get(&self, resource: Resource) -> u64 {
        match resource {
            Resource::Wood => self.wood,
            Resource::Stone => self.stone,
            Resource::Iron => self.iron,
        }
    }

    /// Overwrite the quantity of one resource.
    pub const fn set(&mut self, resource: Resource, value: u64) {
        match resource {
            Resource::Wood => self.wood = value,
            Resource::Stone => self.stone = value,
            Resource::Iron => self.iron = value,
        }
    }

    /// Sum of all three quantities (saturating).
    pub const fn total(&self) -> u64 {
        self.wood.saturating_add(self.stone).saturating_add(self.iron)
    }

    /// Whether every component is zero.
    pub const fn is_zero(&self) -> bool {
        self.wood == 0 && self.stone == 0 && self.iron == 0
    }

    /// Whether `self` has at least `other` of every resource.
    pub const fn covers(&self, other: &Self) -> bool {
        self.wood >= other.wood && self.stone >= other.stone && self.iron >= other.iron
    }

    /// Component-wise subtraction, `None` if any component would go negative.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        Some(Self {
            wood: self.wood.checked_sub(other.wood)?,
            stone: self.stone.checked_sub(other.stone)?,
            iron: self.iron.checked_sub(other.iron)?,
        })
    }

    /// Component-wise addition (saturating).
    #[must_use]
    pub const fn saturating_add(&self, other: &Self) -> Self {
        Self {
            wood: self.wood.saturating_add(other.wood),
            stone: self.stone.saturating_add(other.stone),
            iron: self.iron.saturating_add(other.iron),
        }
    }

    /// Multiply every component, `None` on overflow.
    pub fn checked_mul(&self, factor: u64) -> Option<Self> {
        Some(Self {
            wood: self.wood.checked_mul(factor)?,
            stone: self.stone.checked_mul(factor)?,
            iron: self.iron.checked_mul(factor)?,
        })
    }
}

/// A village's stockpile: quantities reconciled as of `last_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Stockpile {
    /// Wood on hand at `last_update`.
    pub wood: u64,
    /// Stone on hand at `last_update`.
    pub stone: u64,
    /// Iron on hand at `last_update`.
    pub iron: u64,
    /// Instant the quantities were last reconciled. Never decreases.
    pub last_update: DateTime<Utc>,
}

impl Stockpile {
    /// Build a stockpile from an amount and a reconciliation instant.
    pub const fn from_amounts(amounts: Resources, last_update: DateTime<Utc>) -> Self {
        Self {
            wood: amounts.wood,
            stone: amounts.stone,
            iron: amounts.iron,
            last_update,
        }
    }

    /// The quantities without the timestamp.
    pub const fn amounts(&self) -> Resources {
        Resources::new(self.wood, self.stone, self.iron)
    }
}

// ---------------------------------------------------------------------------
// Armies and buildings
// ---------------------------------------------------------------------------

/// Unit counts keyed by unit type. Absent types count as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Army(pub BTreeMap<UnitType, u32>);

impl Army {
    /// An army with no units.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// A garrison table listing every unit type at zero.
    pub fn garrison() -> Self {
        UnitType::ALL.iter().map(|&unit| (unit, 0)).collect()
    }

    /// Count of one unit type.
    pub fn get(&self, unit: UnitType) -> u32 {
        self.0.get(&unit).copied().unwrap_or(0)
    }

    /// Overwrite the count of one unit type.
    pub fn set(&mut self, unit: UnitType, count: u32) {
        self.0.insert(unit, count);
    }

    /// Iterate over `(unit, count)` pairs, including zero counts.
    pub fn iter(&self) -> impl Iterator<Item = (UnitType, u32)> + '_ {
        self.0.iter().map(|(&unit, &count)| (unit, count))
    }

    /// Whether the army has no units at all.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|&count| count == 0)
    }

    /// Total number of units.
    pub fn total(&self) -> u64 {
        self.0
            .values()
            .fold(0_u64, |acc, &count| acc.saturating_add(u64::from(count)))
    }

    /// Add another army's counts into a copy of this one (saturating).
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (unit, count) in other.iter() {
            let current = merged.get(unit);
            merged.set(unit, current.saturating_add(count));
        }
        merged
    }

    /// The first unit type for which `requested` exceeds this army, as
    /// `(unit, requested, available)`.
    pub fn shortfall(&self, requested: &Self) -> Option<(UnitType, u32, u32)> {
        requested.iter().find_map(|(unit, wanted)| {
            let available = self.get(unit);
            (wanted > available).then_some((unit, wanted, available))
        })
    }

    /// Remove `other` from a copy of this army, `None` if any count would go
    /// negative.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        let mut rest = self.clone();
        for (unit, count) in other.iter() {
            let left = rest.get(unit).checked_sub(count)?;
            rest.set(unit, left);
        }
        Some(rest)
    }
}

impl FromIterator<(UnitType, u32)> for Army {
    fn from_iter<I: IntoIterator<Item = (UnitType, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Building levels keyed by building type. Absent types are level 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BuildingLevels(pub BTreeMap<BuildingType, u32>);

impl BuildingLevels {
    /// Level of one building.
    pub fn get(&self, building: BuildingType) -> u32 {
        self.0.get(&building).copied().unwrap_or(0)
    }

    /// Overwrite the level of one building.
    pub fn set(&mut self, building: BuildingType, level: u32) {
        self.0.insert(building, level);
    }
}

impl FromIterator<(BuildingType, u32)> for BuildingLevels {
    fn from_iter<I: IntoIterator<Item = (BuildingType, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Village
// ---------------------------------------------------------------------------

/// A paid-for building upgrade waiting to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConstructionOrder {
    /// Building being upgraded.
    pub building: BuildingType,
    /// Level the building reaches when the order completes.
    pub target_level: u32,
    /// Instant the order completes.
    pub completes_at: DateTime<Utc>,
}

/// Result of a battle, as computed by the combat resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BattleOutcome {
    /// Side that won.
    pub winner: Winner,
    /// Attacking units killed, per type.
    pub attacker_losses: Army,
    /// Attacking units left alive, per type.
    pub attacker_remaining: Army,
    /// Defending units killed, per type.
    pub defender_losses: Army,
    /// Defending units left alive, per type.
    pub defender_remaining: Army,
    /// Resources taken from the defender.
    pub loot: Resources,
    /// Colour-coded summary.
    pub status: BattleStatus,
}

/// Journal entry recording that a command's effects were applied to a village.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Settlement {
    /// Instant the effects were committed.
    pub settled_at: DateTime<Utc>,
    /// Battle result for attack commands; `None` for returns.
    pub outcome: Option<BattleOutcome>,
    /// Instant the command record was seen deleted. Only closed entries
    /// expire.
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

/// A player-owned settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Village {
    /// Stable key.
    pub id: VillageId,
    /// Owning player.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// Map position, unique among active villages.
    pub coords: Coords,
    /// Score. Never decreases.
    pub points: u64,
    /// Stockpile as of `resources.last_update`.
    pub resources: Stockpile,
    /// Building levels.
    pub buildings: BuildingLevels,
    /// Units at home.
    pub troops: Army,
    /// Tribe membership back-reference.
    #[serde(default)]
    pub tribe_id: Option<TribeId>,
    /// Paid upgrades waiting to complete, in completion order.
    #[serde(default)]
    pub build_queue: Vec<ConstructionOrder>,
    /// Commands whose effects have already been applied here.
    #[serde(default)]
    pub settlements: BTreeMap<CommandId, Settlement>,
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// An army in transit. Immutable after creation; deleted once processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Command {
    /// Stable key.
    pub id: CommandId,
    /// Attack or return trip.
    pub kind: CommandKind,
    /// Village the army left from.
    pub origin_id: VillageId,
    /// Village the army arrives at.
    pub target_id: VillageId,
    /// Position of the arrival village.
    pub target_coords: Coords,
    /// Travelling units.
    pub units: Army,
    /// Departure instant.
    pub start_time: DateTime<Utc>,
    /// Arrival instant.
    pub arrival_time: DateTime<Utc>,
    /// Carried loot (return trips only).
    #[serde(default)]
    pub resources: Option<Resources>,
}

impl Command {
    /// Whether the command has arrived at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.arrival_time <= now
    }

    /// One-way travel time of this movement.
    pub fn trip_duration(&self) -> Duration {
        self.arrival_time.signed_duration_since(self.start_time)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A battle report delivered to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Report {
    /// Stable key, derived from the command and side.
    pub id: ReportId,
    /// Which side this copy belongs to.
    pub kind: ReportKind,
    /// Attack command that produced the battle.
    pub command_id: CommandId,
    /// Instant the battle was resolved.
    pub timestamp: DateTime<Utc>,
    /// Attacking village.
    pub attacker_id: VillageId,
    /// Defending village.
    pub defender_id: VillageId,
    /// Side that won.
    pub winner: Winner,
    /// Attacking units killed.
    pub attacker_losses: Army,
    /// Defending units killed.
    pub defender_losses: Army,
    /// Resources taken.
    pub loot: Resources,
    /// Colour-coded summary.
    pub status: BattleStatus,
    /// Whether the owner has opened the report.
    pub is_read: bool,
}

// ---------------------------------------------------------------------------
// Tribe
// ---------------------------------------------------------------------------

/// A player grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Tribe {
    /// Stable key.
    pub id: TribeId,
    /// Full name.
    pub name: String,
    /// Short upper-case tag.
    pub tag: String,
    /// Founding player.
    pub owner_id: UserId,
    /// Member players.
    pub members: BTreeSet<UserId>,
}
