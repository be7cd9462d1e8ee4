//! World rules: every tunable constant and stat table, as one immutable value.
//!
//! A [`WorldRules`] value is loaded once from configuration and passed by
//! reference into every economic, travel, and combat function. Nothing in
//! the kernel reads these numbers from ambient state, so the UI projection
//! and the authoritative transaction always see the same table.
//!
//! Defaults reproduce the live world: speed 10, storage 1000, base
//! production 30 per hour.

use oravia_types::{BuildingType, Resources, UnitType};
use serde::Deserialize;

use crate::error::WorldError;

/// Per-unit statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnitStats {
    /// Offensive strength per unit.
    pub attack: u32,
    /// Defensive strength per unit.
    pub defense: u32,
    /// Minutes needed to cross one field (larger is slower).
    pub speed: u32,
    /// Recruitment cost per unit.
    pub cost: Resources,
    /// Farm population taken per unit.
    pub pop: u32,
    /// Resources one surviving unit can carry home.
    pub capacity: u32,
}

/// Per-building statistics.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BuildingStats {
    /// Cost of the first level.
    pub base_cost: Resources,
    /// Build time of the first level, in seconds, before world speed.
    pub base_time_secs: u64,
    /// Growth factor applied per existing level.
    pub factor: f64,
}

/// Stat table with one entry per [`UnitType`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitTable {
    /// Spear fighter.
    pub spear: UnitStats,
    /// Swordsman.
    pub sword: UnitStats,
    /// Axeman.
    pub axe: UnitStats,
    /// Scout.
    pub scout: UnitStats,
    /// Light cavalry.
    pub light: UnitStats,
}

impl UnitTable {
    /// Stats for one unit type.
    pub const fn get(&self, unit: UnitType) -> &UnitStats {
        match unit {
            UnitType::Spear => &self.spear,
            UnitType::Sword => &self.sword,
            UnitType::Axe => &self.axe,
            UnitType::Scout => &self.scout,
            UnitType::Light => &self.light,
        }
    }
}

impl Default for UnitTable {
    fn default() -> Self {
        Self {
            spear: UnitStats {
                attack: 10,
                defense: 15,
                speed: 18,
                cost: Resources::new(50, 30, 10),
                pop: 1,
                capacity: 25,
            },
            sword: UnitStats {
                attack: 25,
                defense: 50,
                speed: 22,
                cost: Resources::new(30, 30, 70),
                pop: 1,
                capacity: 15,
            },
            axe: UnitStats {
                attack: 40,
                defense: 10,
                speed: 18,
                cost: Resources::new(60, 30, 40),
                pop: 1,
                capacity: 10,
            },
            scout: UnitStats {
                attack: 0,
                defense: 2,
                speed: 9,
                cost: Resources::new(50, 50, 20),
                pop: 2,
                capacity: 0,
            },
            light: UnitStats {
                attack: 130,
                defense: 30,
                speed: 10,
                cost: Resources::new(125, 100, 250),
                pop: 4,
                capacity: 80,
            },
        }
    }
}

/// Stat table with one entry per [`BuildingType`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildingTable {
    /// Headquarters.
    pub headquarters: BuildingStats,
    /// Timber camp.
    pub timber_camp: BuildingStats,
    /// Clay pit.
    pub clay_pit: BuildingStats,
    /// Iron mine.
    pub iron_mine: BuildingStats,
    /// Warehouse.
    pub warehouse: BuildingStats,
    /// Farm.
    pub farm: BuildingStats,
    /// Barracks.
    pub barracks: BuildingStats,
    /// Wall.
    pub wall: BuildingStats,
}

impl BuildingTable {
    /// Stats for one building type.
    pub const fn get(&self, building: BuildingType) -> &BuildingStats {
        match building {
            BuildingType::Headquarters => &self.headquarters,
            BuildingType::TimberCamp => &self.timber_camp,
            BuildingType::ClayPit => &self.clay_pit,
            BuildingType::IronMine => &self.iron_mine,
            BuildingType::Warehouse => &self.warehouse,
            BuildingType::Farm => &self.farm,
            BuildingType::Barracks => &self.barracks,
            BuildingType::Wall => &self.wall,
        }
    }
}

impl Default for BuildingTable {
    fn default() -> Self {
        let stats = |wood, stone, iron, base_time_secs, factor| BuildingStats {
            base_cost: Resources::new(wood, stone, iron),
            base_time_secs,
            factor,
        };
        Self {
            headquarters: stats(200, 200, 200, 60, 1.2),
            timber_camp: stats(50, 60, 40, 30, 1.25),
            clay_pit: stats(60, 50, 40, 30, 1.25),
            iron_mine: stats(70, 60, 50, 30, 1.25),
            warehouse: stats(100, 100, 0, 40, 1.2),
            farm: stats(100, 100, 50, 40, 1.3),
            barracks: stats(200, 150, 100, 120, 1.2),
            wall: stats(100, 200, 50, 60, 1.3),
        }
    }
}

/// The complete rule set of a world.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorldRules {
    /// Compresses real time into game time for production, building, and travel.
    #[serde(default = "default_speed_multiplier")]
    pub speed_multiplier: f64,

    /// Storage cap at warehouse level 0.
    #[serde(default = "default_base_storage")]
    pub base_storage: u64,

    /// Hourly production of a level 0 resource building, before world speed.
    #[serde(default = "default_base_production")]
    pub base_production: u64,

    /// Farm population at level 1.
    #[serde(default = "default_pop_base")]
    pub pop_base: u64,

    /// Flat defence granted by a level 0 wall.
    #[serde(default = "default_fort_base")]
    pub fort_base: f64,

    /// Unit stat table.
    #[serde(default)]
    pub units: UnitTable,

    /// Building stat table.
    #[serde(default)]
    pub buildings: BuildingTable,
}

impl Default for WorldRules {
    fn default() -> Self {
        Self {
            speed_multiplier: default_speed_multiplier(),
            base_storage: default_base_storage(),
            base_production: default_base_production(),
            pop_base: default_pop_base(),
            fort_base: default_fort_base(),
            units: UnitTable::default(),
            buildings: BuildingTable::default(),
        }
    }
}

impl WorldRules {
    /// Stats for one unit type.
    pub const fn unit(&self, unit: UnitType) -> &UnitStats {
        self.units.get(unit)
    }

    /// Stats for one building type.
    pub const fn building(&self, building: BuildingType) -> &BuildingStats {
        self.buildings.get(building)
    }

    /// Check that the rules describe a playable world.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidRules`] if the speed multiplier is not a
    /// positive finite number, a building growth factor is below 1, or the
    /// wall bonus is negative.
    pub fn validate(&self) -> Result<(), WorldError> {
        if !self.speed_multiplier.is_finite() || self.speed_multiplier <= 0.0 {
            return Err(WorldError::InvalidRules {
                reason: format!(
                    "speed_multiplier must be positive, got {}",
                    self.speed_multiplier
                ),
            });
        }
        for building in BuildingType::ALL {
            let factor = self.building(building).factor;
            if !factor.is_finite() || factor < 1.0 {
                return Err(WorldError::InvalidRules {
                    reason: format!("{building:?} factor must be at least 1, got {factor}"),
                });
            }
        }
        if !self.fort_base.is_finite() || self.fort_base < 0.0 {
            return Err(WorldError::InvalidRules {
                reason: format!("fort_base must be non-negative, got {}", self.fort_base),
            });
        }
        Ok(())
    }
}

const fn default_speed_multiplier() -> f64 {
    10.0
}

const fn default_base_storage() -> u64 {
    1000
}

const fn default_base_production() -> u64 {
    30
}

const fn default_pop_base() -> u64 {
    240
}

const fn default_fort_base() -> f64 {
    50.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_are_valid() {
        let rules = WorldRules::default();
        assert!(rules.validate().is_ok());
        assert_eq!(rules.unit(UnitType::Axe).attack, 40);
        assert_eq!(rules.unit(UnitType::Spear).defense, 15);
        assert_eq!(rules.building(BuildingType::Farm).base_time_secs, 40);
    }

    #[test]
    fn zero_speed_is_rejected() {
        let rules = WorldRules {
            speed_multiplier: 0.0,
            ..WorldRules::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn shrinking_factor_is_rejected() {
        let mut rules = WorldRules::default();
        rules.buildings.wall.factor = 0.9;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let rules: WorldRules = serde_yml::from_str("speed_multiplier: 1.0\nbase_storage: 500\n").unwrap();
        assert!((rules.speed_multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(rules.base_storage, 500);
        assert_eq!(rules.base_production, 30);
        assert_eq!(rules.units, UnitTable::default());
    }
}
