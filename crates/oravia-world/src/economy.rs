//! Economic model: costs, production, caps, and time-continuous accrual.
//!
//! Every function here is pure and total. The same functions back the
//! client-side projection ([`predict`]) and the authoritative check inside a
//! village transaction. Under-accrual would reject valid spends and
//! over-accrual would allow overspending, so there is exactly one copy of
//! each formula.
//!
//! Stored quantities are integers; intermediate growth curves are `f64` and
//! floored at the end, matching the published formulas.

use chrono::{DateTime, Utc};
use oravia_types::{Army, BuildingLevels, BuildingType, Resource, Resources, Stockpile, UnitType, Village};

use crate::rules::WorldRules;

/// Production curve scale for built resource fields, per hour.
const PRODUCTION_SCALE: f64 = 30.0;

/// Production growth per resource-building level.
const PRODUCTION_GROWTH: f64 = 1.16;

/// Storage growth per warehouse level.
const STORAGE_GROWTH: f64 = 1.2;

/// Population growth per farm level above 1.
const POPULATION_GROWTH: f64 = 1.17;

/// Milliseconds in one hour.
const MS_PER_HOUR: f64 = 3_600_000.0;

/// Cost and duration of the next level of a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeCost {
    /// Resources to pay.
    pub resources: Resources,
    /// Build time in seconds, after world speed.
    pub build_time_secs: u64,
}

/// What a player sees for a village at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    /// Stockpile accrued to the projection instant.
    pub resources: Resources,
    /// Storage cap per resource.
    pub storage_cap: u64,
    /// Hourly production per resource, floored.
    pub production_per_hour: Resources,
    /// Population used by troops at home.
    pub population_used: u64,
    /// Population cap from the farm.
    pub population_max: u64,
}

/// Floor a non-negative float into `u64`, saturating at both ends.
pub(crate) fn floor_to_u64(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    // Float-to-int `as` saturates; the value is already floored and positive.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let floored = value.floor() as u64;
    floored
}

/// Widen a `u64` quantity into `f64` for the growth curves.
pub(crate) fn as_f64(value: u64) -> f64 {
    // Game quantities stay far below 2^53.
    #[allow(clippy::cast_precision_loss)]
    let wide = value as f64;
    wide
}

/// Cost of raising `building` from `current_level` to the next level.
///
/// Each resource costs `floor(base_cost * factor^current_level)`; the build
/// time is `floor(base_time * factor^current_level / speed_multiplier)`.
pub fn upgrade_cost(rules: &WorldRules, building: BuildingType, current_level: u32) -> UpgradeCost {
    let stats = rules.building(building);
    let multiplier = stats.factor.powf(f64::from(current_level));
    let scale = |base: u64| floor_to_u64(as_f64(base) * multiplier);

    UpgradeCost {
        resources: Resources::new(
            scale(stats.base_cost.wood),
            scale(stats.base_cost.stone),
            scale(stats.base_cost.iron),
        ),
        build_time_secs: floor_to_u64(
            as_f64(stats.base_time_secs) * multiplier / rules.speed_multiplier,
        ),
    }
}

/// Hourly production of a resource building at `level`.
///
/// Level 0 yields `base_production * speed_multiplier` (not floored);
/// higher levels yield `floor(30 * 1.16^level * speed_multiplier)`.
pub fn production_rate(rules: &WorldRules, level: u32) -> f64 {
    if level == 0 {
        return as_f64(rules.base_production) * rules.speed_multiplier;
    }
    let rate = PRODUCTION_SCALE * PRODUCTION_GROWTH.powf(f64::from(level)) * rules.speed_multiplier;
    rate.floor()
}

/// Storage cap per resource for a warehouse at `level`.
pub fn storage_capacity(rules: &WorldRules, level: u32) -> u64 {
    if level == 0 {
        return rules.base_storage;
    }
    floor_to_u64(as_f64(rules.base_storage) * STORAGE_GROWTH.powf(f64::from(level)))
}

/// Population cap for a farm at `level`. Level 0 houses nobody.
pub fn max_population(rules: &WorldRules, level: u32) -> u64 {
    let Some(above_first) = level.checked_sub(1) else {
        return 0;
    };
    floor_to_u64(as_f64(rules.pop_base) * POPULATION_GROWTH.powf(f64::from(above_first)))
}

/// Population taken by a set of troops.
pub fn used_population(rules: &WorldRules, troops: &Army) -> u64 {
    troops.iter().fold(0_u64, |acc, (unit, count)| {
        let pop = u64::from(rules.unit(unit).pop).saturating_mul(u64::from(count));
        acc.saturating_add(pop)
    })
}

/// Cost of recruiting `quantity` units of one type, `None` on overflow.
pub fn recruit_cost(rules: &WorldRules, unit: UnitType, quantity: u32) -> Option<Resources> {
    rules.unit(unit).cost.checked_mul(u64::from(quantity))
}

/// Reconcile a stockpile to `now`.
///
/// For each resource: `min(cap, floor(stored + rate * elapsed_hours))`.
/// Elapsed time is clamped to zero, so a `now` before `last_update` leaves
/// the stockpile unchanged. The result carries `last_update = max(last_update,
/// now)`; it only becomes authoritative when the caller commits it.
///
/// Calling `accrue` again with the same `now` on its own output is a no-op.
pub fn accrue(
    rules: &WorldRules,
    resources: &Stockpile,
    buildings: &BuildingLevels,
    now: DateTime<Utc>,
) -> Stockpile {
    let elapsed_ms = now
        .signed_duration_since(resources.last_update)
        .num_milliseconds();
    if elapsed_ms <= 0 {
        return *resources;
    }

    // Elapsed milliseconds between two stored timestamps fit easily in f64.
    #[allow(clippy::cast_precision_loss)]
    let elapsed_hours = elapsed_ms as f64 / MS_PER_HOUR;
    let cap = storage_capacity(rules, buildings.get(BuildingType::Warehouse));
    let stored = resources.amounts();

    let mut accrued = Resources::ZERO;
    for resource in Resource::ALL {
        let rate = production_rate(rules, buildings.get(resource.producer()));
        let grown = floor_to_u64(as_f64(stored.get(resource)) + rate * elapsed_hours);
        accrued.set(resource, grown.min(cap));
    }

    Stockpile::from_amounts(accrued, now)
}

/// Client-facing projection of a village at `now`, built from the same
/// formulas the transactions use.
pub fn predict(rules: &WorldRules, village: &Village, now: DateTime<Utc>) -> Projection {
    let accrued = accrue(rules, &village.resources, &village.buildings, now);
    let mut production_per_hour = Resources::ZERO;
    for resource in Resource::ALL {
        let rate = production_rate(rules, village.buildings.get(resource.producer()));
        production_per_hour.set(resource, floor_to_u64(rate));
    }

    Projection {
        resources: accrued.amounts(),
        storage_cap: storage_capacity(rules, village.buildings.get(BuildingType::Warehouse)),
        production_per_hour,
        population_used: used_population(rules, &village.troops),
        population_max: max_population(rules, village.buildings.get(BuildingType::Farm)),
    }
}
