//! Transaction bodies of the inbound player actions.
//!
//! Each function takes the village as read inside a store transaction and
//! either mutates it into the state to commit, or returns an
//! [`ActionError`]. On error the caller aborts the transaction, so the
//! village value is discarded and nothing is written.
//!
//! Bodies that spend resources start with [`catch_up`], so affordability is
//! always checked against the amounts accrued to `now`.

use chrono::{DateTime, Utc};
use oravia_types::{Army, BuildingType, ConstructionOrder, Resources, Stockpile, UnitType, Village};
use oravia_world::{WorldRules, accrue, max_population, recruit_cost, upgrade_cost, used_population};

use crate::error::ActionError;
use crate::queue;

/// Reconcile a village to `now`, one construction order at a time.
///
/// Resources accrue at the old levels up to each order's completion, the
/// order is applied, and accrual continues at the new levels. A finished
/// resource field or warehouse counts only from the moment it completed.
pub fn catch_up(rules: &WorldRules, village: &mut Village, now: DateTime<Utc>) {
    while let Some(done_at) = village
        .build_queue
        .first()
        .map(|order| order.completes_at)
        .filter(|done_at| *done_at <= now)
    {
        village.resources = accrue(rules, &village.resources, &village.buildings, done_at);
        queue::settle_construction(village, done_at);
    }
    village.resources = accrue(rules, &village.resources, &village.buildings, now);
}

/// Deduct `cost` from the stockpile or reject the action.
fn pay(village: &mut Village, cost: &Resources) -> Result<(), ActionError> {
    let available = village.resources.amounts();
    let rest = available
        .checked_sub(cost)
        .ok_or(ActionError::InsufficientResources {
            needed: *cost,
            available,
        })?;
    village.resources = Stockpile::from_amounts(rest, village.resources.last_update);
    Ok(())
}

/// Pay for and queue the next level of `building`.
///
/// The price is that of the level after every already-queued level. A zero
/// build time with an idle queue completes the upgrade immediately.
pub fn upgrade_building(
    rules: &WorldRules,
    village: &mut Village,
    building: BuildingType,
    max_queue: usize,
    now: DateTime<Utc>,
) -> Result<ConstructionOrder, ActionError> {
    catch_up(rules, village, now);

    if village.build_queue.len() >= max_queue {
        return Err(ActionError::QueueFull { limit: max_queue });
    }

    let priced_level = queue::next_level(village, building).saturating_sub(1);
    let cost = upgrade_cost(rules, building, priced_level);
    pay(village, &cost.resources)?;

    let order = queue::enqueue(village, building, cost.build_time_secs, now);
    queue::settle_construction(village, now);

    tracing::debug!(
        village_id = %village.id,
        ?building,
        target_level = order.target_level,
        completes_at = %order.completes_at,
        "upgrade queued"
    );
    Ok(order)
}

/// Pay for `quantity` units of `unit` and add them to the garrison.
///
/// Recruitment is instant. Population counts troops at home only.
pub fn recruit_unit(
    rules: &WorldRules,
    village: &mut Village,
    unit: UnitType,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<Resources, ActionError> {
    if quantity == 0 {
        return Err(ActionError::EmptyForceRejected);
    }
    catch_up(rules, village, now);

    let cost = recruit_cost(rules, unit, quantity).ok_or_else(|| ActionError::Overflow {
        context: format!("cost of {quantity} {unit:?}"),
    })?;
    let available = village.resources.amounts();
    if !available.covers(&cost) {
        return Err(ActionError::InsufficientResources {
            needed: cost,
            available,
        });
    }

    let used = used_population(rules, &village.troops);
    let extra = u64::from(rules.unit(unit).pop).saturating_mul(u64::from(quantity));
    let required = used.saturating_add(extra);
    let cap = max_population(rules, village.buildings.get(BuildingType::Farm));
    if required > cap {
        return Err(ActionError::PopulationLimitExceeded {
            required,
            available: cap,
        });
    }

    pay(village, &cost)?;
    let count = village
        .troops
        .get(unit)
        .checked_add(quantity)
        .ok_or_else(|| ActionError::Overflow {
            context: format!("{unit:?} garrison"),
        })?;
    village.troops.set(unit, count);

    tracing::debug!(village_id = %village.id, ?unit, quantity, "units recruited");
    Ok(cost)
}

/// Take `units` out of the garrison for an outbound army.
pub fn dispatch_troops(village: &mut Village, units: &Army) -> Result<(), ActionError> {
    if units.is_empty() {
        return Err(ActionError::EmptyForceRejected);
    }
    if let Some((unit, requested, available)) = village.troops.shortfall(units) {
        return Err(ActionError::InsufficientTroops {
            unit,
            requested,
            available,
        });
    }
    village.troops = village
        .troops
        .checked_sub(units)
        .ok_or_else(|| ActionError::Overflow {
            context: format!("dispatch from village {}", village.id),
        })?;
    Ok(())
}
