//! The construction queue: paid upgrades waiting for their completion time.
//!
//! Orders are kept in completion order. Each order finishes when the one
//! before it does plus its own build time, so at most one building is under
//! construction at once.

use chrono::{DateTime, Duration, Utc};
use oravia_types::{BuildingType, ConstructionOrder, Village};

/// Points awarded for every completed building level.
pub const POINTS_PER_LEVEL: u64 = 10;

/// Complete every order whose `completes_at <= now`.
///
/// Each completed order sets the building to its target level and awards
/// [`POINTS_PER_LEVEL`]. Returns the number of orders completed.
pub fn settle_construction(village: &mut Village, now: DateTime<Utc>) -> usize {
    let due = village
        .build_queue
        .iter()
        .take_while(|order| order.completes_at <= now)
        .count();

    for order in village.build_queue.drain(..due) {
        let level = village.buildings.get(order.building).max(order.target_level);
        village.buildings.set(order.building, level);
        village.points = village.points.saturating_add(POINTS_PER_LEVEL);
        tracing::debug!(
            village_id = %village.id,
            building = ?order.building,
            level,
            "construction completed"
        );
    }
    due
}

/// Levels of `building` already paid for but not yet completed.
pub fn queued_levels(village: &Village, building: BuildingType) -> u32 {
    let queued = village
        .build_queue
        .iter()
        .filter(|order| order.building == building)
        .count();
    u32::try_from(queued).unwrap_or(u32::MAX)
}

/// Level the next order for `building` would reach.
pub fn next_level(village: &Village, building: BuildingType) -> u32 {
    village
        .buildings
        .get(building)
        .saturating_add(queued_levels(village, building))
        .saturating_add(1)
}

/// Instant the queue becomes free: the last order's completion, or `now`.
pub fn queue_end(village: &Village, now: DateTime<Utc>) -> DateTime<Utc> {
    village
        .build_queue
        .last()
        .map_or(now, |order| order.completes_at.max(now))
}

/// Append an order that takes `build_time_secs` after the queue frees up.
pub fn enqueue(
    village: &mut Village,
    building: BuildingType,
    build_time_secs: u64,
    now: DateTime<Utc>,
) -> ConstructionOrder {
    let secs = i64::try_from(build_time_secs).unwrap_or(i64::MAX);
    let start = queue_end(village, now);
    let completes_at = start
        .checked_add_signed(Duration::try_seconds(secs).unwrap_or(Duration::MAX))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let order = ConstructionOrder {
        building,
        target_level: next_level(village, building),
        completes_at,
    };
    village.build_queue.push(order);
    order
}
