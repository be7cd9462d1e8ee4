//! Travel model: map distance and army travel time.

use chrono::Duration;
use oravia_types::{Army, Coords};

use crate::rules::WorldRules;

/// Milliseconds in one minute.
const MS_PER_MINUTE: f64 = 60_000.0;

/// Euclidean distance between two tiles.
pub fn distance(from: Coords, to: Coords) -> f64 {
    let dx = f64::from(to.x) - f64::from(from.x);
    let dy = f64::from(to.y) - f64::from(from.y);
    dx.hypot(dy)
}

/// Minutes-per-field of the slowest unit present in `units`.
///
/// Larger is slower, so this is the maximum over unit types with a non-zero
/// count. Returns `None` for an empty force.
pub fn slowest_speed(rules: &WorldRules, units: &Army) -> Option<u32> {
    units
        .iter()
        .filter(|&(_, count)| count > 0)
        .map(|(unit, _)| rules.unit(unit).speed)
        .max()
}

/// Travel time across `distance` fields at `minutes_per_field`.
///
/// `floor(distance * minutes_per_field * 60000 / speed_multiplier)` ms.
pub fn travel_duration(rules: &WorldRules, distance: f64, minutes_per_field: u32) -> Duration {
    let ms = distance * f64::from(minutes_per_field) * MS_PER_MINUTE / rules.speed_multiplier;
    if !ms.is_finite() || ms <= 0.0 {
        return Duration::zero();
    }
    // `as` saturates; travel times on a bounded map are far below i64::MAX ms.
    #[allow(clippy::cast_possible_truncation)]
    let whole = ms.floor() as i64;
    Duration::milliseconds(whole)
}

/// Travel time for an army between two tiles, `None` for an empty force.
pub fn army_travel_duration(
    rules: &WorldRules,
    units: &Army,
    from: Coords,
    to: Coords,
) -> Option<Duration> {
    let speed = slowest_speed(rules, units)?;
    Some(travel_duration(rules, distance(from, to), speed))
}
