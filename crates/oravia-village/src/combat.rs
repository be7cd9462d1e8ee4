//! Deterministic battle resolution.
//!
//! [`resolve`] is a pure function of its inputs: the same armies, wall level
//! and stockpile always produce the same [`BattleOutcome`]. The scheduler
//! stores the outcome in the defender's settlement journal so a replayed
//! command never fights twice.

use oravia_types::{Army, BattleOutcome, BattleStatus, Resource, Resources, UnitType, Winner};
use oravia_world::WorldRules;

/// Exponent of the loss-ratio curve.
const LOSS_EXPONENT: f64 = 1.5;

/// Share of the base fortification added per wall level.
const FORT_PER_LEVEL: f64 = 0.05;

/// Total offensive strength of an army.
pub fn attack_strength(rules: &WorldRules, army: &Army) -> f64 {
    strength(army, |unit| rules.unit(unit).attack)
}

/// Total defensive strength of an army, before the wall.
pub fn defense_strength(rules: &WorldRules, army: &Army) -> f64 {
    strength(army, |unit| rules.unit(unit).defense)
}

/// Flat defence granted by the wall: `fort_base + level * fort_base * 0.05`.
pub fn fortification_bonus(rules: &WorldRules, wall_level: u32) -> f64 {
    rules.fort_base + f64::from(wall_level) * (rules.fort_base * FORT_PER_LEVEL)
}

/// Resources surviving units can carry.
pub fn carry_capacity(rules: &WorldRules, army: &Army) -> u64 {
    army.iter().fold(0_u64, |acc, (unit, count)| {
        let load = u64::from(rules.unit(unit).capacity).saturating_mul(u64::from(count));
        acc.saturating_add(load)
    })
}

fn strength(army: &Army, stat: impl Fn(UnitType) -> u32) -> f64 {
    let total = army.iter().fold(0_u64, |acc, (unit, count)| {
        acc.saturating_add(u64::from(stat(unit)).saturating_mul(u64::from(count)))
    });
    // Army strengths stay far below 2^53.
    #[allow(clippy::cast_precision_loss)]
    let wide = total as f64;
    wide
}

/// Split an army into `(losses, remaining)` at a loss ratio in `[0, 1]`.
fn apply_losses(army: &Army, ratio: f64) -> (Army, Army) {
    let mut losses = Army::new();
    let mut remaining = Army::new();
    for (unit, count) in army.iter() {
        let dead_f = (f64::from(count) * ratio).floor();
        // Bounded by `count` since `ratio <= 1`.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let dead = (dead_f.max(0.0) as u32).min(count);
        losses.set(unit, dead);
        remaining.set(unit, count.saturating_sub(dead));
    }
    (losses, remaining)
}

/// Share of `stockpile` that `capacity` can carry off.
///
/// Everything when the capacity covers the whole stockpile, otherwise each
/// resource is scaled by `capacity / total` and floored.
pub fn loot(stockpile: &Resources, capacity: u64) -> Resources {
    let total = stockpile.total();
    if total == 0 || capacity == 0 {
        return Resources::ZERO;
    }
    if capacity >= total {
        return *stockpile;
    }
    let mut taken = Resources::ZERO;
    for resource in Resource::ALL {
        let share = u128::from(stockpile.get(resource))
            .saturating_mul(u128::from(capacity))
            .checked_div(u128::from(total))
            .unwrap_or(0);
        taken.set(resource, u64::try_from(share).unwrap_or(u64::MAX));
    }
    taken
}

/// Resolve a battle.
///
/// `defender_resources` is the defender's stockpile already accrued to the
/// battle instant. The attacker wins iff any attacker survives.
pub fn resolve(
    rules: &WorldRules,
    attacker: &Army,
    defender: &Army,
    fortification_level: u32,
    defender_resources: &Resources,
) -> BattleOutcome {
    let off = attack_strength(rules, attacker);
    let def = defense_strength(rules, defender) + fortification_bonus(rules, fortification_level);

    if off <= 0.0 {
        let (attacker_losses, attacker_remaining) = apply_losses(attacker, 1.0);
        let (defender_losses, defender_remaining) = apply_losses(defender, 0.0);
        return BattleOutcome {
            winner: Winner::Defender,
            attacker_losses,
            attacker_remaining,
            defender_losses,
            defender_remaining,
            loot: Resources::ZERO,
            status: BattleStatus::Red,
        };
    }

    let attacker_ratio = (def / off).powf(LOSS_EXPONENT).min(1.0);
    let defender_ratio = (off / def).powf(LOSS_EXPONENT).min(1.0);

    let (attacker_losses, attacker_remaining) = apply_losses(attacker, attacker_ratio);
    let (defender_losses, defender_remaining) = apply_losses(defender, defender_ratio);

    let attacker_lost_any = attacker_losses.total() > 0;
    let (winner, status) = if attacker_ratio >= 1.0 {
        (Winner::Defender, BattleStatus::Red)
    } else if attacker_lost_any {
        (Winner::Attacker, BattleStatus::Yellow)
    } else {
        (Winner::Attacker, BattleStatus::Green)
    };

    let loot = loot(defender_resources, carry_capacity(rules, &attacker_remaining));

    BattleOutcome {
        winner,
        attacker_losses,
        attacker_remaining,
        defender_losses,
        defender_remaining,
        loot,
        status,
    }
}
