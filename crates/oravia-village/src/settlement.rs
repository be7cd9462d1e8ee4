//! Scheduler transitions: applying arrived commands to a village exactly once.
//!
//! The store offers per-key transactions only, so a command's effects are
//! split across several writes (village, reports, return command, command
//! deletion). The village write is the one that must never repeat. It
//! records a [`Settlement`] keyed by the command id in the same commit; a
//! re-run finds the entry and gets the stored outcome back instead of
//! fighting again. Every later write uses an id derived from the command id
//! and is insert-if-absent, so a replay reproduces the same records.
//!
//! An entry outlives its command. It is closed once the command record is
//! gone and only then starts its retention period, so a scheduler holding a
//! stale copy of the command still finds it.

use chrono::{DateTime, Duration, Utc};
use oravia_types::{
    BattleOutcome, BuildingType, Command, CommandId, CommandKind, Coords, Report, ReportId,
    ReportKind, Settlement, Stockpile, Village, Winner,
};
use oravia_world::WorldRules;

use crate::actions::catch_up;
use crate::combat;
use crate::error::ActionError;

/// Label used to derive the return command id from an attack id.
const RETURN_LABEL: &str = "return";

/// Result of applying a command to a village.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<T> {
    /// What the command did.
    pub value: T,
    /// Instant the effects were first committed.
    pub settled_at: DateTime<Utc>,
    /// Whether the journal already held this command.
    pub replayed: bool,
}

/// Resolve an arrived attack against the defending village.
///
/// Fresh: completes due construction, accrues to `now`, fights the current
/// garrison behind the current wall, leaves the survivors at home, removes
/// the loot on an attacker win, and journals the outcome. Replay: returns the
/// journalled outcome and leaves the village untouched.
pub fn apply_battle(
    rules: &WorldRules,
    village: &mut Village,
    command: &Command,
    now: DateTime<Utc>,
) -> Result<Applied<BattleOutcome>, ActionError> {
    if let Some(entry) = village.settlements.get(&command.id) {
        let outcome = entry
            .outcome
            .clone()
            .ok_or(ActionError::JournalMismatch {
                command_id: command.id,
            })?;
        return Ok(Applied {
            value: outcome,
            settled_at: entry.settled_at,
            replayed: true,
        });
    }

    catch_up(rules, village, now);
    let stock = village.resources.amounts();
    let outcome = combat::resolve(
        rules,
        &command.units,
        &village.troops,
        village.buildings.get(BuildingType::Wall),
        &stock,
    );

    village.troops = outcome.defender_remaining.clone();
    if outcome.winner == Winner::Attacker {
        let rest = stock
            .checked_sub(&outcome.loot)
            .ok_or_else(|| ActionError::Overflow {
                context: format!("loot of command {}", command.id),
            })?;
        village.resources = Stockpile::from_amounts(rest, village.resources.last_update);
    }

    village.settlements.insert(
        command.id,
        Settlement {
            settled_at: now,
            outcome: Some(outcome.clone()),
            closed_at: None,
        },
    );

    Ok(Applied {
        value: outcome,
        settled_at: now,
        replayed: false,
    })
}

/// Bring a returning army home.
///
/// Survivors join the garrison and carried resources are added to the
/// stockpile as-is, without accrual and without the storage cap. Levels and
/// `last_update` are left alone; the next accrual catches up construction.
pub fn apply_return(
    village: &mut Village,
    command: &Command,
    now: DateTime<Utc>,
) -> Applied<()> {
    if let Some(entry) = village.settlements.get(&command.id) {
        return Applied {
            value: (),
            settled_at: entry.settled_at,
            replayed: true,
        };
    }

    village.troops = village.troops.merged(&command.units);
    if let Some(carried) = command.resources {
        let amounts = village.resources.amounts().saturating_add(&carried);
        village.resources = Stockpile::from_amounts(amounts, village.resources.last_update);
    }
    village.settlements.insert(
        command.id,
        Settlement {
            settled_at: now,
            outcome: None,
            closed_at: None,
        },
    );

    Applied {
        value: (),
        settled_at: now,
        replayed: false,
    }
}

/// Mark the entry of a deleted command as closed at `now`.
///
/// Returns `false` if there is no entry or it was already closed.
pub fn close_settlement(village: &mut Village, command_id: CommandId, now: DateTime<Utc>) -> bool {
    match village.settlements.get_mut(&command_id) {
        Some(entry) if entry.closed_at.is_none() => {
            entry.closed_at = Some(now);
            true
        }
        _ => false,
    }
}

/// Drop closed entries whose retention ran out. The entry of `keep`, the
/// command being applied, always stays. Returns how many were removed.
pub fn expire_settlements(
    village: &mut Village,
    now: DateTime<Utc>,
    retention: Duration,
    keep: CommandId,
) -> usize {
    let before = village.settlements.len();
    village.settlements.retain(|id, entry| {
        *id == keep
            || entry.closed_at.is_none_or(|closed| {
                closed
                    .checked_add_signed(retention)
                    .is_none_or(|until| until > now)
            })
    });
    before.saturating_sub(village.settlements.len())
}

/// Open entries settled longer than `retention` ago.
///
/// A process that stopped between deleting a command and closing its entry
/// leaves one of these behind. The caller closes it once it has checked
/// that the command record is really gone.
pub fn unclosed_settlements(
    village: &Village,
    now: DateTime<Utc>,
    retention: Duration,
) -> Vec<CommandId> {
    village
        .settlements
        .iter()
        .filter(|(_, entry)| {
            entry.closed_at.is_none()
                && entry
                    .settled_at
                    .checked_add_signed(retention)
                    .is_some_and(|until| until <= now)
        })
        .map(|(id, _)| *id)
        .collect()
}

/// The return leg of an attack, if any attacker survived.
///
/// It leaves from the battlefield at `settled_at` and takes as long as the
/// outbound trip. Its id is derived from the attack id.
pub fn return_command(
    attack: &Command,
    outcome: &BattleOutcome,
    home_coords: Coords,
    settled_at: DateTime<Utc>,
) -> Option<Command> {
    if attack.kind != CommandKind::Attack || outcome.attacker_remaining.is_empty() {
        return None;
    }
    let arrival_time = settled_at
        .checked_add_signed(attack.trip_duration())
        .unwrap_or(settled_at);
    Some(Command {
        id: CommandId::derived(attack.id.into_inner(), RETURN_LABEL),
        kind: CommandKind::Return,
        origin_id: attack.target_id,
        target_id: attack.origin_id,
        target_coords: home_coords,
        units: outcome.attacker_remaining.clone(),
        start_time: settled_at,
        arrival_time,
        resources: (!outcome.loot.is_zero()).then_some(outcome.loot),
    })
}

/// Build the report delivered to one side of a battle.
pub fn battle_report(
    attack: &Command,
    outcome: &BattleOutcome,
    kind: ReportKind,
    settled_at: DateTime<Utc>,
) -> Report {
    let label = match kind {
        ReportKind::AttackSent => "report:attack_sent",
        ReportKind::Defense => "report:defense",
    };
    Report {
        id: ReportId::derived(attack.id.into_inner(), label),
        kind,
        command_id: attack.id,
        timestamp: settled_at,
        attacker_id: attack.origin_id,
        defender_id: attack.target_id,
        winner: outcome.winner,
        attacker_losses: outcome.attacker_losses.clone(),
        defender_losses: outcome.defender_losses.clone(),
        loot: outcome.loot,
        status: outcome.status,
        is_read: false,
    }
}
