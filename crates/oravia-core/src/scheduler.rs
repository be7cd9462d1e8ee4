//! The command scheduler: resolves armies whose arrival time has passed.
//!
//! A tick scans the command collection for due commands and applies each
//! one in a fixed order of writes:
//!
//! 1. One transaction on the village the command arrives at. It journals the
//!    command id together with the outcome, so this step happens once per
//!    command however often the rest is replayed.
//! 2. Reports for both sides and, for an attack, the return command. Their
//!    ids derive from the command id and they are insert-if-absent.
//! 3. Deletion of the command.
//! 4. Closing of the journal entry. A closed entry stays for
//!    `settlement_retention_ms`, so a second scheduler working from an older
//!    scan still finds it and replays instead of fighting again.
//!
//! A tick that fails part-way leaves the command in place; the next tick
//! picks it up again and steps 1 and 2 replay without effect. An entry is
//! never expired while it is open, however late the command is picked up.
//!
//! Commands arriving at the same village run one after another in arrival
//! order; commands for different villages run concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use oravia_store::{Store, StoreError, TxError, keys};
use oravia_types::{Command, CommandId, CommandKind, Report, ReportKind, UserId, Village, VillageId};
use oravia_village::{
    ActionError, apply_battle, apply_return, battle_report, close_settlement, expire_settlements,
    return_command, unclosed_settlements,
};
use tracing::{debug, info, warn};

use crate::config::KernelConfig;

/// Errors from processing a single command.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The village transition refused the command.
    #[error("command rejected: {0}")]
    Action(#[from] ActionError),

    /// The store failed or the village kept conflicting.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What happened to one due command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// An attack was fought (or its earlier result replayed).
    Attack,
    /// A returning army arrived home.
    Return,
    /// The village it was heading for no longer exists; the command was dropped.
    MissingTarget,
}

/// Counts from one [`Scheduler::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Commands found due.
    pub due: usize,
    /// Attacks resolved.
    pub attacks: usize,
    /// Returns applied.
    pub returns: usize,
    /// Commands dropped because their village was gone.
    pub missing_targets: usize,
    /// Commands left for the next tick after an error.
    pub failed: usize,
}

impl TickSummary {
    fn record(&mut self, result: &Result<Processed, ProcessError>) {
        let slot = match result {
            Ok(Processed::Attack) => &mut self.attacks,
            Ok(Processed::Return) => &mut self.returns,
            Ok(Processed::MissingTarget) => &mut self.missing_targets,
            Err(_) => &mut self.failed,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Why a settling transaction wrote nothing.
#[derive(Debug)]
enum Skip {
    /// The village record does not exist.
    Gone,
    /// The transition refused the command.
    Rejected(ActionError),
}

/// Applies due commands to the shared store.
#[derive(Clone)]
pub struct Scheduler<S> {
    store: S,
    config: Arc<KernelConfig>,
}

impl<S: Store> Scheduler<S> {
    /// Create a scheduler over `store`.
    pub const fn new(store: S, config: Arc<KernelConfig>) -> Self {
        Self { store, config }
    }

    fn retention(&self) -> Duration {
        i64::try_from(self.config.scheduler.settlement_retention_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .unwrap_or(Duration::MAX)
    }

    /// Apply every command whose arrival time is at or before `now`.
    ///
    /// Failures of individual commands are logged and counted; they never
    /// stop the rest of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the scan for due commands fails.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary, StoreError> {
        let due: Vec<Command> = self
            .store
            .query(keys::COMMANDS, move |command: &Command| command.is_due(now))
            .await?;

        let mut summary = TickSummary {
            due: due.len(),
            ..TickSummary::default()
        };
        if due.is_empty() {
            return Ok(summary);
        }

        let mut by_village: BTreeMap<VillageId, Vec<Command>> = BTreeMap::new();
        for command in due {
            by_village.entry(command.target_id).or_default().push(command);
        }
        for batch in by_village.values_mut() {
            batch.sort_by_key(|command| (command.arrival_time, command.id));
        }

        let limit = self.config.scheduler.max_concurrent_commands.max(1);
        let results: Vec<Vec<(CommandId, Result<Processed, ProcessError>)>> =
            stream::iter(by_village.into_values())
                .map(|batch| async move {
                    let mut results = Vec::with_capacity(batch.len());
                    for command in batch {
                        let result = self.process(&command, now).await;
                        results.push((command.id, result));
                    }
                    results
                })
                .buffer_unordered(limit)
                .collect()
                .await;

        for (command_id, result) in results.into_iter().flatten() {
            if let Err(e) = &result {
                warn!(%command_id, error = %e, "Command processing failed, will retry next tick");
            }
            summary.record(&result);
        }

        info!(
            due = summary.due,
            attacks = summary.attacks,
            returns = summary.returns,
            missing_targets = summary.missing_targets,
            failed = summary.failed,
            "Scheduler tick complete"
        );
        Ok(summary)
    }

    /// Apply one due command.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] if any write fails. The command is then
    /// still stored and can be processed again.
    pub async fn process(
        &self,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<Processed, ProcessError> {
        match command.kind {
            CommandKind::Attack => self.process_attack(command, now).await,
            CommandKind::Return => self.process_return(command, now).await,
        }
    }

    async fn process_attack(
        &self,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<Processed, ProcessError> {
        let rules = &self.config.rules;
        let retention = self.retention();
        let settled = self
            .store
            .transact(&keys::village(command.target_id), |current: Option<Village>| {
                let mut village = current.ok_or(Skip::Gone)?;
                expire_settlements(&mut village, now, retention, command.id);
                let unclosed = unclosed_settlements(&village, now, retention);
                let applied =
                    apply_battle(rules, &mut village, command, now).map_err(Skip::Rejected)?;
                let owner = village.owner_id;
                Ok((village, (applied, owner, unclosed)))
            })
            .await;
        let (applied, defender_owner, unclosed) = match settled {
            Ok(settled) => settled,
            Err(TxError::Aborted(Skip::Gone)) => return self.drop_command(command).await,
            Err(TxError::Aborted(Skip::Rejected(e))) => return Err(e.into()),
            Err(TxError::Store(e)) => return Err(e.into()),
        };
        let outcome = &applied.value;

        let attacker: Option<Village> = self.store.read(&keys::village(command.origin_id)).await?;
        if let Some(attacker) = &attacker {
            let report = battle_report(command, outcome, ReportKind::AttackSent, applied.settled_at);
            self.deliver(attacker.owner_id, &report).await?;
        }
        let report = battle_report(command, outcome, ReportKind::Defense, applied.settled_at);
        self.deliver(defender_owner, &report).await?;

        let back = attacker
            .as_ref()
            .and_then(|home| return_command(command, outcome, home.coords, applied.settled_at));
        if let Some(back) = &back {
            self.store
                .append(keys::COMMANDS, &back.id.to_string(), back)
                .await?;
        }

        self.store.delete(&keys::command(command.id)).await?;
        self.close(command, unclosed, now).await?;

        debug!(
            command_id = %command.id,
            target_id = %command.target_id,
            winner = ?outcome.winner,
            status = ?outcome.status,
            replayed = applied.replayed,
            "Attack resolved"
        );
        Ok(Processed::Attack)
    }

    async fn process_return(
        &self,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<Processed, ProcessError> {
        let retention = self.retention();
        let settled = self
            .store
            .transact(&keys::village(command.target_id), |current: Option<Village>| {
                let mut village = current.ok_or(Skip::Gone)?;
                expire_settlements(&mut village, now, retention, command.id);
                let unclosed = unclosed_settlements(&village, now, retention);
                let applied = apply_return(&mut village, command, now);
                Ok((village, (applied, unclosed)))
            })
            .await;
        let (applied, unclosed) = match settled {
            Ok(applied) => applied,
            Err(TxError::Aborted(Skip::Gone)) => return self.drop_command(command).await,
            Err(TxError::Aborted(Skip::Rejected(e))) => return Err(e.into()),
            Err(TxError::Store(e)) => return Err(e.into()),
        };

        self.store.delete(&keys::command(command.id)).await?;
        self.close(command, unclosed, now).await?;

        debug!(
            command_id = %command.id,
            village_id = %command.target_id,
            replayed = applied.replayed,
            "Army returned"
        );
        Ok(Processed::Return)
    }

    /// Delete a command whose village no longer exists.
    async fn drop_command(&self, command: &Command) -> Result<Processed, ProcessError> {
        self.store.delete(&keys::command(command.id)).await?;
        debug!(
            command_id = %command.id,
            target_id = %command.target_id,
            "Target village gone, command dropped"
        );
        Ok(Processed::MissingTarget)
    }

    async fn deliver(&self, owner: UserId, report: &Report) -> Result<(), StoreError> {
        let inserted = self
            .store
            .append(&keys::reports_of(owner), &report.id.to_string(), report)
            .await?;
        if !inserted {
            debug!(report_id = %report.id, %owner, "Report already delivered");
        }
        Ok(())
    }

    /// Close the journal entry of a deleted command.
    ///
    /// `unclosed` lists older open entries found on the same village; those
    /// whose command record is confirmed gone are closed in the same write.
    async fn close(
        &self,
        command: &Command,
        unclosed: Vec<CommandId>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut finished = vec![command.id];
        for id in unclosed.into_iter().filter(|id| *id != command.id) {
            if matches!(self.store.read::<Command>(&keys::command(id)).await, Ok(None)) {
                finished.push(id);
            }
        }

        let closed = self
            .store
            .transact(&keys::village(command.target_id), |current: Option<Village>| {
                let mut village = current.ok_or(())?;
                let mut closed = 0_usize;
                for id in &finished {
                    if close_settlement(&mut village, *id, now) {
                        closed = closed.saturating_add(1);
                    }
                }
                if closed == 0 {
                    return Err(());
                }
                Ok((village, closed))
            })
            .await;
        match closed {
            Ok(closed) => {
                if closed > 1 {
                    debug!(village_id = %command.target_id, closed, "Closed leftover journal entries");
                }
                Ok(())
            }
            Err(TxError::Aborted(())) => Ok(()),
            Err(TxError::Store(e)) => Err(e),
        }
    }
}
