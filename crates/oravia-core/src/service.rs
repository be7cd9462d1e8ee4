//! Inbound player actions, each run as a transaction on a store record.
//!
//! [`GameService`] is the only writer of villages outside the scheduler.
//! Every mutation re-validates against the committed record with the same
//! formulas the client used to predict it, so a stale or forged request can
//! at worst be refused.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use oravia_store::{Store, StoreError, Subscription, TxError, keys};
use oravia_types::{
    Army, BuildingLevels, BuildingType, Command, CommandId, CommandKind, ConstructionOrder, Coords,
    Report, ReportId, Resources, Stockpile, Tribe, TribeId, UnitType, UserId, Village, VillageId,
};
use oravia_village::ActionError;
use oravia_world::{Projection, predict, travel};
use rand::Rng;
use tracing::{debug, info};

use crate::config::KernelConfig;

/// Errors returned by [`GameService`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The action was refused by the game rules.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The store failed or a transaction kept conflicting.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No free tile was found for a new village.
    #[error("no free tile found after {attempts} attempts")]
    MapFull {
        /// Tiles tried.
        attempts: u32,
    },

    /// The requested tile already holds a village.
    #[error("tile {coords} is occupied")]
    TileOccupied {
        /// Requested tile.
        coords: Coords,
    },

    /// The requested tile lies off the map.
    #[error("tile {coords} is outside the map")]
    OutsideMap {
        /// Requested tile.
        coords: Coords,
    },

    /// The acting player does not own the village.
    #[error("village {village_id} is not owned by {owner}")]
    NotOwner {
        /// Village acted on.
        village_id: VillageId,
        /// Player who tried to act.
        owner: UserId,
    },

    /// A required name was blank.
    #[error("{field} must not be empty")]
    BlankName {
        /// Which name.
        field: &'static str,
    },
}

impl From<TxError<ActionError>> for ServiceError {
    fn from(err: TxError<ActionError>) -> Self {
        match err {
            TxError::Aborted(e) => Self::Action(e),
            TxError::Store(e) => Self::Store(e),
        }
    }
}

impl From<TxError<Self>> for ServiceError {
    fn from(err: TxError<Self>) -> Self {
        match err {
            TxError::Aborted(e) => e,
            TxError::Store(e) => Self::Store(e),
        }
    }
}

/// A village as a client should display it at some instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VillageView {
    /// The stored record reconciled to the requested instant.
    pub village: Village,
    /// Resources and caps projected to the requested instant.
    pub projection: Projection,
}

/// Front door for player actions against a shared store.
#[derive(Clone)]
pub struct GameService<S> {
    store: S,
    config: Arc<KernelConfig>,
}

impl<S: Store> GameService<S> {
    /// Create a service over `store` with the given configuration.
    pub const fn new(store: S, config: Arc<KernelConfig>) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Run `body` against the stored village as one transaction.
    async fn update_village<O, F>(&self, village_id: VillageId, mut body: F) -> Result<O, ServiceError>
    where
        O: Send,
        F: FnMut(&mut Village) -> Result<O, ActionError> + Send,
    {
        let key = keys::village(village_id);
        let output = self
            .store
            .transact(&key, |current: Option<Village>| {
                let mut village = current.ok_or_else(|| ActionError::RecordMissing {
                    record: key.clone(),
                })?;
                let output = body(&mut village)?;
                Ok::<_, ActionError>((village, output))
            })
            .await?;
        Ok(output)
    }

    async fn load_village(&self, village_id: VillageId) -> Result<Village, ServiceError> {
        let key = keys::village(village_id);
        self.store
            .read::<Village>(&key)
            .await?
            .ok_or_else(|| ActionError::RecordMissing { record: key }.into())
    }

    /// Pay for and queue the next level of `building`.
    ///
    /// # Errors
    ///
    /// [`ActionError::InsufficientResources`], [`ActionError::QueueFull`], or
    /// [`ActionError::RecordMissing`] wrapped in [`ServiceError::Action`];
    /// [`ServiceError::Store`] on store failure.
    pub async fn upgrade_building(
        &self,
        village_id: VillageId,
        building: BuildingType,
        now: DateTime<Utc>,
    ) -> Result<ConstructionOrder, ServiceError> {
        let rules = &self.config.rules;
        let max_queue = self.config.village.max_build_queue;
        let order = self
            .update_village(village_id, |village| {
                oravia_village::upgrade_building(rules, village, building, max_queue, now)
            })
            .await?;
        info!(%village_id, ?building, target_level = order.target_level, "Building upgrade ordered");
        Ok(order)
    }

    /// Recruit `quantity` units of `unit`. Returns the price paid.
    ///
    /// # Errors
    ///
    /// [`ActionError::EmptyForceRejected`],
    /// [`ActionError::InsufficientResources`], or
    /// [`ActionError::PopulationLimitExceeded`] wrapped in
    /// [`ServiceError::Action`]; [`ServiceError::Store`] on store failure.
    pub async fn recruit_unit(
        &self,
        village_id: VillageId,
        unit: UnitType,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Resources, ServiceError> {
        let rules = &self.config.rules;
        let cost = self
            .update_village(village_id, |village| {
                oravia_village::recruit_unit(rules, village, unit, quantity, now)
            })
            .await?;
        info!(%village_id, ?unit, quantity, "Units recruited");
        Ok(cost)
    }

    /// Send `units` from a village to attack the village at `target`.
    ///
    /// The troops leave the garrison in one transaction; the attack command
    /// is written afterwards with its arrival time already stamped.
    ///
    /// # Errors
    ///
    /// [`ActionError::TargetNotFound`], [`ActionError::SelfTargetRejected`],
    /// [`ActionError::EmptyForceRejected`], or
    /// [`ActionError::InsufficientTroops`] wrapped in
    /// [`ServiceError::Action`]; [`ServiceError::Store`] on store failure.
    pub async fn send_army(
        &self,
        village_id: VillageId,
        target: Coords,
        units: Army,
        now: DateTime<Utc>,
    ) -> Result<Command, ServiceError> {
        let target_id: VillageId = self
            .store
            .read(&keys::coords(target))
            .await?
            .ok_or(ActionError::TargetNotFound { coords: target })?;
        if target_id == village_id {
            return Err(ActionError::SelfTargetRejected.into());
        }
        let origin = self.load_village(village_id).await?;
        let duration =
            travel::army_travel_duration(&self.config.rules, &units, origin.coords, target)
                .ok_or(ActionError::EmptyForceRejected)?;

        self.update_village(village_id, |village| {
            oravia_village::dispatch_troops(village, &units)
        })
        .await?;

        let command = Command {
            id: CommandId::new(),
            kind: CommandKind::Attack,
            origin_id: village_id,
            target_id,
            target_coords: target,
            units,
            start_time: now,
            arrival_time: now.checked_add_signed(duration).unwrap_or(now),
            resources: None,
        };
        self.store
            .append(keys::COMMANDS, &command.id.to_string(), &command)
            .await?;

        info!(
            command_id = %command.id,
            origin_id = %village_id,
            %target_id,
            arrival_time = %command.arrival_time,
            "Army dispatched"
        );
        Ok(command)
    }

    /// Found a new village for `owner`.
    ///
    /// With `coords` the village goes exactly there; without, random tiles
    /// of the map are tried until one is free.
    ///
    /// # Errors
    ///
    /// [`ServiceError::TileOccupied`] or [`ServiceError::OutsideMap`] for a
    /// requested tile, [`ServiceError::MapFull`] when no free tile was
    /// found, [`ServiceError::BlankName`] for an empty name.
    pub async fn found_village(
        &self,
        owner: UserId,
        name: &str,
        coords: Option<Coords>,
        now: DateTime<Utc>,
    ) -> Result<Village, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::BlankName {
                field: "village name",
            });
        }
        let village_id = VillageId::new();
        let size = self.config.world.map_size;

        let at = if let Some(at) = coords {
            if !(0..size).contains(&at.x) || !(0..size).contains(&at.y) {
                return Err(ServiceError::OutsideMap { coords: at });
            }
            if !self.claim_tile(at, village_id).await? {
                return Err(ServiceError::TileOccupied { coords: at });
            }
            at
        } else {
            self.claim_random_tile(village_id).await?
        };

        let start = &self.config.world.starting_village;
        let buildings: BuildingLevels = BuildingType::ALL
            .iter()
            .map(|&building| (building, start.buildings.get(building)))
            .collect();
        let village = Village {
            id: village_id,
            owner_id: owner,
            name: name.to_owned(),
            coords: at,
            points: start.points,
            resources: Stockpile::from_amounts(start.resources, now),
            buildings,
            troops: Army::garrison(),
            tribe_id: None,
            build_queue: Vec::new(),
            settlements: BTreeMap::new(),
        };
        self.store
            .append(keys::VILLAGES, &village_id.to_string(), &village)
            .await?;

        info!(%village_id, %owner, coords = %at, "Village founded");
        Ok(village)
    }

    /// Claim `at` for `village_id`. Returns `false` if the tile is taken.
    async fn claim_tile(&self, at: Coords, village_id: VillageId) -> Result<bool, StoreError> {
        let claimed = self
            .store
            .transact(&keys::coords(at), |current: Option<VillageId>| match current {
                Some(_) => Err(()),
                None => Ok((village_id, ())),
            })
            .await;
        match claimed {
            Ok(()) => Ok(true),
            Err(TxError::Aborted(())) => Ok(false),
            Err(TxError::Store(e)) => Err(e),
        }
    }

    async fn claim_random_tile(&self, village_id: VillageId) -> Result<Coords, ServiceError> {
        let size = self.config.world.map_size;
        let attempts = self.config.world.found_attempts;
        for _ in 0..attempts {
            let candidate = {
                let mut rng = rand::rng();
                Coords::new(rng.random_range(0..size), rng.random_range(0..size))
            };
            if self.claim_tile(candidate, village_id).await? {
                return Ok(candidate);
            }
            debug!(coords = %candidate, "Tile taken, trying another");
        }
        Err(ServiceError::MapFull { attempts })
    }

    /// Create a tribe led by `owner` and enrol one of their villages.
    ///
    /// The tag is stored upper-cased.
    ///
    /// # Errors
    ///
    /// [`ServiceError::BlankName`] for an empty name or tag,
    /// [`ServiceError::NotOwner`] if `owner` does not own the village.
    pub async fn create_tribe(
        &self,
        owner: UserId,
        village_id: VillageId,
        name: &str,
        tag: &str,
    ) -> Result<Tribe, ServiceError> {
        let (name, tag) = (name.trim(), tag.trim());
        if name.is_empty() {
            return Err(ServiceError::BlankName { field: "tribe name" });
        }
        if tag.is_empty() {
            return Err(ServiceError::BlankName { field: "tribe tag" });
        }
        let village = self.load_village(village_id).await?;
        if village.owner_id != owner {
            return Err(ServiceError::NotOwner { village_id, owner });
        }

        let tribe = Tribe {
            id: TribeId::new(),
            name: name.to_owned(),
            tag: tag.to_uppercase(),
            owner_id: owner,
            members: BTreeSet::from([owner]),
        };
        self.store
            .append(keys::TRIBES, &tribe.id.to_string(), &tribe)
            .await?;

        let tribe_id = tribe.id;
        let key = keys::village(village_id);
        self.store
            .transact(&key, |current: Option<Village>| {
                let mut village = current.ok_or_else(|| {
                    ServiceError::from(ActionError::RecordMissing { record: key.clone() })
                })?;
                if village.owner_id != owner {
                    return Err(ServiceError::NotOwner { village_id, owner });
                }
                village.tribe_id = Some(tribe_id);
                Ok((village, ()))
            })
            .await?;

        info!(%tribe_id, tag = %tribe.tag, %owner, "Tribe created");
        Ok(tribe)
    }

    /// The village brought up to `now`: construction completed and resources
    /// accrued order by order, exactly as the next transaction would. Nothing
    /// is written.
    ///
    /// # Errors
    ///
    /// [`ActionError::RecordMissing`] wrapped in [`ServiceError::Action`].
    pub async fn village_view(
        &self,
        village_id: VillageId,
        now: DateTime<Utc>,
    ) -> Result<VillageView, ServiceError> {
        let mut village = self.load_village(village_id).await?;
        oravia_village::catch_up(&self.config.rules, &mut village, now);
        let projection = predict(&self.config.rules, &village, now);
        Ok(VillageView {
            village,
            projection,
        })
    }

    /// Attacks heading for a village, soonest first.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Store`] on store failure.
    pub async fn incoming_attacks(&self, village_id: VillageId) -> Result<Vec<Command>, ServiceError> {
        let mut attacks: Vec<Command> = self
            .store
            .query(keys::COMMANDS, move |command: &Command| {
                command.kind == CommandKind::Attack && command.target_id == village_id
            })
            .await?;
        attacks.sort_by_key(|command| (command.arrival_time, command.id));
        Ok(attacks)
    }

    /// Every report delivered to `owner`, newest first.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Store`] on store failure.
    pub async fn reports(&self, owner: UserId) -> Result<Vec<Report>, ServiceError> {
        let mut reports: Vec<Report> = self
            .store
            .query(&keys::reports_of(owner), |_: &Report| true)
            .await?;
        reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));
        Ok(reports)
    }

    /// Mark one of `owner`'s reports as read. Returns whether it was unread.
    ///
    /// # Errors
    ///
    /// [`ActionError::RecordMissing`] wrapped in [`ServiceError::Action`]
    /// when `owner` has no such report.
    pub async fn mark_report_read(
        &self,
        owner: UserId,
        report_id: ReportId,
    ) -> Result<bool, ServiceError> {
        let key = keys::report(owner, report_id);
        let was_unread = self
            .store
            .transact(&key, |current: Option<Report>| {
                let mut report = current.ok_or_else(|| ActionError::RecordMissing {
                    record: key.clone(),
                })?;
                let was_unread = !report.is_read;
                report.is_read = true;
                Ok::<_, ActionError>((report, was_unread))
            })
            .await?;
        Ok(was_unread)
    }

    /// Follow every committed change to a village record.
    pub fn watch_village(&self, village_id: VillageId) -> Subscription {
        self.store.subscribe(&keys::village(village_id))
    }
}
