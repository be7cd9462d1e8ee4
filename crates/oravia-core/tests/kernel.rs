//! End-to-end tests of the game service and scheduler over the memory store.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::missing_panics_doc
)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use oravia_core::{GameService, KernelConfig, Scheduler, ServiceError, TickSummary};
use oravia_store::{MemoryStore, Store, keys};
use oravia_types::{
    Army, BattleStatus, BuildingType, Command, CommandId, CommandKind, Coords, ReportKind,
    Resources, UnitType, UserId, Village, Winner,
};
use oravia_village::{ActionError, apply_battle, battle_report, combat};
use oravia_world::accrue;

fn t0() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(1_767_225_600_000).unwrap()
}

struct World {
    store: MemoryStore,
    service: GameService<MemoryStore>,
    scheduler: Scheduler<MemoryStore>,
    config: Arc<KernelConfig>,
}

fn world_with(config: KernelConfig) -> World {
    let store = MemoryStore::new(64);
    let config = Arc::new(config);
    World {
        service: GameService::new(store.clone(), Arc::clone(&config)),
        scheduler: Scheduler::new(store.clone(), Arc::clone(&config)),
        store,
        config,
    }
}

fn world() -> World {
    world_with(KernelConfig::default())
}

fn army(pairs: &[(UnitType, u32)]) -> Army {
    pairs.iter().copied().collect()
}

impl World {
    async fn found(&self, name: &str, at: Coords) -> Village {
        self.service
            .found_village(UserId::new(), name, Some(at), t0())
            .await
            .unwrap()
    }

    async fn village(&self, village: &Village) -> Village {
        self.store
            .read(&keys::village(village.id))
            .await
            .unwrap()
            .expect("village exists")
    }

    async fn commands(&self) -> Vec<Command> {
        self.store
            .query(keys::COMMANDS, |_: &Command| true)
            .await
            .unwrap()
    }
}

// ---------------------------------------------------------------------------
// Founding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn founded_village_has_the_starting_state() {
    let w = world();
    let v = w.found("Ashford", Coords::new(2, 3)).await;

    assert_eq!(v.points, 50);
    assert_eq!(v.resources.amounts(), Resources::new(500, 500, 500));
    assert_eq!(v.resources.last_update, t0());
    assert_eq!(v.buildings.get(BuildingType::Wall), 0);
    assert_eq!(v.buildings.get(BuildingType::Headquarters), 1);
    assert!(v.troops.is_empty());

    let claim: Option<oravia_types::VillageId> =
        w.store.read(&keys::coords(Coords::new(2, 3))).await.unwrap();
    assert_eq!(claim, Some(v.id));
    assert_eq!(w.village(&v).await, v);
}

#[tokio::test]
async fn a_tile_holds_one_village() {
    let w = world();
    w.found("Ashford", Coords::new(2, 3)).await;
    let err = w
        .service
        .found_village(UserId::new(), "Briar", Some(Coords::new(2, 3)), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TileOccupied { .. }));

    let err = w
        .service
        .found_village(UserId::new(), "Briar", Some(Coords::new(15, 0)), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::OutsideMap { .. }));
}

#[tokio::test]
async fn random_founding_gives_up_on_a_full_map() {
    let mut config = KernelConfig::default();
    config.world.map_size = 1;
    config.world.found_attempts = 3;
    let w = world_with(config);

    let first = w
        .service
        .found_village(UserId::new(), "Only", None, t0())
        .await
        .unwrap();
    assert_eq!(first.coords, Coords::new(0, 0));

    let err = w
        .service
        .found_village(UserId::new(), "Second", None, t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MapFull { attempts: 3 }));
}

// ---------------------------------------------------------------------------
// Construction and recruitment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upgrade_is_paid_now_and_completes_later() {
    let w = world();
    let v = w.found("Ashford", Coords::new(0, 0)).await;

    let order = w
        .service
        .upgrade_building(v.id, BuildingType::Headquarters, t0())
        .await
        .unwrap();
    assert_eq!(order.target_level, 2);
    assert!(order.completes_at > t0());

    let stored = w.village(&v).await;
    assert_eq!(stored.resources.amounts(), Resources::new(260, 260, 260));
    assert_eq!(stored.buildings.get(BuildingType::Headquarters), 1);

    let later = order.completes_at + Duration::hours(1);
    let view = w.service.village_view(v.id, later).await.unwrap();
    assert_eq!(view.village.buildings.get(BuildingType::Headquarters), 2);
    assert_eq!(view.village.points, 60);
    assert!(view.village.build_queue.is_empty());
    assert!(view.projection.resources.wood > 260);
}

#[tokio::test]
async fn view_accrues_at_old_rates_until_the_field_is_built() {
    let w = world();
    let v = w.found("Ashford", Coords::new(0, 0)).await;
    let order = w
        .service
        .upgrade_building(v.id, BuildingType::TimberCamp, t0())
        .await
        .unwrap();
    let stored = w.village(&v).await;

    let later = order.completes_at + Duration::hours(1);
    let view = w.service.village_view(v.id, later).await.unwrap();

    let rules = &w.config.rules;
    let at_completion = accrue(rules, &stored.resources, &stored.buildings, order.completes_at);
    let mut built = stored.buildings.clone();
    built.set(BuildingType::TimberCamp, 2);
    let expected = accrue(rules, &at_completion, &built, later);
    assert_eq!(view.projection.resources, expected.amounts());
    assert_eq!(view.village.resources, expected);
    assert_eq!(view.village.buildings.get(BuildingType::TimberCamp), 2);
}

#[tokio::test]
async fn upgrade_rejections_leave_the_village_untouched() {
    let mut config = KernelConfig::default();
    config.village.max_build_queue = 2;
    let w = world_with(config);
    let v = w.found("Ashford", Coords::new(0, 0)).await;

    w.service
        .upgrade_building(v.id, BuildingType::Barracks, t0())
        .await
        .unwrap();
    let before = w.village(&v).await;

    // The second barracks level is priced one level higher.
    let err = w
        .service
        .upgrade_building(v.id, BuildingType::Barracks, t0())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Action(ActionError::InsufficientResources { .. })
    ));
    assert_eq!(w.village(&v).await, before);

    w.service
        .upgrade_building(v.id, BuildingType::Wall, t0())
        .await
        .unwrap();
    let err = w
        .service
        .upgrade_building(v.id, BuildingType::Wall, t0())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Action(ActionError::QueueFull { limit: 2 })
    ));
}

#[tokio::test]
async fn recruitment_respects_the_farm() {
    let mut config = KernelConfig::default();
    config.rules.units.spear.cost = Resources::ZERO;
    let w = world_with(config);
    let v = w.found("Ashford", Coords::new(0, 0)).await;

    let err = w
        .service
        .recruit_unit(v.id, UnitType::Spear, 241, t0())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Action(ActionError::PopulationLimitExceeded {
            required: 241,
            available: 240
        })
    ));

    w.service
        .recruit_unit(v.id, UnitType::Spear, 240, t0())
        .await
        .unwrap();
    assert_eq!(w.village(&v).await.troops.get(UnitType::Spear), 240);
}

#[tokio::test]
async fn missing_village_is_reported() {
    let w = world();
    let err = w
        .service
        .recruit_unit(oravia_types::VillageId::new(), UnitType::Spear, 1, t0())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Action(ActionError::RecordMissing { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_recruits_never_lose_updates() {
    let w = world();
    let v = w.found("Ashford", Coords::new(0, 0)).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = w.service.clone();
        let id = v.id;
        handles.push(tokio::spawn(async move {
            service.recruit_unit(id, UnitType::Spear, 1, t0()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = w.village(&v).await;
    assert_eq!(stored.troops.get(UnitType::Spear), 8);
    assert_eq!(stored.resources.amounts(), Resources::new(100, 260, 420));
}

// ---------------------------------------------------------------------------
// Sending armies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_army_validates_before_touching_troops() {
    let w = world();
    let home = w.found("Ashford", Coords::new(0, 0)).await;
    let target = w.found("Briar", Coords::new(3, 4)).await;

    let err = w
        .service
        .send_army(home.id, Coords::new(9, 9), army(&[(UnitType::Axe, 1)]), t0())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Action(ActionError::TargetNotFound { .. })
    ));

    let err = w
        .service
        .send_army(home.id, home.coords, army(&[(UnitType::Axe, 1)]), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Action(ActionError::SelfTargetRejected)));

    let err = w
        .service
        .send_army(home.id, target.coords, Army::garrison(), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Action(ActionError::EmptyForceRejected)));

    let err = w
        .service
        .send_army(home.id, target.coords, army(&[(UnitType::Axe, 1)]), t0())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Action(ActionError::InsufficientTroops {
            unit: UnitType::Axe,
            requested: 1,
            available: 0
        })
    ));
    assert!(w.commands().await.is_empty());
}

#[tokio::test]
async fn send_army_stamps_arrival_from_the_slowest_unit() {
    let w = world();
    let home = w.found("Ashford", Coords::new(0, 0)).await;
    let target = w.found("Briar", Coords::new(3, 4)).await;
    w.service
        .recruit_unit(home.id, UnitType::Axe, 4, t0())
        .await
        .unwrap();
    w.service
        .recruit_unit(home.id, UnitType::Scout, 1, t0())
        .await
        .unwrap();

    let units = army(&[(UnitType::Axe, 4), (UnitType::Scout, 1)]);
    let command = w
        .service
        .send_army(home.id, target.coords, units.clone(), t0())
        .await
        .unwrap();

    // Axes at 18 minutes per field over 5 fields at speed 10.
    assert_eq!(command.arrival_time - command.start_time, Duration::minutes(9));
    assert_eq!(command.kind, CommandKind::Attack);
    assert_eq!(command.target_id, target.id);
    assert!(w.village(&home).await.troops.is_empty());

    let incoming = w.service.incoming_attacks(target.id).await.unwrap();
    assert_eq!(incoming, vec![command]);
    assert!(w.service.incoming_attacks(home.id).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Home at (0,0) with 8 axes sent at `t0` to an empty village at (3,4).
async fn raid(w: &World) -> (Village, Village, Command) {
    let home = w.found("Ashford", Coords::new(0, 0)).await;
    let target = w.found("Briar", Coords::new(3, 4)).await;
    w.service
        .recruit_unit(home.id, UnitType::Axe, 8, t0())
        .await
        .unwrap();
    let command = w
        .service
        .send_army(home.id, target.coords, army(&[(UnitType::Axe, 8)]), t0())
        .await
        .unwrap();
    (home, target, command)
}

#[tokio::test]
async fn nothing_happens_before_arrival() {
    let w = world();
    let (_, target, command) = raid(&w).await;

    let summary = w
        .scheduler
        .tick(command.arrival_time - Duration::milliseconds(1))
        .await
        .unwrap();
    assert_eq!(summary, TickSummary::default());
    assert_eq!(w.village(&target).await, target);
}

#[tokio::test]
async fn attack_then_return_moves_loot_home() {
    let w = world();
    let (home, target, command) = raid(&w).await;
    let arrival = command.arrival_time;
    let rules = &w.config.rules;

    let expected_stock = accrue(rules, &target.resources, &target.buildings, arrival).amounts();
    let expected_loot = combat::loot(&expected_stock, 80);

    let summary = w.scheduler.tick(arrival).await.unwrap();
    assert_eq!(summary.due, 1);
    assert_eq!(summary.attacks, 1);
    assert_eq!(summary.failed, 0);

    let defender = w.village(&target).await;
    assert_eq!(
        defender.resources.amounts(),
        expected_stock.checked_sub(&expected_loot).unwrap()
    );
    assert_eq!(defender.resources.last_update, arrival);
    // The journal entry stays, closed, after the command is gone.
    assert_eq!(defender.settlements[&command.id].closed_at, Some(arrival));

    let attacker_reports = w.service.reports(home.owner_id).await.unwrap();
    assert_eq!(attacker_reports.len(), 1);
    let sent = &attacker_reports[0];
    assert_eq!(sent.kind, ReportKind::AttackSent);
    assert_eq!(sent.winner, Winner::Attacker);
    assert_eq!(sent.status, BattleStatus::Green);
    assert_eq!(sent.loot, expected_loot);
    assert_eq!(sent.command_id, command.id);

    let defender_reports = w.service.reports(target.owner_id).await.unwrap();
    assert_eq!(defender_reports.len(), 1);
    assert_eq!(defender_reports[0].kind, ReportKind::Defense);

    let pending = w.commands().await;
    assert_eq!(pending.len(), 1);
    let back = &pending[0];
    assert_eq!(back.kind, CommandKind::Return);
    assert_eq!(back.id, CommandId::derived(command.id.into_inner(), "return"));
    assert_eq!(back.target_id, home.id);
    assert_eq!(back.units.get(UnitType::Axe), 8);
    assert_eq!(back.resources, Some(expected_loot));
    assert_eq!(back.arrival_time, arrival + Duration::minutes(9));

    let before_return = w.village(&home).await;
    assert!(before_return.troops.is_empty());

    let summary = w.scheduler.tick(back.arrival_time).await.unwrap();
    assert_eq!(summary.returns, 1);
    assert!(w.commands().await.is_empty());

    let returned = w.village(&home).await;
    assert_eq!(returned.troops.get(UnitType::Axe), 8);
    assert_eq!(
        returned.resources.amounts(),
        before_return.resources.amounts().saturating_add(&expected_loot)
    );
    assert_eq!(returned.resources.last_update, before_return.resources.last_update);
    assert_eq!(returned.settlements[&back.id].closed_at, Some(back.arrival_time));
}

#[tokio::test]
async fn failed_attack_sends_nothing_home() {
    let w = world();
    let (home, target, command) = raid(&w).await;
    // 7 swords behind a level 0 wall: def 400 against off 320.
    w.service
        .recruit_unit(target.id, UnitType::Sword, 7, t0())
        .await
        .unwrap();

    let summary = w.scheduler.tick(command.arrival_time).await.unwrap();
    assert_eq!(summary.attacks, 1);
    assert!(w.commands().await.is_empty());

    let defender = w.village(&target).await;
    assert_eq!(defender.troops.get(UnitType::Sword), 2);

    let reports = w.service.reports(home.owner_id).await.unwrap();
    assert_eq!(reports[0].winner, Winner::Defender);
    assert_eq!(reports[0].status, BattleStatus::Red);
    assert_eq!(reports[0].loot, Resources::ZERO);
    assert_eq!(reports[0].attacker_losses.get(UnitType::Axe), 8);
}

#[tokio::test]
async fn replayed_attack_is_not_fought_twice() {
    let w = world();
    let (home, target, command) = raid(&w).await;
    let arrival = command.arrival_time;
    let rules = w.config.rules.clone();

    // A scheduler that committed the battle and crashed before anything else.
    let cmd = command.clone();
    let first = w
        .store
        .transact(&keys::village(target.id), move |current: Option<Village>| {
            let mut village = current.unwrap();
            let applied = apply_battle(&rules, &mut village, &cmd, arrival)?;
            Ok::<_, ActionError>((village, applied.value))
        })
        .await
        .unwrap();
    let after_first = w.village(&target).await;
    assert!(after_first.settlements.contains_key(&command.id));

    let later = arrival + Duration::minutes(1);
    let summary = w.scheduler.tick(later).await.unwrap();
    assert_eq!(summary.attacks, 1);

    let defender = w.village(&target).await;
    assert_eq!(defender.resources.amounts(), after_first.resources.amounts());
    assert_eq!(defender.settlements[&command.id].closed_at, Some(later));

    let reports = w.service.reports(home.owner_id).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].loot, first.loot);
    // The return leg starts when the battle was first settled.
    let back = &w.commands().await[0];
    assert_eq!(back.start_time, arrival);
}

#[tokio::test]
async fn partial_writes_are_completed_without_duplicates() {
    let w = world();
    let (home, target, command) = raid(&w).await;
    let arrival = command.arrival_time;
    let rules = w.config.rules.clone();

    // A scheduler that committed the battle and one report, then crashed.
    let cmd = command.clone();
    let outcome = w
        .store
        .transact(&keys::village(target.id), move |current: Option<Village>| {
            let mut village = current.unwrap();
            let applied = apply_battle(&rules, &mut village, &cmd, arrival)?;
            Ok::<_, ActionError>((village, applied.value))
        })
        .await
        .unwrap();
    let after_battle = w.village(&target).await;
    let defense = battle_report(&command, &outcome, ReportKind::Defense, arrival);
    assert!(
        w.store
            .append(&keys::reports_of(target.owner_id), &defense.id.to_string(), &defense)
            .await
            .unwrap()
    );

    let summary = w.scheduler.tick(arrival).await.unwrap();
    assert_eq!(summary.attacks, 1);
    assert_eq!(w.service.reports(home.owner_id).await.unwrap().len(), 1);
    assert_eq!(w.service.reports(target.owner_id).await.unwrap(), vec![defense]);
    let pending = w.commands().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, CommandKind::Return);
    assert_eq!(
        w.village(&target).await.resources.amounts(),
        after_battle.resources.amounts()
    );
}

#[tokio::test]
async fn stale_copy_of_a_finished_attack_is_not_fought_again() {
    let w = world();
    let (home, target, command) = raid(&w).await;
    let arrival = command.arrival_time;

    w.scheduler.tick(arrival).await.unwrap();
    let defender = w.village(&target).await;
    let pending = w.commands().await;

    // A second scheduler still holding the command from an earlier scan.
    let processed = w.scheduler.process(&command, arrival).await.unwrap();
    assert_eq!(processed, oravia_core::Processed::Attack);

    assert_eq!(w.village(&target).await.resources, defender.resources);
    assert_eq!(w.village(&target).await.troops, defender.troops);
    assert_eq!(w.service.reports(home.owner_id).await.unwrap().len(), 1);
    assert_eq!(w.service.reports(target.owner_id).await.unwrap().len(), 1);
    assert_eq!(w.commands().await, pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ticks_apply_each_command_once() {
    let w = world();
    let (home, target, command) = raid(&w).await;
    let arrival = command.arrival_time;
    let stock = accrue(&w.config.rules, &target.resources, &target.buildings, arrival).amounts();
    let loot = combat::loot(&stock, 80);

    let other = Scheduler::new(w.store.clone(), Arc::clone(&w.config));
    let (a, b) = tokio::join!(w.scheduler.tick(arrival), other.tick(arrival));
    assert_eq!(a.unwrap().failed + b.unwrap().failed, 0);

    let defender = w.village(&target).await;
    assert_eq!(defender.resources.amounts(), stock.checked_sub(&loot).unwrap());
    assert_eq!(w.service.reports(home.owner_id).await.unwrap().len(), 1);
    assert_eq!(w.service.reports(target.owner_id).await.unwrap().len(), 1);
    let pending = w.commands().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].resources, Some(loot));
}

#[tokio::test]
async fn late_pickup_after_the_retention_window_still_replays() {
    let w = world();
    let (home, target, command) = raid(&w).await;
    let arrival = command.arrival_time;
    let rules = w.config.rules.clone();

    // Battle committed, then the scheduler stayed down for longer than
    // the journal retention.
    let cmd = command.clone();
    w.store
        .transact(&keys::village(target.id), move |current: Option<Village>| {
            let mut village = current.unwrap();
            let applied = apply_battle(&rules, &mut village, &cmd, arrival)?;
            Ok::<_, ActionError>((village, applied.value))
        })
        .await
        .unwrap();
    let after_battle = w.village(&target).await;

    let much_later = arrival + Duration::hours(25);
    let summary = w.scheduler.tick(much_later).await.unwrap();
    assert_eq!(summary.attacks, 1);

    let defender = w.village(&target).await;
    assert_eq!(defender.resources, after_battle.resources);
    assert_eq!(defender.settlements[&command.id].closed_at, Some(much_later));
    assert_eq!(w.service.reports(home.owner_id).await.unwrap().len(), 1);

    // A full day of production refills the warehouse; nothing was taken twice.
    let view = w.service.village_view(target.id, much_later).await.unwrap();
    let cap = view.projection.storage_cap;
    assert_eq!(view.projection.resources, Resources::new(cap, cap, cap));
}

#[tokio::test]
async fn closed_journal_entries_expire_on_a_later_command() {
    let mut config = KernelConfig::default();
    config.scheduler.settlement_retention_ms = 60_000;
    let w = world_with(config);
    let (home, target, command) = raid(&w).await;
    let arrival = command.arrival_time;

    w.scheduler.tick(arrival).await.unwrap();
    assert!(w.village(&target).await.settlements.contains_key(&command.id));

    w.service
        .recruit_unit(home.id, UnitType::Axe, 1, arrival)
        .await
        .unwrap();
    let second = w
        .service
        .send_army(home.id, target.coords, army(&[(UnitType::Axe, 1)]), arrival)
        .await
        .unwrap();
    w.scheduler.tick(second.arrival_time).await.unwrap();

    let defender = w.village(&target).await;
    assert!(!defender.settlements.contains_key(&command.id));
    assert!(defender.settlements.contains_key(&second.id));
}

#[tokio::test]
async fn leftover_open_entries_close_once_their_command_is_gone() {
    let mut config = KernelConfig::default();
    config.scheduler.settlement_retention_ms = 60_000;
    let w = world_with(config);
    let (home, target, command) = raid(&w).await;
    let arrival = command.arrival_time;
    let rules = w.config.rules.clone();

    // Battle committed and command deleted, but the entry was never closed.
    let cmd = command.clone();
    w.store
        .transact(&keys::village(target.id), move |current: Option<Village>| {
            let mut village = current.unwrap();
            apply_battle(&rules, &mut village, &cmd, arrival)?;
            Ok::<_, ActionError>((village, ()))
        })
        .await
        .unwrap();
    w.store.delete(&keys::command(command.id)).await.unwrap();

    w.service
        .recruit_unit(home.id, UnitType::Axe, 1, arrival)
        .await
        .unwrap();
    let second = w
        .service
        .send_army(home.id, target.coords, army(&[(UnitType::Axe, 1)]), arrival)
        .await
        .unwrap();
    w.scheduler.tick(second.arrival_time).await.unwrap();

    let defender = w.village(&target).await;
    assert_eq!(defender.settlements[&command.id].closed_at, Some(second.arrival_time));
    assert_eq!(defender.settlements[&second.id].closed_at, Some(second.arrival_time));
}

#[tokio::test]
async fn ticking_twice_over_the_same_instant_changes_nothing() {
    let w = world();
    let (home, target, command) = raid(&w).await;
    let arrival = command.arrival_time;

    w.scheduler.tick(arrival).await.unwrap();
    let defender = w.village(&target).await;
    let attacker = w.village(&home).await;
    let attacker_reports = w.service.reports(home.owner_id).await.unwrap();
    let defender_reports = w.service.reports(target.owner_id).await.unwrap();
    let pending = w.commands().await;

    let summary = w.scheduler.tick(arrival).await.unwrap();
    assert_eq!(summary, TickSummary::default());
    assert_eq!(w.village(&target).await, defender);
    assert_eq!(w.village(&home).await, attacker);
    assert_eq!(w.service.reports(home.owner_id).await.unwrap(), attacker_reports);
    assert_eq!(w.service.reports(target.owner_id).await.unwrap(), defender_reports);
    assert_eq!(w.commands().await, pending);
}

#[tokio::test]
async fn returning_army_joins_the_garrison() {
    let w = world();
    let home = w.found("Ashford", Coords::new(0, 0)).await;
    w.store
        .transact(&keys::village(home.id), |current: Option<Village>| {
            let mut village = current.unwrap();
            village.troops.set(UnitType::Axe, 2);
            village.resources.wood = 100;
            Ok::<_, ()>((village, ()))
        })
        .await
        .unwrap();

    let back = Command {
        id: CommandId::new(),
        kind: CommandKind::Return,
        origin_id: oravia_types::VillageId::new(),
        target_id: home.id,
        target_coords: home.coords,
        units: army(&[(UnitType::Axe, 9)]),
        start_time: t0(),
        arrival_time: t0(),
        resources: Some(Resources::new(50, 0, 0)),
    };
    w.store
        .append(keys::COMMANDS, &back.id.to_string(), &back)
        .await
        .unwrap();

    let summary = w.scheduler.tick(t0()).await.unwrap();
    assert_eq!(summary.returns, 1);
    let village = w.village(&home).await;
    assert_eq!(village.troops.get(UnitType::Axe), 11);
    assert_eq!(village.resources.wood, 150);
    assert!(w.commands().await.is_empty());
}

#[tokio::test]
async fn one_malformed_command_does_not_block_the_rest() {
    let w = world();
    let (_, target, command) = raid(&w).await;
    w.store
        .append(keys::COMMANDS, "garbage", &"not a command")
        .await
        .unwrap();

    let summary = w.scheduler.tick(command.arrival_time).await.unwrap();
    assert_eq!(summary.attacks, 1);
    assert!(w.village(&target).await.settlements.contains_key(&command.id));
}

#[tokio::test]
async fn command_for_a_vanished_village_is_dropped() {
    let w = world();
    let (home, target, command) = raid(&w).await;
    w.store.delete(&keys::village(target.id)).await.unwrap();

    let summary = w.scheduler.tick(command.arrival_time).await.unwrap();
    assert_eq!(summary.missing_targets, 1);
    assert!(w.commands().await.is_empty());
    // No refund.
    assert!(w.village(&home).await.troops.is_empty());
    assert!(w.service.reports(home.owner_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn attacks_on_one_village_apply_in_arrival_order() {
    let w = world();
    let target = w.found("Briar", Coords::new(5, 5)).await;
    let near = w.found("Near", Coords::new(5, 6)).await;
    let far = w.found("Far", Coords::new(5, 9)).await;
    // 4 spears: def 60 + 50, enough to cost the first army an axe.
    w.service
        .recruit_unit(target.id, UnitType::Spear, 4, t0())
        .await
        .unwrap();
    for v in [&near, &far] {
        w.service
            .recruit_unit(v.id, UnitType::Axe, 8, t0())
            .await
            .unwrap();
        w.service
            .send_army(v.id, target.coords, army(&[(UnitType::Axe, 8)]), t0())
            .await
            .unwrap();
    }

    let summary = w.scheduler.tick(t0() + Duration::hours(1)).await.unwrap();
    assert_eq!(summary.due, 2);
    assert_eq!(summary.attacks, 2);

    let near_report = w.service.reports(near.owner_id).await.unwrap().remove(0);
    let far_report = w.service.reports(far.owner_id).await.unwrap().remove(0);
    assert_eq!(near_report.status, BattleStatus::Yellow);
    assert_eq!(near_report.defender_losses.get(UnitType::Spear), 4);
    assert_eq!(far_report.status, BattleStatus::Green);
    assert_eq!(far_report.defender_losses.total(), 0);
    assert!(w.village(&target).await.troops.is_empty());
}

// ---------------------------------------------------------------------------
// Tribes, reports, watching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tribe_tag_is_upper_cased_and_linked() {
    let w = world();
    let v = w.found("Ashford", Coords::new(0, 0)).await;

    let tribe = w
        .service
        .create_tribe(v.owner_id, v.id, "Iron Wolves", "iw")
        .await
        .unwrap();
    assert_eq!(tribe.tag, "IW");
    assert!(tribe.members.contains(&v.owner_id));
    assert_eq!(w.village(&v).await.tribe_id, Some(tribe.id));

    let stored: Option<oravia_types::Tribe> = w.store.read(&keys::tribe(tribe.id)).await.unwrap();
    assert_eq!(stored, Some(tribe));

    let err = w
        .service
        .create_tribe(UserId::new(), v.id, "Usurpers", "US")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotOwner { .. }));
    let err = w
        .service
        .create_tribe(v.owner_id, v.id, "  ", "US")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::BlankName { .. }));
}

#[tokio::test]
async fn reports_can_be_marked_read_once() {
    let w = world();
    let (home, _, command) = raid(&w).await;
    w.scheduler.tick(command.arrival_time).await.unwrap();

    let report = w.service.reports(home.owner_id).await.unwrap().remove(0);
    assert!(!report.is_read);
    assert!(w.service.mark_report_read(home.owner_id, report.id).await.unwrap());
    assert!(!w.service.mark_report_read(home.owner_id, report.id).await.unwrap());
    assert!(w.service.reports(home.owner_id).await.unwrap()[0].is_read);

    // Another player cannot reach the report.
    let err = w
        .service
        .mark_report_read(UserId::new(), report.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Action(ActionError::RecordMissing { .. })
    ));
}

#[tokio::test]
async fn watchers_see_committed_village_changes() {
    let w = world();
    let v = w.found("Ashford", Coords::new(0, 0)).await;
    let mut watch = w.service.watch_village(v.id);

    w.service
        .upgrade_building(v.id, BuildingType::Farm, t0())
        .await
        .unwrap();

    let change = tokio::time::timeout(std::time::Duration::from_secs(1), watch.next())
        .await
        .expect("change arrives")
        .expect("feed open");
    let seen: Village = change.decode().unwrap().expect("village written");
    assert_eq!(seen.build_queue.len(), 1);
}
