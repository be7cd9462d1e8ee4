//! Game service, command scheduler, and run loop of the Oravia kernel.
//!
//! Everything here talks to a shared [`Store`](oravia_store::Store) and
//! relies on the pure transitions of `oravia-village` for the actual game
//! rules.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `oravia-config.yaml` into
//!   strongly-typed structs.
//! - [`service`] -- Player actions: upgrades, recruitment, attacks,
//!   founding villages and tribes, read views.
//! - [`scheduler`] -- Exactly-once application of arrived commands.
//! - [`lease`] -- Election of the single active scheduler.
//! - [`runner`] -- Poll loop with stop control.

pub mod config;
pub mod lease;
pub mod runner;
pub mod scheduler;
pub mod service;

pub use config::{ConfigError, KernelConfig, StoreBackend};
pub use lease::{Lease, SchedulerLease};
pub use runner::{RunSummary, RunnerControl, run_scheduler};
pub use scheduler::{ProcessError, Processed, Scheduler, TickSummary};
pub use service::{GameService, ServiceError, VillageView};
