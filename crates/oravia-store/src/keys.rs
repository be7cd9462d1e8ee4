//! Key layout of the shared store.
//!
//! | Pattern | Record |
//! |---------|--------|
//! | `villages:{id}` | Village |
//! | `coords:{x}:{y}` | `VillageId` claim, one per tile |
//! | `commands:{id}` | Command |
//! | `reports:{owner}:{id}` | Report |
//! | `tribes:{id}` | Tribe |
//! | `scheduler:lease` | Scheduler lease |
//!
//! A record key is always `{collection}:{id}`, so the collection of any key
//! is everything before its last `:`.

use oravia_types::{CommandId, Coords, ReportId, TribeId, UserId, VillageId};

/// Collection of all villages.
pub const VILLAGES: &str = "villages";

/// Collection of all in-flight commands.
pub const COMMANDS: &str = "commands";

/// Collection of all tribes.
pub const TRIBES: &str = "tribes";

/// Key of the scheduler election record.
pub const SCHEDULER_LEASE: &str = "scheduler:lease";

/// Key of a record in a collection.
pub fn record(collection: &str, id: &str) -> String {
    format!("{collection}:{id}")
}

/// Collection a record key belongs to.
pub fn collection_of(key: &str) -> &str {
    key.rsplit_once(':').map_or(key, |(collection, _)| collection)
}

/// Key of a village record.
pub fn village(id: VillageId) -> String {
    record(VILLAGES, &id.to_string())
}

/// Key of the claim on a map tile.
pub fn coords(at: Coords) -> String {
    format!("coords:{}:{}", at.x, at.y)
}

/// Key of a command record.
pub fn command(id: CommandId) -> String {
    record(COMMANDS, &id.to_string())
}

/// Collection of one player's reports.
pub fn reports_of(owner: UserId) -> String {
    format!("reports:{owner}")
}

/// Key of one report.
pub fn report(owner: UserId, id: ReportId) -> String {
    record(&reports_of(owner), &id.to_string())
}

/// Key of a tribe record.
pub fn tribe(id: TribeId) -> String {
    record(TRIBES, &id.to_string())
}
