//! Error types for the `oravia-village` crate.
//!
//! Every rejection aborts the surrounding transaction with no partial
//! effect; the caller sees exactly one of these variants.

use oravia_types::{CommandId, Coords, Resources, UnitType};

/// Reasons a player action or scheduler transition is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// The village cannot pay the cost at this instant.
    #[error("insufficient resources: need {needed:?}, have {available:?}")]
    InsufficientResources {
        /// Full price of the action.
        needed: Resources,
        /// Stockpile after accrual.
        available: Resources,
    },

    /// The farm cannot house the recruits.
    #[error("population limit exceeded: {required} required, {available} available")]
    PopulationLimitExceeded {
        /// Population after recruiting.
        required: u64,
        /// Population cap of the farm.
        available: u64,
    },

    /// More units requested than are at home.
    #[error("insufficient troops: wanted {requested} {unit:?}, have {available}")]
    InsufficientTroops {
        /// Unit type short.
        unit: UnitType,
        /// Quantity requested.
        requested: u32,
        /// Quantity at home.
        available: u32,
    },

    /// No village occupies the target tile.
    #[error("no village at {coords}")]
    TargetNotFound {
        /// Tile that was targeted.
        coords: Coords,
    },

    /// A village attacked itself.
    #[error("a village cannot target itself")]
    SelfTargetRejected,

    /// An action with no units at all.
    #[error("empty force rejected")]
    EmptyForceRejected,

    /// A record the action depends on does not exist.
    #[error("record missing: {record}")]
    RecordMissing {
        /// Store key or description of the missing record.
        record: String,
    },

    /// The construction queue is at its limit.
    #[error("construction queue full ({limit} orders)")]
    QueueFull {
        /// Configured queue limit.
        limit: usize,
    },

    /// The settlement journal holds an entry that does not match the command.
    #[error("settlement journal entry for {command_id} has no battle outcome")]
    JournalMismatch {
        /// Command whose entry is inconsistent.
        command_id: CommandId,
    },

    /// A quantity overflowed.
    #[error("arithmetic overflow: {context}")]
    Overflow {
        /// What was being computed.
        context: String,
    },
}
