//! Pylon recipe ledger core.
//!
//! Deterministic state machine for two flows that run inside a chain's block processing:
//! - delayed-settlement recipe execution (pending → completed → actualized), and
//! - epoch-triggered, stake-weighted redistribution of the collected fees.
//!
//! The core never stores balances. The balance ledger, the stake registry, the recipe catalog
//! and the item inventory are reached through the traits in [`ports`] and are always passed in
//! explicitly by the host driver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bounds;
pub mod components;
pub mod config;
pub mod distribution;
pub mod events;
pub mod hash;
pub mod invariants;
pub mod math;
pub mod pipeline;
pub mod ports;
pub mod scheduler;
pub mod settlement;
pub mod state;
pub mod types;

pub use bounds::RuntimeBounds;
pub use config::PylonConfig;
pub use distribution::{
    calculate_reward_shares, distribution_percentages, DistributionOutcome,
    DistributionPercentage, RewardDistributor, RewardShare,
};
pub use pipeline::{BlockReport, RecipePipeline};
pub use ports::{Delegation, ItemInventory, Ledger, RecipeCatalog, StakeRegistry, StakeSnapshot};
pub use scheduler::{ExecuteRecipe, ExecutionScheduler};
pub use settlement::{Actualization, Completion, SettlementEngine, SweepReport};
pub use state::ExecutionState;
pub use types::{
    Address, Amount, Coin, CoinInput, Coins, Denom, Execution, ExecutionId, FeeRate, ItemOutput,
    PendingExecution, PendingExecutionId, Recipe, RecipeKey,
};

/// 32-byte hash newtype used for event-log commitments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Unified error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PylonError {
    // Input validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bounded value exceeded: {0}")]
    BoundedValueExceeded(String),

    // Invocation errors
    #[error("Recipe not found: {0}")]
    RecipeNotFound(RecipeKey),

    #[error("Recipe disabled: {0}")]
    RecipeDisabled(RecipeKey),

    #[error("Invalid coin input selection: index {index}, recipe offers {available}")]
    InvalidInputSelection { index: usize, available: usize },

    #[error("Insufficient funds for {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: Address,
        required: Coins,
        available: Coins,
    },

    // Settlement errors
    #[error("Settlement of pending execution {id} failed: {reason}")]
    SettlementFailed { id: PendingExecutionId, reason: String },

    #[error("No pending execution or execution with id {0}")]
    NotFound(PendingExecutionId),

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    // Configuration / IO errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, PylonError>;
