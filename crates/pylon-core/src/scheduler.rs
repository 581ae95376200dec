//! Recipe invocation: resolves the recipe, validates the chosen coin input and records a pending
//! execution. No balance moves here; funds are debited at settlement.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bounds::RuntimeBounds;
use crate::ports::{Ledger, RecipeCatalog};
use crate::state::ExecutionState;
use crate::types::{Address, FeeRate, PendingExecution, PendingExecutionId, RecipeKey};
use crate::{PylonError, Result};

/// Invocation message submitted by a payer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRecipe {
    pub cookbook_id: String,
    pub recipe_id: String,
    pub coin_input_index: usize,
    pub payer: Address,
}

impl ExecuteRecipe {
    pub fn key(&self) -> RecipeKey {
        RecipeKey::new(self.cookbook_id.clone(), self.recipe_id.clone())
    }
}

#[derive(Clone, Debug)]
pub struct ExecutionScheduler {
    bounds: RuntimeBounds,
    default_fee_rate: FeeRate,
}

impl ExecutionScheduler {
    pub fn new(bounds: RuntimeBounds, default_fee_rate: FeeRate) -> Self {
        Self {
            bounds,
            default_fee_rate,
        }
    }

    pub fn default_fee_rate(&self) -> FeeRate {
        self.default_fee_rate
    }

    /// Preconditions:
    /// - `current_height` is the height of the block being processed.
    ///
    /// Postconditions:
    /// - On `Ok(id)`, exactly one pending entry with `id` was added, maturing at
    ///   `current_height + block_interval`. No balance changed.
    /// - On `Err`, `state` is unchanged.
    pub fn invoke(
        &self,
        state: &mut ExecutionState,
        catalog: &dyn RecipeCatalog,
        ledger: &dyn Ledger,
        msg: &ExecuteRecipe,
        current_height: u64,
    ) -> Result<PendingExecutionId> {
        let key = msg.key();
        let recipe = catalog
            .recipe(&key)?
            .ok_or_else(|| PylonError::RecipeNotFound(key.clone()))?;
        if !recipe.enabled {
            return Err(PylonError::RecipeDisabled(key));
        }

        let input = recipe
            .coin_inputs
            .get(msg.coin_input_index)
            .ok_or(PylonError::InvalidInputSelection {
                index: msg.coin_input_index,
                available: recipe.coin_inputs.len(),
            })?;

        // Advisory: funds are not reserved and are re-checked at settlement.
        if !ledger.has_coins(&msg.payer, &input.coins) {
            return Err(PylonError::InsufficientFunds {
                account: msg.payer.clone(),
                required: input.coins.clone(),
                available: ledger.balances(&msg.payer),
            });
        }

        if state.pending_len() >= self.bounds.max_pending_executions {
            return Err(PylonError::BoundedValueExceeded(format!(
                "pending executions at limit ({})",
                self.bounds.max_pending_executions
            )));
        }

        let maturity_height = current_height
            .checked_add(recipe.block_interval)
            .ok_or_else(|| {
                PylonError::BoundedValueExceeded(format!(
                    "maturity height overflow: {current_height} + {}",
                    recipe.block_interval
                ))
            })?;

        let id = state.allocate_id()?;
        let entry = PendingExecution {
            id,
            recipe: key,
            coin_input_index: msg.coin_input_index,
            payer: msg.payer.clone(),
            recipe_owner: recipe.owner.clone(),
            escrow: input.coins.clone(),
            fee_rate: recipe.fee_rate.unwrap_or(self.default_fee_rate),
            outputs: recipe.outputs.clone(),
            created_height: current_height,
            maturity_height,
        };
        debug!(
            id = %id,
            recipe = %entry.recipe,
            payer = %entry.payer,
            escrow = %entry.escrow,
            maturity_height,
            "pending execution created"
        );
        state.insert_pending(entry)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{InMemoryLedger, InMemoryRecipeCatalog};
    use crate::types::{CoinInput, Coins, Denom, Recipe};

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn upylon(n: u128) -> Coins {
        Coins::single(Denom::new("upylon").unwrap(), n)
    }

    fn fixture(interval: u64) -> (InMemoryRecipeCatalog, InMemoryLedger) {
        let mut catalog = InMemoryRecipeCatalog::new(RuntimeBounds::default());
        catalog
            .insert(Recipe {
                cookbook_id: "cb".into(),
                id: "r".into(),
                owner: addr("owner"),
                coin_inputs: vec![CoinInput { coins: upylon(100) }],
                block_interval: interval,
                fee_rate: None,
                outputs: Vec::new(),
                enabled: true,
            })
            .unwrap();
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr("payer"), &upylon(100)).unwrap();
        (catalog, ledger)
    }

    fn msg(index: usize) -> ExecuteRecipe {
        ExecuteRecipe {
            cookbook_id: "cb".into(),
            recipe_id: "r".into(),
            coin_input_index: index,
            payer: addr("payer"),
        }
    }

    fn scheduler() -> ExecutionScheduler {
        ExecutionScheduler::new(RuntimeBounds::default(), FeeRate::default())
    }

    #[test]
    fn invoke_records_pending_without_moving_funds() {
        let (catalog, ledger) = fixture(5);
        let mut state = ExecutionState::new();
        let id = scheduler()
            .invoke(&mut state, &catalog, &ledger, &msg(0), 10)
            .unwrap();
        let entry = state.pending(id).unwrap();
        assert_eq!(entry.maturity_height, 15);
        assert_eq!(entry.fee_rate, FeeRate::default());
        assert_eq!(entry.recipe_owner, addr("owner"));
        assert_eq!(ledger.balances(&addr("payer")), upylon(100));
    }

    #[test]
    fn out_of_range_input_leaves_state_untouched() {
        let (catalog, ledger) = fixture(5);
        let mut state = ExecutionState::new();
        let err = scheduler()
            .invoke(&mut state, &catalog, &ledger, &msg(3), 10)
            .unwrap_err();
        assert!(matches!(
            err,
            PylonError::InvalidInputSelection {
                index: 3,
                available: 1
            }
        ));
        assert_eq!(state, ExecutionState::new());
    }

    #[test]
    fn unknown_and_disabled_recipes_rejected() {
        let (mut catalog, ledger) = fixture(5);
        let mut state = ExecutionState::new();
        let mut unknown = msg(0);
        unknown.recipe_id = "nope".into();
        assert!(matches!(
            scheduler().invoke(&mut state, &catalog, &ledger, &unknown, 1),
            Err(PylonError::RecipeNotFound(_))
        ));

        catalog
            .set_enabled(&RecipeKey::new("cb", "r"), false)
            .unwrap();
        assert!(matches!(
            scheduler().invoke(&mut state, &catalog, &ledger, &msg(0), 1),
            Err(PylonError::RecipeDisabled(_))
        ));
    }

    #[test]
    fn unfunded_payer_rejected() {
        let (catalog, _) = fixture(5);
        let ledger = InMemoryLedger::new();
        let mut state = ExecutionState::new();
        assert!(matches!(
            scheduler().invoke(&mut state, &catalog, &ledger, &msg(0), 1),
            Err(PylonError::InsufficientFunds { .. })
        ));
        assert_eq!(state.pending_len(), 0);
    }

    #[test]
    fn pending_bound_enforced() {
        let (catalog, ledger) = fixture(5);
        let mut state = ExecutionState::new();
        let sched = ExecutionScheduler::new(
            RuntimeBounds::new(1, 4, 4).unwrap(),
            FeeRate::default(),
        );
        sched.invoke(&mut state, &catalog, &ledger, &msg(0), 1).unwrap();
        assert!(matches!(
            sched.invoke(&mut state, &catalog, &ledger, &msg(0), 1),
            Err(PylonError::BoundedValueExceeded(_))
        ));
    }

    #[test]
    fn maturity_overflow_rejected() {
        let (catalog, ledger) = fixture(5);
        let mut state = ExecutionState::new();
        assert!(matches!(
            scheduler().invoke(&mut state, &catalog, &ledger, &msg(0), u64::MAX),
            Err(PylonError::BoundedValueExceeded(_))
        ));
        assert_eq!(state.next_id(), 0);
    }
}
