//! Settlement of matured executions and actualization of their item outputs.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::invariants::check_execution;
use crate::ports::{ItemInventory, Ledger};
use crate::state::ExecutionState;
use crate::types::{
    Address, Coins, Execution, ExecutionId, FeeRate, PendingExecution, PendingExecutionId,
};
use crate::{PylonError, Result};

/// Result of a successful `complete` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The pending entry was settled by this call.
    Settled(Execution),
    /// The id had already been settled; nothing moved.
    AlreadySettled(Execution),
}

impl Completion {
    pub fn execution(&self) -> &Execution {
        match self {
            Completion::Settled(e) | Completion::AlreadySettled(e) => e,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFailure {
    pub id: PendingExecutionId,
    pub reason: String,
}

/// Per-block sweep outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub height: u64,
    pub settled: Vec<Execution>,
    pub failed: Vec<SettlementFailure>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actualization {
    Applied,
    AlreadyApplied,
}

/// Split `gross` into `(fee, net)` with `fee = floor(gross * rate)` per denomination.
///
/// Postconditions:
/// - `fee + net == gross` in every denomination.
pub fn split_fee(gross: &Coins, rate: FeeRate) -> Result<(Coins, Coins)> {
    let mut fee = Coins::new();
    for (denom, amount) in gross.iter() {
        fee.add_amount(denom.clone(), rate.fee_of(amount)?)?;
    }
    let net = gross.checked_sub(&fee)?;
    Ok((fee, net))
}

#[derive(Clone, Debug)]
pub struct SettlementEngine {
    fee_collector: Address,
}

impl SettlementEngine {
    pub fn new(fee_collector: Address) -> Self {
        Self { fee_collector }
    }

    pub fn fee_collector(&self) -> &Address {
        &self.fee_collector
    }

    /// Settle one pending execution.
    ///
    /// Postconditions:
    /// - `Ok(Settled(e))`: exactly one atomic transfer moved `e.net` to the recipe owner and
    ///   `e.fee` to the fee collector; the id left the pending set and `e` was recorded.
    /// - `Ok(AlreadySettled(e))`: no state or balance change.
    /// - `Err(NotFound)`: no state or balance change.
    /// - Any other `Err`: no balance changed and the pending entry was dropped.
    pub fn complete(
        &self,
        state: &mut ExecutionState,
        ledger: &mut dyn Ledger,
        id: PendingExecutionId,
        current_height: u64,
    ) -> Result<Completion> {
        if let Some(done) = state.execution(id) {
            return Ok(Completion::AlreadySettled(done.clone()));
        }
        let entry = state.pending(id).cloned().ok_or(PylonError::NotFound(id))?;

        let execution = match self.settle_entry(ledger, &entry, current_height) {
            Ok(execution) => execution,
            Err(err) => {
                state.remove_pending(id);
                warn!(
                    id = %id,
                    payer = %entry.payer,
                    error = %err,
                    "settlement failed; pending entry dropped"
                );
                return Err(err);
            }
        };

        state.remove_pending(id);
        state.insert_execution(execution.clone())?;
        debug!(
            id = %id,
            owner = %execution.recipe_owner,
            net = %execution.net,
            fee = %execution.fee,
            "execution settled"
        );
        Ok(Completion::Settled(execution))
    }

    fn settle_entry(
        &self,
        ledger: &mut dyn Ledger,
        entry: &PendingExecution,
        current_height: u64,
    ) -> Result<Execution> {
        let (fee, net) = split_fee(&entry.escrow, entry.fee_rate)?;
        let execution = Execution {
            id: entry.id,
            recipe: entry.recipe.clone(),
            payer: entry.payer.clone(),
            recipe_owner: entry.recipe_owner.clone(),
            gross: entry.escrow.clone(),
            fee,
            net,
            outputs: entry.outputs.clone(),
            completed_height: current_height,
        };
        // Validate before any balance moves.
        check_execution(&execution)?;

        let available = ledger.balances(&entry.payer);
        if !available.is_all_gte(&entry.escrow) {
            return Err(PylonError::InsufficientFunds {
                account: entry.payer.clone(),
                required: entry.escrow.clone(),
                available,
            });
        }

        let legs: Vec<(Address, Coins)> = [
            (execution.recipe_owner.clone(), execution.net.clone()),
            (self.fee_collector.clone(), execution.fee.clone()),
        ]
        .into_iter()
        .filter(|(_, coins)| !coins.is_zero())
        .collect();
        if !legs.is_empty() {
            ledger
                .send_multi(&entry.payer, &legs)
                .map_err(|e| PylonError::SettlementFailed {
                    id: entry.id,
                    reason: e.to_string(),
                })?;
        }
        Ok(execution)
    }

    /// Complete every entry with `maturity_height <= current_height` in `(maturity_height, id)`
    /// order. A failing entry is reported and never blocks the ones after it.
    #[instrument(skip_all, fields(height = current_height))]
    pub fn sweep(
        &self,
        state: &mut ExecutionState,
        ledger: &mut dyn Ledger,
        current_height: u64,
    ) -> SweepReport {
        let mut report = SweepReport {
            height: current_height,
            ..SweepReport::default()
        };
        for id in state.matured(current_height) {
            match self.complete(state, ledger, id, current_height) {
                Ok(Completion::Settled(execution)) => report.settled.push(execution),
                // Matured ids come from the pending index, so they cannot be settled yet.
                Ok(Completion::AlreadySettled(_)) => {}
                Err(err) => report.failed.push(SettlementFailure {
                    id,
                    reason: err.to_string(),
                }),
            }
        }
        if !report.settled.is_empty() || !report.failed.is_empty() {
            info!(
                settled = report.settled.len(),
                failed = report.failed.len(),
                remaining = state.pending_len(),
                "sweep complete"
            );
        }
        report
    }

    /// Apply the non-monetary side effects of a settled execution, at most once per id.
    pub fn actualize(
        &self,
        state: &mut ExecutionState,
        inventory: &mut dyn ItemInventory,
        id: ExecutionId,
    ) -> Result<Actualization> {
        let execution = state.execution(id).ok_or(PylonError::NotFound(id))?;
        if state.is_actualized(id) {
            return Ok(Actualization::AlreadyApplied);
        }
        let payer = execution.payer.clone();
        let outputs = execution.outputs.clone();
        if !outputs.is_empty() {
            inventory.credit_items(&payer, id, &outputs)?;
        }
        state.mark_actualized(id)?;
        debug!(id = %id, items = outputs.len(), "execution actualized");
        Ok(Actualization::Applied)
    }
}
