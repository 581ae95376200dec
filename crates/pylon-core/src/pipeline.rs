//! Host-driver facade: the entry points a chain wires into its message router, its end-block
//! callback and its epoch hooks.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PylonConfig;
use crate::distribution::{DistributionOutcome, RewardDistributor};
use crate::events::{EventLog, PipelineEvent};
use crate::invariants::check_state;
use crate::ports::{ItemInventory, Ledger, RecipeCatalog, StakeRegistry, StakeSnapshot};
use crate::scheduler::{ExecuteRecipe, ExecutionScheduler};
use crate::settlement::{Actualization, Completion, SettlementEngine, SettlementFailure};
use crate::state::ExecutionState;
use crate::types::{Execution, ExecutionId, PendingExecutionId};
use crate::{PylonError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedActualization {
    pub id: ExecutionId,
    pub reason: String,
}

/// Everything one `end_block` call did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    pub height: u64,
    pub settled: Vec<Execution>,
    pub failed: Vec<SettlementFailure>,
    pub actualized: Vec<ExecutionId>,
    pub actualize_failed: Vec<FailedActualization>,
}

pub struct RecipePipeline {
    state: ExecutionState,
    scheduler: ExecutionScheduler,
    settlement: SettlementEngine,
    distributor: RewardDistributor,
    events: EventLog,
    last_height: u64,
}

impl RecipePipeline {
    pub fn new(config: &PylonConfig) -> Result<Self> {
        Self::with_state(config, ExecutionState::new())
    }

    /// Resume from a persisted state snapshot.
    pub fn with_state(config: &PylonConfig, state: ExecutionState) -> Result<Self> {
        config.validate()?;
        check_state(&state)?;
        let fee_collector = config.fee_collector()?;
        let last_height = state.max_recorded_height();
        Ok(Self {
            state,
            scheduler: ExecutionScheduler::new(config.bounds, config.default_fee_rate()?),
            settlement: SettlementEngine::new(fee_collector.clone()),
            distributor: RewardDistributor::new(
                fee_collector,
                config.distribution.epoch_identifier.clone(),
                config.bounds,
            ),
            events: EventLog::new(),
            last_height,
        })
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn last_height(&self) -> u64 {
        self.last_height
    }

    fn observe_height(&mut self, height: u64) -> Result<()> {
        if height < self.last_height {
            return Err(PylonError::InvalidInput(format!(
                "height {height} is behind the last processed height {}",
                self.last_height
            )));
        }
        self.last_height = height;
        Ok(())
    }

    /// Invocation message handler.
    pub fn execute_recipe(
        &mut self,
        catalog: &dyn RecipeCatalog,
        ledger: &dyn Ledger,
        msg: &ExecuteRecipe,
        height: u64,
    ) -> Result<PendingExecutionId> {
        self.observe_height(height)?;
        let id = self
            .scheduler
            .invoke(&mut self.state, catalog, ledger, msg, height)?;
        if let Some(entry) = self.state.pending(id) {
            let event = PipelineEvent::ExecutionCreated {
                id,
                recipe: entry.recipe.clone(),
                payer: entry.payer.clone(),
                escrow: entry.escrow.clone(),
                maturity_height: entry.maturity_height,
            };
            self.events.append(height, event)?;
        }
        Ok(id)
    }

    /// Settle one execution ahead of its maturity (or re-query a settled one).
    pub fn complete_execution(
        &mut self,
        ledger: &mut dyn Ledger,
        id: PendingExecutionId,
        height: u64,
    ) -> Result<Completion> {
        self.observe_height(height)?;
        match self.settlement.complete(&mut self.state, ledger, id, height) {
            Ok(completion) => {
                if let Completion::Settled(execution) = &completion {
                    self.events.append(height, completed_event(execution))?;
                }
                Ok(completion)
            }
            Err(PylonError::NotFound(id)) => Err(PylonError::NotFound(id)),
            Err(err) => {
                self.events.append(
                    height,
                    PipelineEvent::ExecutionFailed {
                        id,
                        reason: err.to_string(),
                    },
                )?;
                Err(err)
            }
        }
    }

    pub fn actualize_execution(
        &mut self,
        inventory: &mut dyn ItemInventory,
        id: ExecutionId,
    ) -> Result<Actualization> {
        let height = self.last_height;
        let applied = self.settlement.actualize(&mut self.state, inventory, id)?;
        if applied == Actualization::Applied {
            let outputs = self
                .state
                .execution(id)
                .map(|e| e.outputs.clone())
                .unwrap_or_default();
            self.events
                .append(height, PipelineEvent::ExecutionActualized { id, outputs })?;
        }
        Ok(applied)
    }

    /// Block-processing callback: settle every matured entry, then actualize every settled
    /// execution whose items are still outstanding (this block's, early completions and earlier
    /// failures alike).
    pub fn end_block(
        &mut self,
        ledger: &mut dyn Ledger,
        inventory: &mut dyn ItemInventory,
        height: u64,
    ) -> Result<BlockReport> {
        self.observe_height(height)?;
        let sweep = self.settlement.sweep(&mut self.state, ledger, height);
        for execution in &sweep.settled {
            self.events.append(height, completed_event(execution))?;
        }
        for failure in &sweep.failed {
            self.events.append(
                height,
                PipelineEvent::ExecutionFailed {
                    id: failure.id,
                    reason: failure.reason.clone(),
                },
            )?;
        }

        let mut report = BlockReport {
            height,
            settled: sweep.settled,
            failed: sweep.failed,
            ..BlockReport::default()
        };
        for id in self.state.unactualized() {
            match self.settlement.actualize(&mut self.state, inventory, id) {
                Ok(_) => {
                    let outputs = self
                        .state
                        .execution(id)
                        .map(|e| e.outputs.clone())
                        .unwrap_or_default();
                    self.events
                        .append(height, PipelineEvent::ExecutionActualized { id, outputs })?;
                    report.actualized.push(id);
                }
                Err(err) => {
                    warn!(id = %id, error = %err, "actualization failed; retried next block");
                    self.events.append(
                        height,
                        PipelineEvent::ActualizationFailed {
                            id,
                            reason: err.to_string(),
                        },
                    )?;
                    report.actualize_failed.push(FailedActualization {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Epoch callback: snapshot stake, then distribute the fee pool.
    pub fn after_epoch_end(
        &mut self,
        ledger: &mut dyn Ledger,
        registry: &dyn StakeRegistry,
        epoch_identifier: &str,
        epoch_number: u64,
    ) -> Result<DistributionOutcome> {
        let height = self.last_height;
        let snapshot = StakeSnapshot::from_registry(registry)?;
        let outcome =
            self.distributor
                .distribute_epoch(ledger, epoch_identifier, epoch_number, &snapshot)?;
        if !outcome.distributed.is_empty() {
            self.events.append(
                height,
                PipelineEvent::RewardsDistributed {
                    epoch_identifier: outcome.epoch_identifier.clone(),
                    epoch_number,
                    pool_before: outcome.pool_before.clone(),
                    distributed: outcome.distributed.clone(),
                    remainder: outcome.remainder.clone(),
                },
            )?;
        }
        for failed in &outcome.failed {
            self.events.append(
                height,
                PipelineEvent::RewardTransferFailed {
                    epoch_number,
                    address: failed.address.clone(),
                    coins: failed.coins.clone(),
                    reason: failed.reason.clone(),
                },
            )?;
        }
        Ok(outcome)
    }
}

fn completed_event(execution: &Execution) -> PipelineEvent {
    PipelineEvent::ExecutionCompleted {
        id: execution.id,
        recipe_owner: execution.recipe_owner.clone(),
        net: execution.net.clone(),
        fee: execution.fee.clone(),
    }
}
