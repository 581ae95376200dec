//! `pylon simulate` command implementation
//!
//! Replays a JSON scenario (accounts, recipes, delegations and ordered steps) against the
//! in-memory adapters. Rejected steps are reported, not fatal, the way a chain rejects a single
//! transaction without halting.

use anyhow::{Context, Result};
use pylon_core::components::{
    InMemoryInventory, InMemoryLedger, InMemoryRecipeCatalog, StaticStakeRegistry,
};
use pylon_core::events::EventLog;
use pylon_core::{
    Actualization, Address, BlockReport, Coins, Completion, Delegation, DistributionOutcome,
    Execution, ExecuteRecipe, PendingExecution, PendingExecutionId, PylonConfig, Recipe,
    RecipePipeline,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub accounts: Vec<AccountFunding>,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
    #[serde(default)]
    pub delegations: Vec<Delegation>,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AccountFunding {
    pub address: Address,
    pub coins: Coins,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Mint coins into an account.
    Fund { address: Address, coins: Coins },
    /// Submit an invocation message.
    Execute {
        height: u64,
        cookbook_id: String,
        recipe_id: String,
        #[serde(default)]
        coin_input_index: usize,
        payer: Address,
    },
    /// Settle one execution immediately.
    Complete { height: u64, id: u64 },
    /// Credit the item outputs of a settled execution.
    Actualize { id: u64 },
    /// Run the end-block callback.
    EndBlock { height: u64 },
    /// Run the epoch-end callback.
    EpochEnd {
        #[serde(default = "default_epoch_identifier")]
        identifier: String,
        number: u64,
    },
}

fn default_epoch_identifier() -> String {
    "day".into()
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Funded { address: Address, coins: Coins },
    Created { id: PendingExecutionId },
    Completed { completion: Completion },
    Actualized {
        id: PendingExecutionId,
        actualization: Actualization,
    },
    Block { report: BlockReport },
    Epoch { outcome: DistributionOutcome },
    Rejected { error: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<StepOutcome>,
    pub balances: BTreeMap<Address, Coins>,
    pub pending: Vec<PendingExecution>,
    pub executions: Vec<Execution>,
    pub event_count: usize,
    pub event_head: String,
}

pub fn run(
    scenario_path: PathBuf,
    format: String,
    events_out: Option<PathBuf>,
    config: &PylonConfig,
) -> Result<()> {
    let content = std::fs::read_to_string(&scenario_path)
        .with_context(|| format!("Failed to read scenario {}", scenario_path.display()))?;
    let scenario: Scenario = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse scenario {}", scenario_path.display()))?;

    let (report, events) = simulate(config, scenario)?;

    if let Some(path) = events_out {
        events
            .write_jsonl(&path)
            .with_context(|| format!("Failed to write event log {}", path.display()))?;
        info!(path = %path.display(), records = events.len(), "event log written");
    }

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "human" => print_human(&report),
        _ => anyhow::bail!("Unknown format: {}. Use human or json.", format),
    }
    Ok(())
}

/// Replay `scenario` from a fresh state.
pub fn simulate(config: &PylonConfig, scenario: Scenario) -> Result<(SimulationReport, EventLog)> {
    let mut pipeline = RecipePipeline::new(config)?;
    let mut ledger = InMemoryLedger::new();
    let mut catalog = InMemoryRecipeCatalog::new(config.bounds);
    let mut inventory = InMemoryInventory::new();
    let registry = StaticStakeRegistry::new(scenario.delegations);

    for account in &scenario.accounts {
        ledger
            .mint(&account.address, &account.coins)
            .with_context(|| format!("Failed to fund {}", account.address))?;
    }
    for recipe in scenario.recipes {
        let key = recipe.key();
        catalog
            .insert(recipe)
            .with_context(|| format!("Invalid recipe {key}"))?;
    }

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for step in scenario.steps {
        let outcome = match step {
            Step::Fund { address, coins } => match ledger.mint(&address, &coins) {
                Ok(()) => StepOutcome::Funded { address, coins },
                Err(e) => rejected(e),
            },
            Step::Execute {
                height,
                cookbook_id,
                recipe_id,
                coin_input_index,
                payer,
            } => {
                let msg = ExecuteRecipe {
                    cookbook_id,
                    recipe_id,
                    coin_input_index,
                    payer,
                };
                match pipeline.execute_recipe(&catalog, &ledger, &msg, height) {
                    Ok(id) => StepOutcome::Created { id },
                    Err(e) => rejected(e),
                }
            }
            Step::Complete { height, id } => {
                match pipeline.complete_execution(&mut ledger, PendingExecutionId(id), height) {
                    Ok(completion) => StepOutcome::Completed { completion },
                    Err(e) => rejected(e),
                }
            }
            Step::Actualize { id } => {
                let id = PendingExecutionId(id);
                match pipeline.actualize_execution(&mut inventory, id) {
                    Ok(actualization) => StepOutcome::Actualized { id, actualization },
                    Err(e) => rejected(e),
                }
            }
            Step::EndBlock { height } => {
                match pipeline.end_block(&mut ledger, &mut inventory, height) {
                    Ok(report) => StepOutcome::Block { report },
                    Err(e) => rejected(e),
                }
            }
            Step::EpochEnd { identifier, number } => {
                match pipeline.after_epoch_end(&mut ledger, &registry, &identifier, number) {
                    Ok(outcome) => StepOutcome::Epoch { outcome },
                    Err(e) => rejected(e),
                }
            }
        };
        steps.push(outcome);
    }

    let state = pipeline.state();
    let report = SimulationReport {
        steps,
        balances: ledger
            .accounts()
            .map(|(a, c)| (a.clone(), c.clone()))
            .collect(),
        pending: state.iter_pending().cloned().collect(),
        executions: state.iter_executions().cloned().collect(),
        event_count: pipeline.events().len(),
        event_head: pipeline.events().head_hash().to_string(),
    };
    Ok((report, pipeline.events().clone()))
}

fn rejected(err: pylon_core::PylonError) -> StepOutcome {
    StepOutcome::Rejected {
        error: err.to_string(),
    }
}

fn print_human(report: &SimulationReport) {
    println!("📜 Steps");
    for (i, step) in report.steps.iter().enumerate() {
        let line = match step {
            StepOutcome::Funded { address, coins } => format!("funded {address} with {coins}"),
            StepOutcome::Created { id } => format!("created pending execution {id}"),
            StepOutcome::Completed { completion } => match completion {
                Completion::Settled(e) => {
                    format!("settled {} (net {}, fee {})", e.id, e.net, e.fee)
                }
                Completion::AlreadySettled(e) => format!("{} was already settled", e.id),
            },
            StepOutcome::Actualized { id, actualization } => match actualization {
                Actualization::Applied => format!("credited items of {id}"),
                Actualization::AlreadyApplied => format!("items of {id} were already credited"),
            },
            StepOutcome::Block { report } => format!(
                "block {}: {} settled, {} failed, {} actualized",
                report.height,
                report.settled.len(),
                report.failed.len(),
                report.actualized.len()
            ),
            StepOutcome::Epoch { outcome } => format!(
                "epoch {} #{}: pool {}, paid {} stakers, remainder {}",
                outcome.epoch_identifier,
                outcome.epoch_number,
                outcome.pool_before,
                outcome.distributed.len(),
                outcome.remainder
            ),
            StepOutcome::Rejected { error } => format!("❌ rejected: {error}"),
        };
        println!("   {:>3}. {}", i + 1, line);
    }

    println!();
    println!("💰 Balances");
    for (address, coins) in &report.balances {
        println!("   {address}: {coins}");
    }

    println!();
    println!(
        "⏳ Pending: {}   ✅ Executions: {}",
        report.pending.len(),
        report.executions.len()
    );
    println!("🔗 Events: {} (head {})", report.event_count, report.event_head);
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "accounts": [
            {"address": "player", "coins": [{"denom": "upylon", "amount": "100"}]}
        ],
        "recipes": [{
            "cookbook_id": "cookbook",
            "id": "sword",
            "owner": "creator",
            "coin_inputs": [{"coins": [{"denom": "upylon", "amount": "100"}]}],
            "block_interval": 2,
            "outputs": [{"item_id": "sword", "quantity": 1}],
            "enabled": true
        }],
        "delegations": [
            {"delegator": "alice", "validator": "val", "weight": "1"},
            {"delegator": "bob", "validator": "val", "weight": "2"}
        ],
        "steps": [
            {"execute": {"height": 1, "cookbook_id": "cookbook", "recipe_id": "sword", "payer": "player"}},
            {"execute": {"height": 1, "cookbook_id": "cookbook", "recipe_id": "sword", "coin_input_index": 4, "payer": "player"}},
            {"end_block": {"height": 3}},
            {"epoch_end": {"number": 1}}
        ]
    }"#;

    fn balance(report: &SimulationReport, who: &str) -> String {
        report
            .balances
            .get(&Address::new(who).unwrap())
            .map(|c| c.to_string())
            .unwrap_or_else(|| "0".into())
    }

    #[test]
    fn replays_execute_settle_and_distribute() {
        let config = PylonConfig::default();
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let (report, events) = simulate(&config, scenario).unwrap();

        assert!(matches!(report.steps[0], StepOutcome::Created { .. }));
        assert!(matches!(report.steps[1], StepOutcome::Rejected { .. }));
        assert_eq!(balance(&report, "creator"), "90upylon");
        assert_eq!(balance(&report, "alice"), "3upylon");
        assert_eq!(balance(&report, "bob"), "6upylon");
        assert_eq!(balance(&report, "fee_collector"), "1upylon");
        assert_eq!(balance(&report, "player"), "0");
        assert!(report.pending.is_empty());
        assert_eq!(report.executions.len(), 1);
        assert!(events.verify_chain().is_ok());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["steps"][1]["rejected"]["error"].is_string());
    }

    const EARLY_COMPLETION: &str = r#"{
        "accounts": [
            {"address": "player", "coins": [{"denom": "upylon", "amount": "200"}]}
        ],
        "recipes": [{
            "cookbook_id": "cookbook",
            "id": "bow",
            "owner": "creator",
            "coin_inputs": [{"coins": [{"denom": "upylon", "amount": "100"}]}],
            "block_interval": 5,
            "outputs": [{"item_id": "bow", "quantity": 1}],
            "enabled": true
        }],
        "steps": [
            {"execute": {"height": 1, "cookbook_id": "cookbook", "recipe_id": "bow",
                "payer": "player"}},
            {"execute": {"height": 1, "cookbook_id": "cookbook", "recipe_id": "bow",
                "payer": "player"}},
            {"complete": {"height": 2, "id": 0}},
            {"complete": {"height": 2, "id": 1}},
            {"actualize": {"id": 1}},
            {"actualize": {"id": 1}},
            {"actualize": {"id": 7}},
            {"end_block": {"height": 3}}
        ]
    }"#;

    #[test]
    fn completed_executions_get_their_items() {
        let config = PylonConfig::default();
        let scenario: Scenario = serde_json::from_str(EARLY_COMPLETION).unwrap();
        let (report, _) = simulate(&config, scenario).unwrap();

        assert!(matches!(
            report.steps[4],
            StepOutcome::Actualized {
                actualization: Actualization::Applied,
                ..
            }
        ));
        assert!(matches!(
            report.steps[5],
            StepOutcome::Actualized {
                actualization: Actualization::AlreadyApplied,
                ..
            }
        ));
        assert!(matches!(report.steps[6], StepOutcome::Rejected { .. }));
        match &report.steps[7] {
            StepOutcome::Block { report } => {
                assert_eq!(report.actualized, vec![PendingExecutionId(0)]);
            }
            other => panic!("unexpected step outcome {other:?}"),
        }
        assert_eq!(balance(&report, "creator"), "180upylon");
    }

    #[test]
    fn unknown_step_kind_fails_to_parse() {
        let bad = r#"{"steps": [{"teleport": {"height": 1}}]}"#;
        assert!(serde_json::from_str::<Scenario>(bad).is_err());
    }
}
