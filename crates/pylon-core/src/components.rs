//! In-memory implementations of the core ports.
//!
//! Used by the integration tests, the `pylon simulate` replay command and the fuzz target. They
//! follow the same atomicity contracts as a host keeper: a failed call leaves no partial effect.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::bounds::RuntimeBounds;
use crate::math::add_u128;
use crate::ports::{Delegation, ItemInventory, Ledger, RecipeCatalog, StakeRegistry};
use crate::types::{Address, Amount, Coins, Denom, ExecutionId, ItemOutput, Recipe, RecipeKey};
use crate::{PylonError, Result};

// =============================================================================
// InMemoryLedger
// =============================================================================

/// Balance ledger backed by a `BTreeMap`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<Address, Coins>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `coins` to `account` out of thin air (genesis / faucet funding).
    pub fn mint(&mut self, account: &Address, coins: &Coins) -> Result<()> {
        let next = self.balances(account).checked_add(coins)?;
        self.store(account.clone(), next);
        Ok(())
    }

    /// Destroy `coins` held by `account`.
    pub fn burn(&mut self, account: &Address, coins: &Coins) -> Result<()> {
        let held = self.balances(account);
        if !held.is_all_gte(coins) {
            return Err(PylonError::InsufficientFunds {
                account: account.clone(),
                required: coins.clone(),
                available: held,
            });
        }
        self.store(account.clone(), held.checked_sub(coins)?);
        Ok(())
    }

    /// Sum of `denom` across every account.
    pub fn total_supply(&self, denom: &Denom) -> Result<Amount> {
        self.balances
            .values()
            .try_fold(0u128, |acc, coins| add_u128(acc, coins.amount_of(denom)))
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Coins)> + '_ {
        self.balances.iter()
    }

    fn store(&mut self, account: Address, coins: Coins) {
        if coins.is_zero() {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, coins);
        }
    }
}

impl Ledger for InMemoryLedger {
    fn balance(&self, account: &Address, denom: &Denom) -> Amount {
        self.balances
            .get(account)
            .map(|c| c.amount_of(denom))
            .unwrap_or(0)
    }

    fn balances(&self, account: &Address) -> Coins {
        self.balances.get(account).cloned().unwrap_or_default()
    }

    fn transfer(&mut self, from: &Address, to: &Address, coins: &Coins) -> Result<()> {
        self.send_multi(from, &[(to.clone(), coins.clone())])
    }

    fn send_multi(&mut self, from: &Address, outputs: &[(Address, Coins)]) -> Result<()> {
        let mut required = Coins::new();
        for (_, coins) in outputs {
            required = required.checked_add(coins)?;
        }
        let held = self.balances(from);
        if !held.is_all_gte(&required) {
            return Err(PylonError::InsufficientFunds {
                account: from.clone(),
                required,
                available: held,
            });
        }

        // Stage every touched account, then commit all at once.
        let mut staged: BTreeMap<Address, Coins> = BTreeMap::new();
        staged.insert(from.clone(), held.checked_sub(&required)?);
        for (to, coins) in outputs {
            let base = match staged.get(to) {
                Some(c) => c.clone(),
                None => self.balances(to),
            };
            staged.insert(to.clone(), base.checked_add(coins)?);
        }
        for (account, coins) in staged {
            self.store(account, coins);
        }
        debug!(from = %from, legs = outputs.len(), total = %required, "ledger send");
        Ok(())
    }
}

// =============================================================================
// StaticStakeRegistry
// =============================================================================

/// Fixed delegation set.
#[derive(Clone, Debug, Default)]
pub struct StaticStakeRegistry {
    delegations: Vec<Delegation>,
}

impl StaticStakeRegistry {
    pub fn new(delegations: Vec<Delegation>) -> Self {
        Self { delegations }
    }

    pub fn delegate(&mut self, delegator: Address, validator: Address, weight: Amount) {
        self.delegations.push(Delegation {
            delegator,
            validator,
            weight,
        });
    }

    pub fn clear(&mut self) {
        self.delegations.clear();
    }
}

impl StakeRegistry for StaticStakeRegistry {
    fn delegations(&self) -> Result<Vec<Delegation>> {
        Ok(self.delegations.clone())
    }
}

// =============================================================================
// InMemoryRecipeCatalog
// =============================================================================

/// Recipe catalog keyed by `(cookbook_id, recipe_id)`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecipeCatalog {
    bounds: RuntimeBounds,
    recipes: BTreeMap<RecipeKey, Recipe>,
}

impl InMemoryRecipeCatalog {
    pub fn new(bounds: RuntimeBounds) -> Self {
        Self {
            bounds,
            recipes: BTreeMap::new(),
        }
    }

    /// Add a new recipe; fails if the key is taken or the recipe is malformed.
    pub fn insert(&mut self, recipe: Recipe) -> Result<()> {
        recipe.validate(&self.bounds)?;
        let key = recipe.key();
        if self.recipes.contains_key(&key) {
            return Err(PylonError::InvalidInput(format!(
                "recipe {key} already exists"
            )));
        }
        self.recipes.insert(key, recipe);
        Ok(())
    }

    /// Replace an existing recipe. Pending executions keep their snapshot.
    pub fn update(&mut self, recipe: Recipe) -> Result<()> {
        recipe.validate(&self.bounds)?;
        let key = recipe.key();
        match self.recipes.get_mut(&key) {
            Some(slot) => {
                *slot = recipe;
                Ok(())
            }
            None => Err(PylonError::RecipeNotFound(key)),
        }
    }

    pub fn set_enabled(&mut self, key: &RecipeKey, enabled: bool) -> Result<()> {
        match self.recipes.get_mut(key) {
            Some(recipe) => {
                recipe.enabled = enabled;
                Ok(())
            }
            None => Err(PylonError::RecipeNotFound(key.clone())),
        }
    }

    pub fn remove(&mut self, key: &RecipeKey) -> Option<Recipe> {
        self.recipes.remove(key)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl RecipeCatalog for InMemoryRecipeCatalog {
    fn recipe(&self, key: &RecipeKey) -> Result<Option<Recipe>> {
        Ok(self.recipes.get(key).cloned())
    }
}

// =============================================================================
// InMemoryInventory
// =============================================================================

/// Item balances per owner; refuses to credit the same execution twice.
#[derive(Clone, Debug, Default)]
pub struct InMemoryInventory {
    items: BTreeMap<(Address, String), u64>,
    credited: BTreeSet<ExecutionId>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quantity_of(&self, owner: &Address, item_id: &str) -> u64 {
        self.items
            .get(&(owner.clone(), item_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn was_credited(&self, execution_id: ExecutionId) -> bool {
        self.credited.contains(&execution_id)
    }
}

impl ItemInventory for InMemoryInventory {
    fn credit_items(
        &mut self,
        owner: &Address,
        execution_id: ExecutionId,
        outputs: &[ItemOutput],
    ) -> Result<()> {
        if self.credited.contains(&execution_id) {
            return Err(PylonError::InvalidInput(format!(
                "items for execution {execution_id} already credited"
            )));
        }
        // Repeated item ids accumulate on the staged value.
        let mut staged: BTreeMap<(Address, String), u64> = BTreeMap::new();
        for out in outputs {
            let key = (owner.clone(), out.item_id.clone());
            let prev = match staged.get(&key) {
                Some(q) => *q,
                None => self.items.get(&key).copied().unwrap_or(0),
            };
            let next = prev.checked_add(out.quantity).ok_or_else(|| {
                PylonError::BoundedValueExceeded(format!(
                    "item quantity overflow for {}",
                    out.item_id
                ))
            })?;
            staged.insert(key, next);
        }
        for (key, qty) in staged {
            self.items.insert(key, qty);
        }
        self.credited.insert(execution_id);
        Ok(())
    }
}
