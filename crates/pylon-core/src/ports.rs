//! Ports to the host chain's collaborators.
//!
//! The core owns no balances, stake or recipes. Every operation receives the collaborator it
//! needs as an explicit `&dyn` / `&mut dyn` parameter so hosts can plug in their own keepers and
//! tests can use the in-memory adapters from [`crate::components`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::add_u128;
use crate::types::{
    amount_string, Address, Amount, Coins, Denom, ExecutionId, ItemOutput, Recipe, RecipeKey,
};
use crate::Result;

/// Balance ledger of the host chain.
pub trait Ledger {
    /// Current balance of `account` in `denom` (0 if the account is unknown).
    fn balance(&self, account: &Address, denom: &Denom) -> Amount;

    /// Every non-zero balance of `account`.
    fn balances(&self, account: &Address) -> Coins;

    /// Preconditions:
    /// - `coins` is canonical (no zero entries).
    ///
    /// Postconditions:
    /// - On `Ok`, `from` is debited and `to` credited by exactly `coins`.
    /// - On `Err`, no balance changed (`InsufficientFunds` when `from` is short).
    fn transfer(&mut self, from: &Address, to: &Address, coins: &Coins) -> Result<()>;

    /// Atomic multi-output send from a single payer.
    ///
    /// Postconditions:
    /// - On `Ok`, every `(recipient, coins)` leg was applied.
    /// - On `Err`, no leg was applied.
    fn send_multi(&mut self, from: &Address, outputs: &[(Address, Coins)]) -> Result<()>;

    /// True iff `account` holds at least `coins` in every denomination.
    fn has_coins(&self, account: &Address, coins: &Coins) -> bool {
        coins
            .iter()
            .all(|(denom, amount)| self.balance(account, denom) >= amount)
    }
}

/// A single delegation record: `delegator` bonded `weight` to `validator`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub validator: Address,
    #[serde(with = "amount_string")]
    pub weight: Amount,
}

/// Read access to the host's staking module.
pub trait StakeRegistry {
    fn delegations(&self) -> Result<Vec<Delegation>>;
}

/// Point-in-time copy of the delegation set, taken once per epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeSnapshot {
    delegations: Vec<Delegation>,
}

impl StakeSnapshot {
    pub fn new(delegations: Vec<Delegation>) -> Self {
        Self { delegations }
    }

    pub fn from_registry(registry: &dyn StakeRegistry) -> Result<Self> {
        Ok(Self::new(registry.delegations()?))
    }

    pub fn is_empty(&self) -> bool {
        self.delegations.is_empty()
    }

    pub fn delegations(&self) -> &[Delegation] {
        &self.delegations
    }

    /// Aggregated weight per delegator (zero totals included).
    pub fn weights_by_delegator(&self) -> Result<BTreeMap<Address, Amount>> {
        let mut out: BTreeMap<Address, Amount> = BTreeMap::new();
        for d in &self.delegations {
            let entry = out.entry(d.delegator.clone()).or_insert(0);
            *entry = add_u128(*entry, d.weight)?;
        }
        Ok(out)
    }
}

/// Recipe lookup; authoring and validation live outside the core.
pub trait RecipeCatalog {
    fn recipe(&self, key: &RecipeKey) -> Result<Option<Recipe>>;
}

/// Non-monetary side effects of an actualized execution (item minting).
pub trait ItemInventory {
    /// Postconditions:
    /// - On `Ok`, every output was credited to `owner` exactly once for `execution_id`.
    fn credit_items(
        &mut self,
        owner: &Address,
        execution_id: ExecutionId,
        outputs: &[ItemOutput],
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn snapshot_aggregates_across_validators() {
        let snap = StakeSnapshot::new(vec![
            Delegation {
                delegator: addr("alice"),
                validator: addr("val1"),
                weight: 2,
            },
            Delegation {
                delegator: addr("bob"),
                validator: addr("val1"),
                weight: 0,
            },
            Delegation {
                delegator: addr("alice"),
                validator: addr("val2"),
                weight: 3,
            },
        ]);
        let w = snap.weights_by_delegator().unwrap();
        assert_eq!(w.get(&addr("alice")), Some(&5));
        assert_eq!(w.get(&addr("bob")), Some(&0));
    }

    #[test]
    fn delegation_weight_accepts_number_or_string() {
        let a: Delegation = serde_json::from_str(
            r#"{"delegator":"alice","validator":"val1","weight":7}"#,
        )
        .unwrap();
        let b: Delegation = serde_json::from_str(
            r#"{"delegator":"alice","validator":"val1","weight":"7"}"#,
        )
        .unwrap();
        assert_eq!(a, b);
    }
}
