//! Epoch-triggered redistribution of the fee pool to stakers, pro rata to stake weight.
//!
//! Every share is `floor(pool * weight / total_weight)` per denomination, computed exactly with
//! 256-bit intermediates. The rounding remainder never leaves the fee collector and rolls into the
//! next epoch's pool.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::bounds::RuntimeBounds;
use crate::invariants::check_distribution;
use crate::math::{add_u128, mul_div_floor};
use crate::ports::{Ledger, StakeSnapshot};
use crate::types::{amount_string, Address, Amount, Coins};
use crate::{PylonError, Result};

/// Exact rational share `weight / total_weight` of one delegator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPercentage {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub weight: Amount,
    #[serde(with = "amount_string")]
    pub total_weight: Amount,
}

impl DistributionPercentage {
    /// `floor(amount * weight / total_weight)`.
    pub fn share_of(&self, amount: Amount) -> Result<Amount> {
        mul_div_floor(amount, self.weight, self.total_weight)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardShare {
    pub address: Address,
    pub coins: Coins,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedReward {
    pub address: Address,
    pub coins: Coins,
    pub reason: String,
}

/// What one epoch-end call did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionOutcome {
    pub epoch_identifier: String,
    pub epoch_number: u64,
    pub pool_before: Coins,
    pub distributed: BTreeMap<Address, Coins>,
    /// `pool_before - sum(distributed)`; stays with the fee collector.
    pub remainder: Coins,
    pub failed: Vec<FailedReward>,
}

impl DistributionOutcome {
    fn untouched(epoch_identifier: &str, epoch_number: u64, pool_before: Coins) -> Self {
        Self {
            epoch_identifier: epoch_identifier.to_string(),
            epoch_number,
            remainder: pool_before.clone(),
            pool_before,
            distributed: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.distributed.is_empty() && self.failed.is_empty()
    }

    pub fn total_distributed(&self) -> Result<Coins> {
        self.distributed
            .values()
            .try_fold(Coins::new(), |acc, c| acc.checked_add(c))
    }
}

/// Aggregate stake weight per delegator.
///
/// Postconditions:
/// - sorted by address, one entry per delegator with non-zero weight;
/// - every entry carries the same `total_weight == sum(weight)`.
pub fn distribution_percentages(snapshot: &StakeSnapshot) -> Result<Vec<DistributionPercentage>> {
    let weights: Vec<(Address, Amount)> = snapshot
        .weights_by_delegator()?
        .into_iter()
        .filter(|(_, w)| *w > 0)
        .collect();
    let total = weights
        .iter()
        .try_fold(0u128, |acc, (_, w)| add_u128(acc, *w))?;
    Ok(weights
        .into_iter()
        .map(|(address, weight)| DistributionPercentage {
            address,
            weight,
            total_weight: total,
        })
        .collect())
}

/// Compute every staker's share of `pool`.
///
/// Preconditions:
/// - all entries share one `total_weight > 0` and `sum(weight) <= total_weight`.
///
/// Postconditions:
/// - `sum(shares) <= pool` per denomination;
/// - stakers whose share floors to zero in every denomination are omitted.
pub fn calculate_reward_shares(
    percentages: &[DistributionPercentage],
    pool: &Coins,
) -> Result<Vec<RewardShare>> {
    let Some(first) = percentages.first() else {
        return Ok(Vec::new());
    };
    let total_weight = first.total_weight;
    if total_weight == 0 {
        return Err(PylonError::InvalidInput("total stake weight is zero".into()));
    }
    let mut weight_sum: Amount = 0;
    for p in percentages {
        if p.total_weight != total_weight {
            return Err(PylonError::InvalidInput(format!(
                "inconsistent total weight for {}: {} != {total_weight}",
                p.address, p.total_weight
            )));
        }
        weight_sum = add_u128(weight_sum, p.weight)?;
    }
    if weight_sum > total_weight {
        return Err(PylonError::InvalidInput(format!(
            "weights sum to {weight_sum}, above total {total_weight}"
        )));
    }

    let mut shares = Vec::with_capacity(percentages.len());
    for p in percentages {
        let mut coins = Coins::new();
        for (denom, amount) in pool.iter() {
            coins.add_amount(denom.clone(), p.share_of(amount)?)?;
        }
        if !coins.is_zero() {
            shares.push(RewardShare {
                address: p.address.clone(),
                coins,
            });
        }
    }
    Ok(shares)
}

#[derive(Clone, Debug)]
pub struct RewardDistributor {
    fee_collector: Address,
    epoch_identifier: String,
    bounds: RuntimeBounds,
}

impl RewardDistributor {
    pub fn new(
        fee_collector: Address,
        epoch_identifier: impl Into<String>,
        bounds: RuntimeBounds,
    ) -> Self {
        Self {
            fee_collector,
            epoch_identifier: epoch_identifier.into(),
            bounds,
        }
    }

    pub fn epoch_identifier(&self) -> &str {
        &self.epoch_identifier
    }

    /// Pay the current fee pool out to stakers.
    ///
    /// Postconditions:
    /// - mismatched epoch identifier, empty pool or empty snapshot: no transfer;
    /// - otherwise each share is sent with its own transfer from the fee collector, and a failed
    ///   transfer is recorded without affecting the others;
    /// - a share owed to the fee collector itself is not paid and is counted in the remainder;
    /// - `outcome.remainder == outcome.pool_before - sum(outcome.distributed)`.
    #[instrument(skip_all, fields(epoch = epoch_identifier, number = epoch_number))]
    pub fn distribute_epoch(
        &self,
        ledger: &mut dyn Ledger,
        epoch_identifier: &str,
        epoch_number: u64,
        snapshot: &StakeSnapshot,
    ) -> Result<DistributionOutcome> {
        if epoch_identifier != self.epoch_identifier {
            debug!(configured = %self.epoch_identifier, "epoch identifier ignored");
            return Ok(DistributionOutcome::untouched(
                epoch_identifier,
                epoch_number,
                Coins::new(),
            ));
        }

        let pool_before = ledger.balances(&self.fee_collector);
        if pool_before.is_zero() || snapshot.is_empty() {
            debug!(
                pool = %pool_before,
                delegations = snapshot.delegations().len(),
                "nothing to distribute"
            );
            return Ok(DistributionOutcome::untouched(
                epoch_identifier,
                epoch_number,
                pool_before,
            ));
        }

        let percentages = distribution_percentages(snapshot)?;
        if percentages.len() > self.bounds.max_stakers {
            return Err(PylonError::BoundedValueExceeded(format!(
                "{} stakers exceed max_stakers ({})",
                percentages.len(),
                self.bounds.max_stakers
            )));
        }
        // The collector's own stake share never leaves the pool; it stays in the remainder.
        let shares: Vec<RewardShare> = calculate_reward_shares(&percentages, &pool_before)?
            .into_iter()
            .filter(|s| s.address != self.fee_collector)
            .collect();

        // Plan first: the whole payout must fit the pool before anything moves.
        let planned: BTreeMap<Address, Coins> = shares
            .iter()
            .map(|s| (s.address.clone(), s.coins.clone()))
            .collect();
        check_distribution(&pool_before, &planned)?;

        let mut outcome =
            DistributionOutcome::untouched(epoch_identifier, epoch_number, pool_before.clone());
        for share in shares {
            match ledger.transfer(&self.fee_collector, &share.address, &share.coins) {
                Ok(()) => {
                    outcome.distributed.insert(share.address, share.coins);
                }
                Err(err) => {
                    warn!(
                        staker = %share.address,
                        coins = %share.coins,
                        error = %err,
                        "reward transfer failed"
                    );
                    outcome.failed.push(FailedReward {
                        address: share.address,
                        coins: share.coins,
                        reason: err.to_string(),
                    });
                }
            }
        }
        outcome.remainder = check_distribution(&pool_before, &outcome.distributed)?;

        info!(
            pool = %pool_before,
            stakers = outcome.distributed.len(),
            failed = outcome.failed.len(),
            remainder = %outcome.remainder,
            "rewards distributed"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::InMemoryLedger;
    use crate::ports::Delegation;
    use crate::types::Denom;
    use proptest::prelude::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn denom() -> Denom {
        Denom::new("upylon").unwrap()
    }

    fn upylon(n: u128) -> Coins {
        Coins::single(denom(), n)
    }

    fn snapshot(weights: &[(&str, u128)]) -> StakeSnapshot {
        StakeSnapshot::new(
            weights
                .iter()
                .map(|(who, w)| Delegation {
                    delegator: addr(who),
                    validator: addr("val"),
                    weight: *w,
                })
                .collect(),
        )
    }

    fn distributor() -> RewardDistributor {
        RewardDistributor::new(addr("fees"), "day", RuntimeBounds::default())
    }

    #[test]
    fn percentages_omit_zero_weight() {
        let p = distribution_percentages(&snapshot(&[("b", 2), ("z", 0), ("a", 1)])).unwrap();
        let names: Vec<&str> = p.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(p.iter().all(|p| p.total_weight == 3));
    }

    #[test]
    fn uneven_pool_leaves_remainder() {
        let p = distribution_percentages(&snapshot(&[("a", 1), ("b", 2)])).unwrap();
        let shares = calculate_reward_shares(&p, &upylon(10)).unwrap();
        assert_eq!(shares[0].coins, upylon(3));
        assert_eq!(shares[1].coins, upylon(6));
    }

    #[test]
    fn zero_shares_are_omitted() {
        let p = distribution_percentages(&snapshot(&[("a", 1), ("whale", 1_000)])).unwrap();
        let shares = calculate_reward_shares(&p, &upylon(10)).unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].address, addr("whale"));
    }

    #[test]
    fn inconsistent_totals_rejected() {
        let mut p = distribution_percentages(&snapshot(&[("a", 1), ("b", 1)])).unwrap();
        p[1].total_weight = 1;
        assert!(calculate_reward_shares(&p, &upylon(10)).is_err());
    }

    #[test]
    fn distribute_moves_shares_and_keeps_remainder() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr("fees"), &upylon(10)).unwrap();
        let out = distributor()
            .distribute_epoch(&mut ledger, "day", 1, &snapshot(&[("a", 1), ("b", 2)]))
            .unwrap();
        assert_eq!(out.distributed.get(&addr("a")), Some(&upylon(3)));
        assert_eq!(out.distributed.get(&addr("b")), Some(&upylon(6)));
        assert_eq!(out.remainder, upylon(1));
        assert_eq!(out.total_distributed().unwrap(), upylon(9));
        assert_eq!(ledger.balances(&addr("fees")), upylon(1));
    }

    #[test]
    fn collector_stake_share_stays_in_remainder() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr("fees"), &upylon(10)).unwrap();
        let out = distributor()
            .distribute_epoch(&mut ledger, "day", 1, &snapshot(&[("alice", 1), ("fees", 1)]))
            .unwrap();
        assert_eq!(out.distributed.len(), 1);
        assert_eq!(out.distributed.get(&addr("alice")), Some(&upylon(5)));
        assert!(!out.distributed.contains_key(&addr("fees")));
        assert_eq!(out.remainder, upylon(5));
        assert_eq!(ledger.balances(&addr("fees")), out.remainder);
    }

    #[test]
    fn multi_denom_pool_floors_each_denom() {
        let stake = Denom::new("ustake").unwrap();
        let pool = Coins::from_pairs([(denom(), 10), (stake.clone(), 7)]).unwrap();
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr("fees"), &pool).unwrap();
        let out = distributor()
            .distribute_epoch(&mut ledger, "day", 1, &snapshot(&[("a", 1), ("b", 2)]))
            .unwrap();

        let a = &out.distributed[&addr("a")];
        let b = &out.distributed[&addr("b")];
        assert_eq!((a.amount_of(&denom()), a.amount_of(&stake)), (3, 2));
        assert_eq!((b.amount_of(&denom()), b.amount_of(&stake)), (6, 4));
        assert_eq!(
            out.remainder,
            Coins::from_pairs([(denom(), 1), (stake.clone(), 1)]).unwrap()
        );
        assert_eq!(ledger.balances(&addr("fees")), out.remainder);
        assert_eq!(
            out.total_distributed().unwrap().checked_add(&out.remainder).unwrap(),
            pool
        );
    }

    #[test]
    fn configured_identifier_is_kept() {
        let d = RewardDistributor::new(addr("fees"), "week", RuntimeBounds::default());
        assert_eq!(d.epoch_identifier(), "week");
        assert_eq!(distributor().epoch_identifier(), "day");
    }

    #[test]
    fn other_epoch_identifier_is_noop() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr("fees"), &upylon(10)).unwrap();
        let out = distributor()
            .distribute_epoch(&mut ledger, "week", 1, &snapshot(&[("a", 1)]))
            .unwrap();
        assert!(out.is_noop());
        assert_eq!(ledger.balances(&addr("fees")), upylon(10));
    }

    #[test]
    fn empty_snapshot_leaves_pool() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr("fees"), &upylon(10)).unwrap();
        let out = distributor()
            .distribute_epoch(&mut ledger, "day", 1, &StakeSnapshot::default())
            .unwrap();
        assert!(out.is_noop());
        assert_eq!(out.remainder, upylon(10));
        assert_eq!(ledger.balances(&addr("fees")), upylon(10));
    }

    #[test]
    fn staker_bound_enforced() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&addr("fees"), &upylon(10)).unwrap();
        let d = RewardDistributor::new(addr("fees"), "day", RuntimeBounds::new(1, 1, 1).unwrap());
        assert!(matches!(
            d.distribute_epoch(&mut ledger, "day", 1, &snapshot(&[("a", 1), ("b", 1)])),
            Err(PylonError::BoundedValueExceeded(_))
        ));
        assert_eq!(ledger.balances(&addr("fees")), upylon(10));
    }

    proptest! {
        #[test]
        fn shares_never_exceed_pool(
            weights in proptest::collection::vec(0u128..1_000_000, 1..20),
            pool in any::<u64>(),
        ) {
            let named: Vec<(String, u128)> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| (format!("staker{i:02}"), *w))
                .collect();
            let refs: Vec<(&str, u128)> = named.iter().map(|(n, w)| (n.as_str(), *w)).collect();
            let p = distribution_percentages(&snapshot(&refs)).unwrap();
            let shares = calculate_reward_shares(&p, &upylon(pool as u128)).unwrap();
            let total: u128 = shares.iter().map(|s| s.coins.amount_of(&denom())).sum();
            prop_assert!(total <= pool as u128);
            if !p.is_empty() {
                // Each staker loses strictly less than one unit to flooring.
                prop_assert!((pool as u128) - total < p.len() as u128);
            }
        }

        #[test]
        fn single_staker_takes_whole_pool(weight in 1u128..u128::MAX, pool in any::<u128>()) {
            let p = distribution_percentages(&snapshot(&[("solo", weight)])).unwrap();
            let shares = calculate_reward_shares(&p, &upylon(pool)).unwrap();
            let got: u128 = shares.iter().map(|s| s.coins.amount_of(&denom())).sum();
            prop_assert_eq!(got, pool);
        }
    }
}
