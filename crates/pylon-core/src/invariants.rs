use std::collections::BTreeMap;

use crate::state::ExecutionState;
use crate::types::{Address, Coins, Execution};
use crate::PylonError;

/// Stable identifiers for pipeline invariants (used in tests and error messages).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvariantId {
    /// An id was both pending and executed, or the maturity index disagreed with pending.
    PendingXorExecuted,

    /// An execution's `gross` differed from `fee + net`.
    SettlementConserves,

    /// Reward shares summed to more than the pool.
    DistributionBounded,

    /// An id was settled or actualized without a matching record.
    SettledOnce,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    pub id: InvariantId,
    pub details: String,
}

impl InvariantViolation {
    pub fn new(id: InvariantId, details: impl Into<String>) -> Self {
        Self {
            id,
            details: details.into(),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.id, self.details)
    }
}

impl std::error::Error for InvariantViolation {}

impl From<InvariantViolation> for PylonError {
    fn from(v: InvariantViolation) -> Self {
        PylonError::InvariantViolated(v.to_string())
    }
}

/// `gross == fee + net` in every denomination.
pub fn check_execution(execution: &Execution) -> Result<(), InvariantViolation> {
    let sum = execution.fee.checked_add(&execution.net).map_err(|e| {
        InvariantViolation::new(
            InvariantId::SettlementConserves,
            format!("execution {}: fee + net overflows: {e}", execution.id),
        )
    })?;
    if sum != execution.gross {
        return Err(InvariantViolation::new(
            InvariantId::SettlementConserves,
            format!(
                "execution {}: gross {} != fee {} + net {}",
                execution.id, execution.gross, execution.fee, execution.net
            ),
        ));
    }
    Ok(())
}

/// Structural check over the whole execution state.
pub fn check_state(state: &ExecutionState) -> Result<(), InvariantViolation> {
    let mut indexed = 0usize;
    for (height, id) in state.iter_maturity_index() {
        match state.pending(*id) {
            Some(entry) if entry.maturity_height == *height => indexed += 1,
            _ => {
                return Err(InvariantViolation::new(
                    InvariantId::PendingXorExecuted,
                    format!("maturity index entry ({height}, {id}) has no matching pending entry"),
                ))
            }
        }
    }
    if indexed != state.pending_len() {
        return Err(InvariantViolation::new(
            InvariantId::PendingXorExecuted,
            format!(
                "maturity index covers {indexed} of {} pending entries",
                state.pending_len()
            ),
        ));
    }

    for entry in state.iter_pending() {
        if state.execution(entry.id).is_some() {
            return Err(InvariantViolation::new(
                InvariantId::PendingXorExecuted,
                format!("id {} is both pending and executed", entry.id),
            ));
        }
        if entry.id.0 >= state.next_id() {
            return Err(InvariantViolation::new(
                InvariantId::SettledOnce,
                format!("pending id {} was never allocated", entry.id),
            ));
        }
    }

    for execution in state.iter_executions() {
        check_execution(execution)?;
    }

    for id in state.iter_actualized() {
        if state.execution(*id).is_none() {
            return Err(InvariantViolation::new(
                InvariantId::SettledOnce,
                format!("actualized id {id} has no execution"),
            ));
        }
    }

    let mut awaiting = 0usize;
    for id in state.iter_unactualized() {
        if state.execution(*id).is_none() || state.is_actualized(*id) {
            return Err(InvariantViolation::new(
                InvariantId::SettledOnce,
                format!("unactualized id {id} is not a pending actualization"),
            ));
        }
        awaiting += 1;
    }
    let actualized = state.iter_actualized().count();
    if awaiting + actualized != state.executions_len() {
        return Err(InvariantViolation::new(
            InvariantId::SettledOnce,
            format!(
                "{} executions but {actualized} actualized and {awaiting} awaiting",
                state.executions_len()
            ),
        ));
    }
    Ok(())
}

/// `sum(distributed) + remainder == pool_before` and no share exceeds the pool.
pub fn check_distribution(
    pool_before: &Coins,
    distributed: &BTreeMap<Address, Coins>,
) -> Result<Coins, InvariantViolation> {
    let mut total = Coins::new();
    for coins in distributed.values() {
        total = total.checked_add(coins).map_err(|e| {
            InvariantViolation::new(
                InvariantId::DistributionBounded,
                format!("distributed total overflows: {e}"),
            )
        })?;
    }
    if !pool_before.is_all_gte(&total) {
        return Err(InvariantViolation::new(
            InvariantId::DistributionBounded,
            format!("distributed {total} exceeds pool {pool_before}"),
        ));
    }
    pool_before.checked_sub(&total).map_err(|e| {
        InvariantViolation::new(InvariantId::DistributionBounded, e.to_string())
    })
}
