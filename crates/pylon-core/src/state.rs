//! Persisted execution state: pending entries, the maturity index and the append-only execution
//! records.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::hash::{sha256_domain, STATE_SNAPSHOT_DOMAIN_V1};
use crate::types::{Execution, ExecutionId, PendingExecution, PendingExecutionId};
use crate::{Hash32, PylonError, Result};

/// Execution state owned by the pipeline.
///
/// Invariants (kept by every mutator):
/// - an id is never both pending and executed;
/// - `maturity_index` holds exactly one `(maturity_height, id)` per pending entry;
/// - `executions` is append-only and `actualized ⊆ executions`;
/// - `unactualized` is exactly `executions \ actualized`;
/// - `next_id` is greater than every id ever allocated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    pending: BTreeMap<PendingExecutionId, PendingExecution>,
    maturity_index: BTreeSet<(u64, PendingExecutionId)>,
    executions: BTreeMap<ExecutionId, Execution>,
    actualized: BTreeSet<ExecutionId>,
    #[serde(default)]
    unactualized: BTreeSet<ExecutionId>,
    next_id: u64,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next identifier. Identifiers are never reused.
    pub fn allocate_id(&mut self) -> Result<PendingExecutionId> {
        let id = PendingExecutionId(self.next_id);
        self.next_id = self.next_id.checked_add(1).ok_or_else(|| {
            PylonError::BoundedValueExceeded("execution id space exhausted".into())
        })?;
        Ok(id)
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn insert_pending(&mut self, entry: PendingExecution) -> Result<()> {
        let id = entry.id;
        if id.0 >= self.next_id {
            return Err(PylonError::InvalidInput(format!(
                "pending id {id} was not allocated"
            )));
        }
        if self.pending.contains_key(&id) || self.executions.contains_key(&id) {
            return Err(PylonError::InvalidInput(format!("id {id} already in use")));
        }
        self.maturity_index.insert((entry.maturity_height, id));
        self.pending.insert(id, entry);
        Ok(())
    }

    pub fn pending(&self, id: PendingExecutionId) -> Option<&PendingExecution> {
        self.pending.get(&id)
    }

    pub fn remove_pending(&mut self, id: PendingExecutionId) -> Option<PendingExecution> {
        let entry = self.pending.remove(&id)?;
        self.maturity_index.remove(&(entry.maturity_height, id));
        Some(entry)
    }

    /// Write-once: refuses to overwrite an existing execution or to coexist with a pending entry.
    pub fn insert_execution(&mut self, execution: Execution) -> Result<()> {
        let id = execution.id;
        if self.executions.contains_key(&id) {
            return Err(PylonError::InvalidInput(format!(
                "execution {id} already recorded"
            )));
        }
        if self.pending.contains_key(&id) {
            return Err(PylonError::InvalidInput(format!(
                "execution {id} is still pending"
            )));
        }
        self.executions.insert(id, execution);
        self.unactualized.insert(id);
        Ok(())
    }

    pub fn execution(&self, id: ExecutionId) -> Option<&Execution> {
        self.executions.get(&id)
    }

    pub fn is_actualized(&self, id: ExecutionId) -> bool {
        self.actualized.contains(&id)
    }

    /// Returns `false` if the id was already marked.
    pub fn mark_actualized(&mut self, id: ExecutionId) -> Result<bool> {
        if !self.executions.contains_key(&id) {
            return Err(PylonError::NotFound(id));
        }
        self.unactualized.remove(&id);
        Ok(self.actualized.insert(id))
    }

    /// Settled ids whose items have not been credited yet, ascending.
    pub fn unactualized(&self) -> Vec<ExecutionId> {
        self.unactualized.iter().copied().collect()
    }

    /// Highest creation or completion height recorded in the state.
    pub fn max_recorded_height(&self) -> u64 {
        let created = self.pending.values().map(|p| p.created_height);
        let completed = self.executions.values().map(|e| e.completed_height);
        created.chain(completed).max().unwrap_or(0)
    }

    /// Ids with `maturity_height <= height`, in ascending `(maturity_height, id)` order.
    pub fn matured(&self, height: u64) -> Vec<PendingExecutionId> {
        self.maturity_index
            .range(..=(height, PendingExecutionId(u64::MAX)))
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn executions_len(&self) -> usize {
        self.executions.len()
    }

    pub fn iter_pending(&self) -> impl Iterator<Item = &PendingExecution> + '_ {
        self.pending.values()
    }

    pub fn iter_executions(&self) -> impl Iterator<Item = &Execution> + '_ {
        self.executions.values()
    }

    pub fn iter_maturity_index(&self) -> impl Iterator<Item = &(u64, PendingExecutionId)> + '_ {
        self.maturity_index.iter()
    }

    pub fn iter_actualized(&self) -> impl Iterator<Item = &ExecutionId> + '_ {
        self.actualized.iter()
    }

    pub fn iter_unactualized(&self) -> impl Iterator<Item = &ExecutionId> + '_ {
        self.unactualized.iter()
    }

    /// Commitment over the canonical JSON encoding of the whole state.
    pub fn commitment(&self) -> Result<Hash32> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| PylonError::InvalidInput(format!("state encoding failed: {e}")))?;
        Ok(sha256_domain(STATE_SNAPSHOT_DOMAIN_V1, &bytes))
    }
}
