//! Append-only, hash-chained pipeline event log.
//!
//! - one record per creation, completion, failure, actualization and distribution;
//! - `record_hash = H(domain || prev_record_hash || seq || height || json(event))`;
//! - optional JSONL export, one record per line.
//!
//! Replicas that process the same blocks produce the same head hash, so the head can be compared
//! or anchored without shipping the whole log.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::hash::{sha256_domain, EVENT_RECORD_DOMAIN_V1};
use crate::types::{Address, Coins, ExecutionId, ItemOutput, PendingExecutionId, RecipeKey};
use crate::{Hash32, PylonError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEvent {
    ExecutionCreated {
        id: PendingExecutionId,
        recipe: RecipeKey,
        payer: Address,
        escrow: Coins,
        maturity_height: u64,
    },
    ExecutionCompleted {
        id: ExecutionId,
        recipe_owner: Address,
        net: Coins,
        fee: Coins,
    },
    ExecutionFailed {
        id: PendingExecutionId,
        reason: String,
    },
    ExecutionActualized {
        id: ExecutionId,
        outputs: Vec<ItemOutput>,
    },
    ActualizationFailed {
        id: ExecutionId,
        reason: String,
    },
    RewardsDistributed {
        epoch_identifier: String,
        epoch_number: u64,
        pool_before: Coins,
        distributed: BTreeMap<Address, Coins>,
        remainder: Coins,
    },
    RewardTransferFailed {
        epoch_number: u64,
        address: Address,
        coins: Coins,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub height: u64,
    pub prev_record_hash: Hash32,
    pub record_hash: Hash32,
    pub event: PipelineEvent,
}

pub fn record_hash_v1(
    prev_record_hash: &Hash32,
    seq: u64,
    height: u64,
    event: &PipelineEvent,
) -> Result<Hash32> {
    let event_bytes = serde_json::to_vec(event)
        .map_err(|e| PylonError::InvalidInput(format!("failed to encode event: {e}")))?;
    let mut bytes = Vec::with_capacity(48 + event_bytes.len());
    bytes.extend_from_slice(&prev_record_hash.0);
    bytes.extend_from_slice(&seq.to_le_bytes());
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes.extend_from_slice(&event_bytes);
    Ok(sha256_domain(EVENT_RECORD_DOMAIN_V1, &bytes))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from stored records; fails if the chain does not verify.
    pub fn from_records(records: Vec<EventRecord>) -> Result<Self> {
        let log = Self { records };
        log.verify_chain()?;
        Ok(log)
    }

    pub fn append(&mut self, height: u64, event: PipelineEvent) -> Result<&EventRecord> {
        let seq = self.records.len() as u64;
        let prev_record_hash = self.head_hash();
        let record_hash = record_hash_v1(&prev_record_hash, seq, height, &event)?;
        self.records.push(EventRecord {
            seq,
            height,
            prev_record_hash,
            record_hash,
            event,
        });
        let idx = self.records.len() - 1;
        Ok(&self.records[idx])
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Hash of the last record (genesis is all zeros).
    pub fn head_hash(&self) -> Hash32 {
        self.records
            .last()
            .map(|r| r.record_hash)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn verify_chain(&self) -> Result<()> {
        let mut prev = Hash32::default();
        for (i, record) in self.records.iter().enumerate() {
            if record.seq != i as u64 {
                return Err(PylonError::InvariantViolated(format!(
                    "event record {i} has seq {}",
                    record.seq
                )));
            }
            if record.prev_record_hash != prev {
                return Err(PylonError::InvariantViolated(format!(
                    "event record {i} does not link to its predecessor"
                )));
            }
            let expected = record_hash_v1(&prev, record.seq, record.height, &record.event)?;
            if record.record_hash != expected {
                return Err(PylonError::InvariantViolated(format!(
                    "event record {i} hash mismatch"
                )));
            }
            prev = record.record_hash;
        }
        Ok(())
    }

    /// Write every record as one JSON line, replacing `path`.
    pub fn write_jsonl(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                PylonError::Io(format!("failed to open event log {}: {e}", path.display()))
            })?;
        for record in &self.records {
            let line = serde_json::to_vec(record)
                .map_err(|e| PylonError::Io(format!("failed to serialize event record: {e}")))?;
            file.write_all(&line)
                .map_err(|e| PylonError::Io(format!("failed to write event record: {e}")))?;
            file.write_all(b"\n")
                .map_err(|e| PylonError::Io(format!("failed to write event log newline: {e}")))?;
        }
        file.sync_all()
            .map_err(|e| PylonError::Io(format!("failed to sync event log: {e}")))?;
        Ok(())
    }

    /// Load and verify a JSONL export.
    pub fn read_jsonl(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            PylonError::Io(format!("failed to open event log {}: {e}", path.display()))
        })?;
        let mut records = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| PylonError::Io(format!("failed to read event log: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: EventRecord = serde_json::from_str(&line).map_err(|e| {
                PylonError::Io(format!("malformed event record on line {}: {e}", n + 1))
            })?;
            records.push(record);
        }
        Self::from_records(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Denom;

    fn failed(id: u64) -> PipelineEvent {
        PipelineEvent::ExecutionFailed {
            id: PendingExecutionId(id),
            reason: "insufficient funds".into(),
        }
    }

    #[test]
    fn append_chains_records() {
        let mut log = EventLog::new();
        assert_eq!(log.head_hash(), Hash32::default());
        let first = log.append(1, failed(0)).unwrap().record_hash;
        let second = log.append(2, failed(1)).unwrap().clone();
        assert_eq!(second.prev_record_hash, first);
        assert_eq!(log.head_hash(), second.record_hash);
        assert!(log.verify_chain().is_ok());
    }

    #[test]
    fn tampering_is_detected() {
        let mut log = EventLog::new();
        log.append(1, failed(0)).unwrap();
        log.append(2, failed(1)).unwrap();
        let mut records = log.records().to_vec();
        records[0].event = failed(7);
        assert!(matches!(
            EventLog::from_records(records),
            Err(PylonError::InvariantViolated(_))
        ));
    }

    #[test]
    fn event_json_is_externally_tagged() {
        let event = PipelineEvent::ExecutionCompleted {
            id: PendingExecutionId(3),
            recipe_owner: Address::new("owner").unwrap(),
            net: Coins::single(Denom::new("upylon").unwrap(), 90),
            fee: Coins::single(Denom::new("upylon").unwrap(), 10),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["execution_completed"]["id"], 3);
        assert_eq!(json["execution_completed"]["fee"][0]["amount"], "10");
    }

    #[test]
    fn jsonl_export_reloads_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut log = EventLog::new();
        log.append(4, failed(0)).unwrap();
        log.append(5, failed(1)).unwrap();
        log.write_jsonl(&path).unwrap();

        let back = EventLog::read_jsonl(&path).unwrap();
        assert_eq!(back, log);
    }
}
