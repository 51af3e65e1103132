//! Run audit trail
//!
//! Every run leaves one record: the task, the limits it ran under, each
//! decision taken and the final response. The memory snapshot is hashed so a
//! stored record can be checked for tampering.

use crate::config::AgentConfig;
use crate::memory::MemoryState;
use crate::models::{AgentResponse, Decision};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub task: String,
    pub config: AgentConfig,
    /// One per tick that got as far as a decision
    pub decisions: Vec<Decision>,
    pub response: AgentResponse,
    pub memory_hash: String,
    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

/// Audit trail storage
pub struct AuditLog {
    records: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record(&self, record: RunRecord) -> Result<Uuid> {
        let run_id = record.run_id;
        let mut records = self.records.write().await;
        records.insert(run_id, record);
        debug!(run_id = %run_id, "Run recorded");
        Ok(run_id)
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&run_id).cloned())
    }

    /// All run IDs, oldest first
    pub async fn list(&self) -> Result<Vec<Uuid>> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .iter()
            .map(|(id, record)| (*id, record.created_at))
            .collect();

        items.sort_by_key(|(_, created_at)| *created_at);

        Ok(items.into_iter().map(|(id, _)| id).collect())
    }

    /// Recompute the memory hash of a stored run; `false` if unknown or altered
    pub async fn verify_integrity(&self, run_id: Uuid) -> Result<bool> {
        let records = self.records.read().await;

        match records.get(&run_id) {
            Some(record) => {
                let current_hash = compute_memory_hash(&record.response.memory)?;
                Ok(current_hash == record.memory_hash)
            }
            None => Ok(false),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of the memory snapshot, hex encoded.
/// JSON is streamed straight into the hasher.
pub fn compute_memory_hash(memory: &MemoryState) -> Result<String> {
    let mut hasher = Sha256::new();
    serde_json::to_writer(&mut HashWriter(&mut hasher), memory)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
