use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// What a single audit record attests to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Decision {
        verdict: String,
        matched_rule: Option<String>,
        reason: String,
    },
    DryRun {
        summary: String,
    },
    ApprovalOutcome {
        request_id: Uuid,
        state: String,
        decided_by: Option<String>,
    },
    GateRefusal {
        gate: String,
        reason: String,
    },
    ExecutionResult {
        success: bool,
        summary: String,
    },
    Anomaly {
        kind: String,
        severity: String,
    },
    SafeMode {
        active: bool,
        reason: Option<String>,
    },
    JobTransition {
        from: String,
        to: String,
    },
}

/// The caller-supplied part of an audit record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action_id: Option<Uuid>,
    pub job_id: Option<String>,
    pub actor: String,
    pub event: AuditEvent,
    pub detail: Value,
}

impl AuditEntry {
    pub fn new(actor: impl Into<String>, event: AuditEvent) -> Self {
        Self {
            action_id: None,
            job_id: None,
            actor: actor.into(),
            event,
            detail: Value::Null,
        }
    }

    pub fn action(mut self, action_id: Uuid) -> Self {
        self.action_id = Some(action_id);
        self
    }

    pub fn job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// One immutable line in the audit log. Records chain via
/// `prev_hash -> hash` so after-the-fact tampering is detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action_id: Option<Uuid>,
    pub job_id: Option<String>,
    pub actor: String,
    #[serde(flatten)]
    pub event: AuditEvent,
    pub detail: Value,
    pub prev_hash: Option<String>,
    pub hash: String,
}

/// Durable destination for audit records, e.g. a SQLite table. Persistence
/// is best-effort; the in-memory chain is the authoritative order.
pub trait AuditSink: Send + Sync {
    fn persist(&self, record: &AuditRecord) -> crate::Result<()>;
}

struct Chain {
    records: Vec<AuditRecord>,
    last_hash: Option<String>,
}

/// Append-only audit log — the sole source of truth for "what happened and
/// why". Multi-writer safe; records are never deleted.
pub struct AuditLog {
    chain: Mutex<Chain>,
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(Chain {
                records: Vec::new(),
                last_hash: None,
            }),
            sink: None,
        }
    }

    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            chain: Mutex::new(Chain {
                records: Vec::new(),
                last_hash: None,
            }),
            sink: Some(sink),
        }
    }

    /// Append an entry and return the sealed record. The chain lock spans
    /// hash computation so concurrent writers cannot fork the chain.
    pub fn append(&self, entry: AuditEntry) -> AuditRecord {
        let mut chain = self.chain.lock();

        let mut record = AuditRecord {
            timestamp: Utc::now(),
            action_id: entry.action_id,
            job_id: entry.job_id,
            actor: entry.actor,
            event: entry.event,
            detail: entry.detail,
            prev_hash: chain.last_hash.clone(),
            hash: String::new(),
        };
        record.hash = seal(&record);

        chain.last_hash = Some(record.hash.clone());
        chain.records.push(record.clone());
        drop(chain);

        if let Some(ref sink) = self.sink {
            if let Err(e) = sink.persist(&record) {
                warn!(error = %e, "audit sink write failed, record kept in memory");
            }
        }
        record
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.chain.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.chain.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn for_action(&self, action_id: Uuid) -> Vec<AuditRecord> {
        self.chain
            .lock()
            .records
            .iter()
            .filter(|r| r.action_id == Some(action_id))
            .cloned()
            .collect()
    }

    pub fn for_job(&self, job_id: &str) -> Vec<AuditRecord> {
        self.chain
            .lock()
            .records
            .iter()
            .filter(|r| r.job_id.as_deref() == Some(job_id))
            .cloned()
            .collect()
    }

    /// Walk the chain and recompute every hash.
    pub fn verify_chain(&self) -> bool {
        let chain = self.chain.lock();
        let mut prev: Option<&str> = None;
        for record in &chain.records {
            if record.prev_hash.as_deref() != prev {
                return false;
            }
            let mut unsealed = record.clone();
            unsealed.hash = String::new();
            if seal(&unsealed) != record.hash {
                return false;
            }
            prev = Some(&record.hash);
        }
        true
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

fn seal(record: &AuditRecord) -> String {
    let body = serde_json::to_vec(record).unwrap_or_else(|e| {
        warn!(error = %e, "audit record serialization failed, hashing empty body");
        Vec::new()
    });
    let mut hasher = blake3::Hasher::new();
    if let Some(ref prev) = record.prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(&body);
    hasher.finalize().to_hex().to_string()
}
