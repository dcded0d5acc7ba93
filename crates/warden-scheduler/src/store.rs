use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use warden_core::{AuditRecord, AuditSink};

use crate::job::{Job, JobState};

/// Durable record of jobs and their lifecycle state. Persistence is a
/// pluggable implementation detail — the in-memory store is the default,
/// SQLite exists for operators who want jobs to survive a restart.
///
/// The claim/cancel/finish transitions are atomic within a store so a
/// cancel racing an executor resolves to exactly one terminal state.
pub trait JobStore: Send + Sync {
    /// Add a new job. A duplicate id is a conflict, not an upsert.
    fn insert(&self, job: Job) -> warden_core::Result<()>;

    fn get(&self, id: &str) -> warden_core::Result<Option<Job>>;

    /// Jobs ordered by (priority, created_at), optionally filtered.
    fn list(&self, state: Option<JobState>) -> warden_core::Result<Vec<Job>>;

    /// Pending -> Running. Refused for any other current state.
    fn claim(&self, id: &str) -> warden_core::Result<Job>;

    /// Pending|Running -> Cancelled. Cancelling twice is
    /// `AlreadyCancelled`; cancelling a completed/failed job is refused.
    fn cancel(&self, id: &str, reason: &str) -> warden_core::Result<Job>;

    /// Running -> Completed|Failed|Pending with outcome bookkeeping.
    /// Refused when the job is no longer Running (e.g. cancelled mid-run).
    fn finish(
        &self,
        id: &str,
        to: JobState,
        error: Option<String>,
        last_run_at: Option<DateTime<Utc>>,
        retry_count: u32,
    ) -> warden_core::Result<Job>;
}

// ── In-memory store ────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) -> warden_core::Result<()> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&job.id) {
            return Err(warden_core::WardenError::JobConflict { job_id: job.id });
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, id: &str) -> warden_core::Result<Option<Job>> {
        Ok(self.jobs.lock().get(id).cloned())
    }

    fn list(&self, state: Option<JobState>) -> warden_core::Result<Vec<Job>> {
        let jobs = self.jobs.lock();
        let mut out: Vec<Job> = jobs
            .values()
            .filter(|j| state.is_none_or(|s| j.state == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.priority, a.created_at).cmp(&(b.priority, b.created_at)));
        Ok(out)
    }

    fn claim(&self, id: &str) -> warden_core::Result<Job> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| warden_core::WardenError::JobNotFound { job_id: id.into() })?;
        if job.state != JobState::Pending {
            return Err(warden_core::WardenError::InvalidJobState {
                job_id: id.into(),
                state: job.state.to_string(),
            });
        }
        job.state = JobState::Running;
        Ok(job.clone())
    }

    fn cancel(&self, id: &str, reason: &str) -> warden_core::Result<Job> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| warden_core::WardenError::JobNotFound { job_id: id.into() })?;
        match job.state {
            JobState::Cancelled => Err(warden_core::WardenError::AlreadyCancelled {
                job_id: id.into(),
            }),
            JobState::Completed | JobState::Failed => {
                Err(warden_core::WardenError::InvalidJobState {
                    job_id: id.into(),
                    state: job.state.to_string(),
                })
            }
            JobState::Pending | JobState::Running => {
                job.state = JobState::Cancelled;
                job.error = Some(reason.to_string());
                Ok(job.clone())
            }
        }
    }

    fn finish(
        &self,
        id: &str,
        to: JobState,
        error: Option<String>,
        last_run_at: Option<DateTime<Utc>>,
        retry_count: u32,
    ) -> warden_core::Result<Job> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| warden_core::WardenError::JobNotFound { job_id: id.into() })?;
        if job.state != JobState::Running {
            return Err(warden_core::WardenError::InvalidJobState {
                job_id: id.into(),
                state: job.state.to_string(),
            });
        }
        job.state = to;
        job.error = error;
        if let Some(t) = last_run_at {
            job.last_run_at = Some(t);
        }
        job.retry_count = retry_count;
        Ok(job.clone())
    }
}

// ── SQLite store ───────────────────────────────────────────────

/// SQLite-backed job store. Also accepts audit records, so one database
/// holds both what was scheduled and what happened.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> warden_core::Result<Self> {
        info!(?path, "opening job store");

        let conn = Connection::open(path)
            .map_err(|e| warden_core::WardenError::Store(e.to_string()))?;

        // WAL for concurrent reads.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| warden_core::WardenError::Store(e.to_string()))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,
                schedule TEXT,
                priority INTEGER NOT NULL DEFAULT 5,
                inputs TEXT NOT NULL DEFAULT '{}',
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_run_at TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                action_id TEXT,
                job_id TEXT,
                actor TEXT NOT NULL,
                record TEXT NOT NULL,
                prev_hash TEXT,
                hash TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            ",
        )
        .map_err(|e| warden_core::WardenError::Store(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn write_row(conn: &Connection, job: &Job) -> warden_core::Result<usize> {
        let inputs = serde_json::to_string(&job.inputs)?;
        conn.execute(
            "UPDATE jobs SET task_type = ?2, schedule = ?3, priority = ?4, inputs = ?5,
                    state = ?6, created_at = ?7, last_run_at = ?8, retry_count = ?9,
                    max_retries = ?10, error = ?11
             WHERE id = ?1",
            rusqlite::params![
                job.id,
                job.task_type,
                job.schedule,
                job.priority,
                inputs,
                job.state.to_string(),
                job.created_at.to_rfc3339(),
                job.last_run_at.map(|t| t.to_rfc3339()),
                job.retry_count,
                job.max_retries,
                job.error,
            ],
        )
        .map_err(|e| warden_core::WardenError::Store(e.to_string()))
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawJobRow> {
        Ok(RawJobRow {
            id: row.get(0)?,
            task_type: row.get(1)?,
            schedule: row.get(2)?,
            priority: row.get(3)?,
            inputs: row.get(4)?,
            state: row.get(5)?,
            created_at: row.get(6)?,
            last_run_at: row.get(7)?,
            retry_count: row.get(8)?,
            max_retries: row.get(9)?,
            error: row.get(10)?,
        })
    }

    fn get_locked(conn: &Connection, id: &str) -> warden_core::Result<Option<Job>> {
        let mut stmt = conn
            .prepare(&format!("{SELECT_JOB} WHERE id = ?1"))
            .map_err(|e| warden_core::WardenError::Store(e.to_string()))?;
        let mut rows = stmt
            .query_map([id], Self::read_row)
            .map_err(|e| warden_core::WardenError::Store(e.to_string()))?;
        match rows.next() {
            Some(raw) => {
                let raw = raw.map_err(|e| warden_core::WardenError::Store(e.to_string()))?;
                Ok(Some(raw.into_job()?))
            }
            None => Ok(None),
        }
    }
}

const SELECT_JOB: &str = "SELECT id, task_type, schedule, priority, inputs, state, created_at,
        last_run_at, retry_count, max_retries, error FROM jobs";

struct RawJobRow {
    id: String,
    task_type: String,
    schedule: Option<String>,
    priority: u8,
    inputs: String,
    state: String,
    created_at: String,
    last_run_at: Option<String>,
    retry_count: u32,
    max_retries: u32,
    error: Option<String>,
}

impl RawJobRow {
    fn into_job(self) -> warden_core::Result<Job> {
        let parse_time = |raw: &str| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| warden_core::WardenError::Store(format!("bad timestamp: {e}")))
        };
        Ok(Job {
            id: self.id,
            task_type: self.task_type,
            schedule: self.schedule,
            priority: self.priority,
            inputs: serde_json::from_str(&self.inputs)?,
            state: JobState::from_str(&self.state)?,
            created_at: parse_time(&self.created_at)?,
            last_run_at: self.last_run_at.as_deref().map(parse_time).transpose()?,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            error: self.error,
        })
    }
}

impl JobStore for SqliteJobStore {
    fn insert(&self, job: Job) -> warden_core::Result<()> {
        let conn = self.conn.lock();
        if Self::get_locked(&conn, &job.id)?.is_some() {
            return Err(warden_core::WardenError::JobConflict { job_id: job.id });
        }
        let inputs = serde_json::to_string(&job.inputs)?;
        conn.execute(
            "INSERT INTO jobs (id, task_type, schedule, priority, inputs, state, created_at,
                               last_run_at, retry_count, max_retries, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                job.id,
                job.task_type,
                job.schedule,
                job.priority,
                inputs,
                job.state.to_string(),
                job.created_at.to_rfc3339(),
                job.last_run_at.map(|t| t.to_rfc3339()),
                job.retry_count,
                job.max_retries,
                job.error,
            ],
        )
        .map_err(|e| warden_core::WardenError::Store(e.to_string()))?;
        Ok(())
    }

    fn get(&self, id: &str) -> warden_core::Result<Option<Job>> {
        let conn = self.conn.lock();
        Self::get_locked(&conn, id)
    }

    fn list(&self, state: Option<JobState>) -> warden_core::Result<Vec<Job>> {
        let conn = self.conn.lock();
        let sql = format!("{SELECT_JOB} ORDER BY priority ASC, created_at ASC");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| warden_core::WardenError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::read_row)
            .map_err(|e| warden_core::WardenError::Store(e.to_string()))?;
        let mut out = Vec::new();
        for raw in rows {
            let job = raw
                .map_err(|e| warden_core::WardenError::Store(e.to_string()))?
                .into_job()?;
            if state.is_none_or(|s| job.state == s) {
                out.push(job);
            }
        }
        Ok(out)
    }

    fn claim(&self, id: &str) -> warden_core::Result<Job> {
        let conn = self.conn.lock();
        let mut job = Self::get_locked(&conn, id)?
            .ok_or_else(|| warden_core::WardenError::JobNotFound { job_id: id.into() })?;
        if job.state != JobState::Pending {
            return Err(warden_core::WardenError::InvalidJobState {
                job_id: id.into(),
                state: job.state.to_string(),
            });
        }
        job.state = JobState::Running;
        Self::write_row(&conn, &job)?;
        Ok(job)
    }

    fn cancel(&self, id: &str, reason: &str) -> warden_core::Result<Job> {
        let conn = self.conn.lock();
        let mut job = Self::get_locked(&conn, id)?
            .ok_or_else(|| warden_core::WardenError::JobNotFound { job_id: id.into() })?;
        match job.state {
            JobState::Cancelled => Err(warden_core::WardenError::AlreadyCancelled {
                job_id: id.into(),
            }),
            JobState::Completed | JobState::Failed => {
                Err(warden_core::WardenError::InvalidJobState {
                    job_id: id.into(),
                    state: job.state.to_string(),
                })
            }
            JobState::Pending | JobState::Running => {
                job.state = JobState::Cancelled;
                job.error = Some(reason.to_string());
                Self::write_row(&conn, &job)?;
                Ok(job)
            }
        }
    }

    fn finish(
        &self,
        id: &str,
        to: JobState,
        error: Option<String>,
        last_run_at: Option<DateTime<Utc>>,
        retry_count: u32,
    ) -> warden_core::Result<Job> {
        let conn = self.conn.lock();
        let mut job = Self::get_locked(&conn, id)?
            .ok_or_else(|| warden_core::WardenError::JobNotFound { job_id: id.into() })?;
        if job.state != JobState::Running {
            return Err(warden_core::WardenError::InvalidJobState {
                job_id: id.into(),
                state: job.state.to_string(),
            });
        }
        job.state = to;
        job.error = error;
        if let Some(t) = last_run_at {
            job.last_run_at = Some(t);
        }
        job.retry_count = retry_count;
        Self::write_row(&conn, &job)?;
        Ok(job)
    }
}

impl AuditSink for SqliteJobStore {
    fn persist(&self, record: &AuditRecord) -> warden_core::Result<()> {
        let conn = self.conn.lock();
        let body = serde_json::to_string(record)?;
        conn.execute(
            "INSERT INTO audit_log (timestamp, action_id, job_id, actor, record, prev_hash, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.timestamp.to_rfc3339(),
                record.action_id.map(|id| id.to_string()),
                record.job_id,
                record.actor,
                body,
                record.prev_hash,
                record.hash,
            ],
        )
        .map_err(|e| warden_core::WardenError::Store(e.to_string()))?;
        Ok(())
    }
}
