use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::job::Job;

/// Validate a cron expression at submission time.
pub fn validate(expr: &str) -> warden_core::Result<()> {
    parse(expr).map(|_| ())
}

/// Next fire time strictly after `after`, or `None` for expressions with
/// no future occurrence.
pub fn next_due(expr: &str, after: DateTime<Utc>) -> warden_core::Result<Option<DateTime<Utc>>> {
    Ok(parse(expr)?.after(&after).next())
}

/// Whether a job is due at `now`. Ad-hoc pending jobs are always due;
/// scheduled jobs are due once a fire time between the last run (or
/// creation) and now has passed.
pub fn is_due(job: &Job, now: DateTime<Utc>) -> warden_core::Result<bool> {
    match &job.schedule {
        None => Ok(true),
        Some(expr) => {
            let since = job.last_run_at.unwrap_or(job.created_at);
            Ok(next_due(expr, since)?.is_some_and(|next| next <= now))
        }
    }
}

fn parse(expr: &str) -> warden_core::Result<Schedule> {
    Schedule::from_str(&normalize(expr)).map_err(|e| warden_core::WardenError::InvalidSchedule {
        expression: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Classic five-field expressions get a seconds column prepended.
fn normalize(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}
