//! OD-014: Append-only JSONL journal at `<state_dir>/events.jsonl`.

use crate::core::error::{Error, Result};
use crate::core::types::{AuditEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso8601() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format_utc(secs)
}

/// Format seconds since the epoch as an ISO 8601 UTC timestamp.
pub fn format_utc(secs: u64) -> String {
    let (y, m, d) = civil_from_days((secs / 86_400) as i64);
    let rem = secs % 86_400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

/// Run ID for one execution: `x-` plus the low 48 bits of the nanosecond clock.
pub fn generate_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("x-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

pub fn journal_path(state_dir: &Path) -> PathBuf {
    state_dir.join("events.jsonl")
}

/// Append one event, creating the state directory if needed.
pub fn append_event(state_dir: &Path, event: AuditEvent) -> Result<()> {
    std::fs::create_dir_all(state_dir).map_err(|e| Error::io("create directory", state_dir, e))?;
    let path = journal_path(state_dir);
    let line = serde_json::to_string(&TimestampedEvent {
        ts: now_iso8601(),
        event,
    })
    .map_err(|e| Error::Config(format!("cannot serialize audit event: {}", e)))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::io("open", &path, e))?;
    writeln!(file, "{}", line).map_err(|e| Error::io("append to", &path, e))
}

/// Append, logging instead of failing. The journal never decides an outcome.
pub fn record(state_dir: &Path, event: AuditEvent) {
    if let Err(e) = append_event(state_dir, event) {
        tracing::warn!(error = %e, "audit journal write failed");
    }
}

/// The last `limit` events, oldest first. Unreadable lines are skipped with a warning.
pub fn read_events(state_dir: &Path, limit: usize) -> Result<Vec<TimestampedEvent>> {
    let path = journal_path(state_dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io("read", &path, e)),
    };
    let mut events: Vec<TimestampedEvent> = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .filter_map(|(i, l)| match serde_json::from_str(l) {
            Ok(ev) => Some(ev),
            Err(e) => {
                tracing::warn!(line = i + 1, error = %e, "skipping unreadable journal line");
                None
            }
        })
        .collect();
    let skip = events.len().saturating_sub(limit);
    Ok(events.split_off(skip))
}
