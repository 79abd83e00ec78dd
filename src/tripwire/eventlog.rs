//! Append-only JSONL synthesis event log, one per stack.

use crate::core::types::{SynthEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const EVENT_LOG_FILE: &str = "events.jsonl";

/// Event log of a single stack: `<state_dir>/<stack>/events.jsonl`.
#[derive(Debug, Clone)]
pub struct EventLog {
    stack: String,
    path: PathBuf,
}

impl EventLog {
    pub fn new(state_dir: &Path, stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
            path: state_dir.join(stack).join(EVENT_LOG_FILE),
        }
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event, stamped with the current time.
    pub fn append(&self, event: SynthEvent) -> Result<(), String> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
        }
        let mut line = serde_json::to_string(&TimestampedEvent {
            ts: now_iso8601(),
            event,
        })
        .map_err(|e| format!("cannot encode event for {}: {}", self.stack, e))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| format!("cannot open event log {}: {}", self.path.display(), e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| format!("cannot append to {}: {}", self.path.display(), e))
    }

    /// All events in append order. A log that was never written is empty.
    pub fn read(&self) -> Result<Vec<TimestampedEvent>, String> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| format!("cannot read {}: {}", self.path.display(), e))?;
        content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .map_err(|e| format!("{} line {}: {}", self.path.display(), i + 1, e))
            })
            .collect()
    }
}

fn unix_now() -> std::time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso8601() -> String {
    format_utc(unix_now().as_secs())
}

/// Format seconds since the epoch as an ISO 8601 UTC timestamp.
pub fn format_utc(secs: u64) -> String {
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (y, m, d) = civil_from_days(days as i64);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        rem / 3600,
        rem % 3600 / 60,
        rem % 60
    )
}

/// Proleptic Gregorian date of a day count since 1970-01-01, computed in
/// 400-year eras starting each March.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Run id correlating one synthesis's events: `r-` plus 12 hex digits of
/// BLAKE3 over the stack name and the current time.
pub fn generate_run_id(stack: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(stack.as_bytes());
    hasher.update(&unix_now().as_nanos().to_le_bytes());
    format!("r-{}", &hasher.finalize().to_hex()[..12])
}
