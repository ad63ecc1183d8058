use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::diff::diff_json;

/// How decoded thermostat snapshots are written to the traffic log.
pub enum TrafficLogMode {
    /// Every snapshot in full.
    Full,
    /// First snapshot in full, then only the changed paths.
    Diffed,
}

/// NDJSON log of portal traffic, for diagnosing markup changes.
/// Credentials and tokens are never passed in.
pub(crate) struct TrafficLogger {
    mode: TrafficLogMode,
    file: File,
    previous_snapshot: Option<Value>,
}

impl TrafficLogger {
    pub fn new(mode: TrafficLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_snapshot: None,
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_response(&mut self, method: &str, path: &str, status: u16) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "resp",
            "method": method,
            "path": path,
            "status": status,
        });
        self.write_line(&entry);
    }

    pub fn log_snapshot(&mut self, house_id: u64, snapshot: &Value) {
        let entry = match (&self.mode, &self.previous_snapshot) {
            (TrafficLogMode::Diffed, Some(prev)) => {
                let mut changes = Vec::new();
                diff_json(prev, snapshot, "", &mut changes);
                let change_entries: Vec<Value> = changes
                    .iter()
                    .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                    .collect();
                json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "snapshot",
                    "house": house_id,
                    "changes": change_entries,
                })
            }
            (TrafficLogMode::Diffed, None) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "snapshot",
                "house": house_id,
                "full": true,
                "body": snapshot,
            }),
            (TrafficLogMode::Full, _) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "snapshot",
                "house": house_id,
                "body": snapshot,
            }),
        };
        self.write_line(&entry);
        self.previous_snapshot = Some(snapshot.clone());
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write traffic log entry: {e}");
        }
    }
}
