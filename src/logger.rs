use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::diff::diff_json;

/// How installation snapshots are written to the capture log.
pub enum MessageLogMode {
    /// Every snapshot body in full.
    Full,
    /// First snapshot in full, later ones as path/old/new change lists.
    Diffed,
}

/// NDJSON capture of broker traffic: inbound messages, outbound commands and snapshots.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_snapshot: Option<Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_snapshot: None,
        })
    }

    pub fn log_inbound(&mut self, topic: &str, payload: &str) {
        let body = serde_json::from_str::<Value>(payload).unwrap_or_else(|_| json!(payload));
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "in",
            "topic": topic,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_command(&mut self, action: &str, topic: &str, body: &Value) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "action": action,
            "topic": topic,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_snapshot(&mut self, body: &Value) {
        let entry = match (&self.mode, &self.previous_snapshot) {
            (MessageLogMode::Diffed, Some(previous)) => {
                let mut changes = Vec::new();
                diff_json(previous, body, "", &mut changes);
                let changes: Vec<Value> = changes
                    .into_iter()
                    .map(|c| json!({ "path": c.path, "old": c.old, "new": c.new }))
                    .collect();
                json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "snapshot",
                    "changes": changes,
                })
            }
            (MessageLogMode::Diffed, None) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "snapshot",
                "full": true,
                "body": body,
            }),
            (MessageLogMode::Full, _) => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "snapshot",
                "body": body,
            }),
        };
        self.write_line(&entry);
        if matches!(self.mode, MessageLogMode::Diffed) {
            self.previous_snapshot = Some(body.clone());
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}
