use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only writer for the generation event log (`events.jsonl`).
///
/// Every line is one compact JSON object carrying `event`, `session`, and
/// `at` defaults; the caller payload is merged last and may override them.
/// Clones share the same file handle discipline, so a writer can be handed
/// to several call sites within one session.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<EventLogInner>,
}

#[derive(Debug)]
struct EventLogInner {
    path: PathBuf,
    session: String,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLogInner {
                path: path.into(),
                session: session.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session(&self) -> &str {
        &self.inner.session
    }

    pub fn emit(&self, event: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut row = Map::new();
        row.insert("event".to_string(), Value::String(event.to_string()));
        row.insert(
            "session".to_string(),
            Value::String(self.inner.session.clone()),
        );
        row.insert(
            "at".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        for (key, value) in payload {
            row.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(&row)?;

        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(row))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    #[test]
    fn emit_writes_one_json_object_per_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let log = EventLog::new(&path, "session-7");

        let mut payload = EventPayload::new();
        payload.insert("scene".to_string(), json!("学校"));
        log.emit("generation_started", payload)?;
        log.emit("image_generated", EventPayload::new())?;

        let raw = fs::read_to_string(&path)?;
        let rows: Vec<Value> = raw
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["event"], json!("generation_started"));
        assert_eq!(rows[0]["session"], json!("session-7"));
        assert_eq!(rows[0]["scene"], json!("学校"));
        assert_eq!(rows[1]["event"], json!("image_generated"));

        let at = rows[0]["at"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(at)?;
        Ok(())
    }

    #[test]
    fn payload_overrides_default_fields() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = EventLog::new(temp.path().join("events.jsonl"), "session-7");

        let mut payload = EventPayload::new();
        payload.insert("session".to_string(), json!("override"));
        let emitted = log.emit("generation_failed", payload)?;
        assert_eq!(emitted["session"], json!("override"));
        Ok(())
    }
}
