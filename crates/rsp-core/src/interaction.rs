//! Per-turn interaction records and the sinks that receive them.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{Local, Utc};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::{domain::Modality, errors::Error, Result};

const LOG_MAX_TEXT: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One processed turn. Write-only from the core's point of view.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InteractionRecord {
    pub timestamp: String,
    pub sender: String,
    pub incoming: String,
    pub outgoing: String,
    pub modality: Modality,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl InteractionRecord {
    pub fn new(
        sender: impl Into<String>,
        incoming: impl Into<String>,
        outgoing: impl Into<String>,
        modality: Modality,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            sender: sender.into(),
            incoming: incoming.into(),
            outgoing: outgoing.into(),
            modality,
            status: DeliveryStatus::Sent,
            note: None,
        }
    }

    pub fn failed(mut self, note: impl Into<String>) -> Self {
        self.status = DeliveryStatus::Failed;
        self.note = Some(note.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Fire-and-forget sink. Implementations swallow (and trace) their own failures.
pub trait InteractionLog: Send + Sync {
    fn record(&self, record: InteractionRecord);
}

/// Prints each record as a small key/value table on stdout.
#[derive(Clone, Debug, Default)]
pub struct ConsoleTableLog;

impl InteractionLog for ConsoleTableLog {
    fn record(&self, record: InteractionRecord) {
        println!("{}", render_table(&record));
    }
}

pub fn render_table(record: &InteractionRecord) -> String {
    let local_time = chrono::DateTime::parse_from_rfc3339(&record.timestamp)
        .map(|t| {
            t.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| record.timestamp.clone());

    let mode = match record.status {
        DeliveryStatus::Sent => record.modality.label().to_string(),
        DeliveryStatus::Failed => format!("{} (failed)", record.modality.label()),
    };

    let mut header = vec!["Time", "From", "Received", "Sent", "Mode"];
    let mut row = vec![
        local_time,
        record.sender.clone(),
        one_line(&record.incoming),
        one_line(&record.outgoing),
        mode,
    ];
    if let Some(note) = &record.note {
        header.push("Note");
        row.push(one_line(note));
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header)
        .add_row(row);
    table.to_string()
}

fn one_line(s: &str) -> String {
    s.replace(['\n', '\r'], " ")
}

/// Append-only file sink (plain blocks or JSON lines).
#[derive(Clone, Debug)]
pub struct FileInteractionLog {
    path: PathBuf,
    json: bool,
}

impl FileInteractionLog {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut record: InteractionRecord) -> Result<()> {
        record.incoming = truncate_text(&record.incoming, LOG_MAX_TEXT);
        record.outgoing = truncate_text(&record.outgoing, LOG_MAX_TEXT);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&record)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&record)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "interaction record is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            match v {
                serde_json::Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

impl InteractionLog for FileInteractionLog {
    fn record(&self, record: InteractionRecord) {
        if let Err(e) = self.write(record) {
            tracing::warn!(path = %self.path.display(), error = %e, "interaction log write failed");
        }
    }
}

/// Forwards every record to each inner sink.
#[derive(Clone, Default)]
pub struct FanoutLog {
    sinks: Vec<Arc<dyn InteractionLog>>,
}

impl FanoutLog {
    pub fn new(sinks: Vec<Arc<dyn InteractionLog>>) -> Self {
        Self { sinks }
    }
}

impl InteractionLog for FanoutLog {
    fn record(&self, record: InteractionRecord) {
        for sink in &self.sinks {
            sink.record(record.clone());
        }
    }
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}
