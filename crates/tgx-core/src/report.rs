use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{
    chunker::Chunk,
    utils::{format_timestamp, truncate_text},
    Result,
};

/// Size and time bounds of an emitted chunk.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChunkSummary {
    pub count: usize,
    pub from: String,
    pub to: String,
    pub span_secs: i64,
}

impl ChunkSummary {
    pub fn of(chunk: &Chunk) -> Self {
        Self {
            count: chunk.count(),
            from: format_timestamp(&chunk.first().timestamp),
            to: format_timestamp(&chunk.last().timestamp),
            span_secs: chunk.span().num_seconds(),
        }
    }
}

/// One message as handed to downstream batch analysis.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChunkMessage {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub text: String,
    pub date: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChunkReport {
    pub run_at: String,
    pub index: usize,
    pub summary: ChunkSummary,
    pub messages: Vec<ChunkMessage>,
}

impl ChunkReport {
    pub fn new(run_at: &DateTime<Local>, index: usize, chunk: &Chunk) -> Self {
        let messages = chunk
            .records()
            .iter()
            .map(|r| ChunkMessage {
                user_id: r.actor.clone(),
                text: r.content.clone(),
                date: format_timestamp(&r.timestamp),
            })
            .collect();

        Self {
            run_at: run_at.to_rfc3339(),
            index,
            summary: ChunkSummary::of(chunk),
            messages,
        }
    }
}

/// Append-only log of chunk reports for one run.
#[derive(Clone, Debug)]
pub struct ReportLog {
    path: PathBuf,
    json: bool,
    max_text: usize,
}

impl ReportLog {
    pub fn new(path: impl Into<PathBuf>, json: bool, max_text: usize) -> Self {
        Self {
            path: path.into(),
            json,
            max_text,
        }
    }

    /// `<dir>/<input stem>/<run timestamp>.<jsonl|log>`. The file is created
    /// up front, so it exists even when the run emits no chunk.
    pub fn for_run(
        dir: &Path,
        input: &Path,
        run_at: &DateTime<Local>,
        json: bool,
        max_text: usize,
    ) -> Result<Self> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".to_string());
        let ext = if json { "jsonl" } else { "log" };
        let path = dir
            .join(stem)
            .join(format!("{}.{ext}", run_at.format("%Y-%m-%d-%H-%M-%S")));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self::new(path, json, max_text))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, report: &ChunkReport) -> Result<()> {
        let mut report = report.clone();
        for m in report.messages.iter_mut() {
            m.text = truncate_text(&m.text, self.max_text);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&report)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("date: {}\n", report.run_at));
        out.push_str(&format!("chunk: {}\n", report.index));
        out.push_str("messages:\n");
        out.push_str(&format!("  count: {}\n", report.summary.count));
        out.push_str(&format!("  from: {}\n", report.summary.from));
        out.push_str(&format!("  to: {}\n", report.summary.to));
        for m in &report.messages {
            out.push_str(&format!("  - [{}] {}: {}\n", m.date, m.user_id, m.text));
        }

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}
