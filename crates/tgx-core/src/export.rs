//! Decoding of Telegram chat exports.
//!
//! An export is one Telethon message object per line, appended oldest first:
//!
//! ```json
//! {"_": "Message", "id": 7, "date": "2024-05-01T12:00:00+00:00", "message": "hi",
//!  "from_id": {"_": "PeerUser", "user_id": 42}, "peer_id": {"_": "PeerChannel", "channel_id": 9}}
//! ```
//!
//! Lines that do not decode are skipped here, before records reach the
//! chunker or the trend analyzer.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::Path,
};

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use crate::{
    domain::{Record, UNKNOWN_ACTOR},
    errors::Error,
    reverse::ReverseLines,
    Result,
};

/// Sender of a message (`from_id`).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FromId {
    #[serde(rename = "_", default)]
    pub from_type: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// The subset of a Telethon message the tools care about.
#[derive(Clone, Debug)]
pub struct ExportItem {
    pub id: i64,
    pub date: DateTime<FixedOffset>,
    pub message: String,
    pub from_id: Option<FromId>,
}

#[derive(Deserialize)]
struct RawItem {
    id: i64,
    date: String,
    // Absent on service messages (joins, pins, ...).
    message: Option<String>,
    #[serde(default)]
    from_id: Option<FromId>,
}

impl ExportItem {
    /// Sender user id as text, or `"unknown"`.
    pub fn actor(&self) -> String {
        self.from_id
            .as_ref()
            .and_then(|f| f.user_id)
            .map(|id| id.to_string())
            .unwrap_or_else(|| UNKNOWN_ACTOR.to_string())
    }

    /// False for channel posts and empty messages.
    pub fn is_content(&self) -> bool {
        let from_channel = self
            .from_id
            .as_ref()
            .is_some_and(|f| f.from_type == "PeerChannel");
        !from_channel && !self.message.is_empty()
    }

    pub fn into_record(self) -> Record {
        let actor = self.actor();
        Record {
            id: self.id,
            timestamp: self.date,
            actor,
            content: self.message,
        }
    }
}

/// Decode one export line. Returns `None` for anything that is not a message.
pub fn decode_line(line: &str) -> Option<ExportItem> {
    let raw: RawItem = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "skipping undecodable export line");
            return None;
        }
    };

    let message = raw.message?;
    let Some(date) = parse_date(&raw.date) else {
        debug!(id = raw.id, date = %raw.date, "skipping export line with bad date");
        return None;
    };

    Some(ExportItem {
        id: raw.id,
        date,
        message,
        from_id: raw.from_id,
    })
}

/// Decode one line into a content record (see [`ExportItem::is_content`]).
pub fn decode_record(line: &str) -> Option<Record> {
    decode_line(line)
        .filter(ExportItem::is_content)
        .map(ExportItem::into_record)
}

/// ISO-8601 date with offset; a naive date-time is taken as UTC.
pub fn parse_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Content records of a line iterator, skipping lines that do not decode.
pub struct Records<L> {
    lines: L,
    skipped: usize,
}

impl<L> Records<L> {
    pub fn new(lines: L) -> Self {
        Self { lines, skipped: 0 }
    }

    /// Lines dropped so far (undecodable, service messages, filtered out).
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<L, E> Iterator for Records<L>
where
    L: Iterator<Item = std::result::Result<String, E>>,
    E: Into<Error>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if line.trim().is_empty() {
                continue;
            }
            match decode_record(&line) {
                Some(record) => return Some(Ok(record)),
                None => self.skipped += 1,
            }
        }
    }
}

/// Content records in file order (oldest first).
pub fn records(path: impl AsRef<Path>) -> Result<Records<Lines<BufReader<File>>>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Records::new(BufReader::new(file).lines()))
}

/// Content records newest first, read backwards from the end of the file.
pub fn records_rev(path: impl AsRef<Path>, buffer_size: usize) -> Result<Records<ReverseLines>> {
    Ok(Records::new(ReverseLines::open(path, buffer_size)?))
}

/// Group records per actor.
///
/// Each group is sorted by id; groups are ordered by size, largest first, with
/// ties kept in first-seen order.
pub fn group_by_actor(records: impl IntoIterator<Item = Record>) -> Vec<(String, Vec<Record>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Record>)> = Vec::new();

    for record in records {
        let slot = *index.entry(record.actor.clone()).or_insert_with(|| {
            groups.push((record.actor.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(record);
    }

    for (_, group) in groups.iter_mut() {
        group.sort_by_key(|r| r.id);
    }
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    groups
}
