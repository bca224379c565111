use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Actor used when a record carries no sender identity.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// One decoded entry of the record log.
///
/// Records are immutable once decoded; the core never writes them back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: i64,
    pub timestamp: DateTime<FixedOffset>,
    pub actor: String,
    pub content: String,
}

impl Record {
    pub fn new(
        id: i64,
        timestamp: DateTime<FixedOffset>,
        actor: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            timestamp,
            actor: actor.into(),
            content: content.into(),
        }
    }
}
