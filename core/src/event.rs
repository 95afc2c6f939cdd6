//! Change-notification payloads delivered after an Application commits.
//!
//! Webhook senders use either `event` or `type` for the event name, and a
//! few deliver the bare record with no envelope. Both shapes parse into
//! `ChangeNotification`.

use crate::error::ReconResult;
use serde::{Deserialize, Serialize};

/// The committed record as carried in the payload. Only used to filter
/// and to report `before`; the handler always re-reads current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangedRecord {
    pub id: String,
    #[serde(default)]
    pub application_type: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub financing_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// `None` when the payload had no envelope.
    #[serde(alias = "type", default)]
    pub event: Option<String>,
    pub record: ChangedRecord,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
    Envelope(ChangeNotification),
    Bare(ChangedRecord),
}

impl ChangeNotification {
    pub fn new(event: &str, record: ChangedRecord) -> Self {
        Self {
            event: Some(event.to_string()),
            record,
        }
    }

    pub fn from_json(raw: &str) -> ReconResult<Self> {
        Ok(Self::from_value(serde_json::from_str(raw)?)?)
    }

    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match serde_json::from_value::<Wire>(value)? {
            Wire::Envelope(n) => n,
            Wire::Bare(record) => ChangeNotification {
                event: None,
                record,
            },
        })
    }
}
