//! EventHandler: near-real-time correction after an Application commits.
//!
//! Delivery is at-least-once and events may race each other, so the
//! payload is only used for filtering. The handler re-reads the current
//! row and lets the Corrector decide. Redelivery of an already-handled
//! event is a pure read.

use crate::{
    config::EventConfig,
    corrector::{Correction, CorrectionReason, Corrector},
    error::ReconError,
    event::ChangeNotification,
    types::{short_id, SELECTED_PLANS},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Ok,
    Skipped,
    NotFound,
    BadRequest,
    StoreError,
}

impl EventStatus {
    /// Status code a webhook sender should see.
    pub const fn http_status(self) -> u16 {
        match self {
            EventStatus::Ok | EventStatus::Skipped => 200,
            EventStatus::NotFound => 404,
            EventStatus::BadRequest => 400,
            EventStatus::StoreError => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResponse {
    pub success: bool,
    pub status: EventStatus,
    pub http_status: u16,
    pub message: String,
    pub application_id: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub simulation_type: Option<String>,
    pub updated: bool,
    pub error: Option<String>,
}

impl EventResponse {
    fn new(status: EventStatus, message: impl Into<String>, application_id: Option<&str>) -> Self {
        Self {
            success: matches!(status, EventStatus::Ok | EventStatus::Skipped),
            status,
            http_status: status.http_status(),
            message: message.into(),
            application_id: application_id.map(str::to_string),
            before: None,
            after: None,
            simulation_type: None,
            updated: false,
            error: None,
        }
    }

    fn failure(status: EventStatus, error: &ReconError, application_id: Option<&str>) -> Self {
        let mut resp = Self::new(status, "correction failed", application_id);
        resp.error = Some(error.to_string());
        resp
    }

    pub fn bad_request(error: &ReconError) -> Self {
        let mut resp = Self::new(EventStatus::BadRequest, "invalid payload", None);
        resp.error = Some(error.to_string());
        resp
    }

    fn from_correction(c: &Correction) -> Self {
        let (status, message) = match c.reason {
            CorrectionReason::Corrected => (EventStatus::Ok, "financing_type corrected"),
            CorrectionReason::AlreadyCorrect | CorrectionReason::ConcurrentlyCorrected => {
                (EventStatus::Ok, "financing_type already correct")
            }
            CorrectionReason::NotApplicable => (EventStatus::Skipped, "skipped: not applicable"),
            CorrectionReason::SourceNotReady => (EventStatus::NotFound, "source plan not found"),
        };
        let mut resp = Self::new(status, message, Some(&c.application_id));
        resp.before = c.old_financing_type.clone();
        resp.after = c.new_financing_type.clone();
        resp.simulation_type = c.simulation_type.clone();
        resp.updated = c.updated;
        if status == EventStatus::NotFound {
            resp.error = Some(c.reason.to_string());
        }
        resp
    }
}

#[derive(Clone)]
pub struct EventHandler {
    corrector: Corrector,
    events: EventConfig,
}

impl EventHandler {
    pub fn new(corrector: Corrector, events: EventConfig) -> Self {
        Self { corrector, events }
    }

    /// Parse and handle a raw payload. Never fails: malformed input becomes
    /// a `BadRequest` response.
    pub fn handle_json(&self, raw: &str) -> EventResponse {
        match ChangeNotification::from_json(raw) {
            Ok(notification) => self.handle(&notification),
            Err(e) => {
                log::warn!("event: rejected payload: {e}");
                EventResponse::bad_request(&e)
            }
        }
    }

    pub fn handle(&self, notification: &ChangeNotification) -> EventResponse {
        let record = &notification.record;
        let id = record.id.as_str();

        if let Some(event) = notification.event.as_deref() {
            if !self.events.accepts(event) {
                log::debug!("event: ignoring '{event}' for {}", short_id(id));
                return EventResponse::new(
                    EventStatus::Skipped,
                    format!("skipped: ignored event {event}"),
                    Some(id),
                );
            }
        }

        // Partial payloads may omit application_type; those fall through
        // to the re-read below.
        let wrong_type = record
            .application_type
            .as_deref()
            .is_some_and(|t| t != SELECTED_PLANS);
        let no_source = record.application_type.is_some() && record.source_id.is_none();
        if wrong_type || no_source {
            log::debug!("event: {} not applicable", short_id(id));
            return EventResponse::new(EventStatus::Skipped, "skipped: not applicable", Some(id));
        }

        match self.corrector.apply_by_id(id) {
            Ok(correction) => {
                let resp = EventResponse::from_correction(&correction);
                log::info!(
                    "event: {} {} (updated={})",
                    short_id(id),
                    correction.reason,
                    correction.updated
                );
                resp
            }
            Err(e) => {
                let status = match &e {
                    ReconError::ApplicationNotFound { .. } | ReconError::Lookup { .. } => {
                        EventStatus::NotFound
                    }
                    _ => EventStatus::StoreError,
                };
                log::warn!("event: {} failed: {e}", short_id(id));
                EventResponse::failure(status, &e, Some(id))
            }
        }
    }
}
