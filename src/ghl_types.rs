//! Wire types for the GoHighLevel (LeadConnector) v2 REST API.
//!
//! The platform is loosely shaped: events carry their status as
//! `appointmentStatus` in some payloads and `status` in others, contact
//! results nest under `contact` or `contacts` depending on the endpoint,
//! and the free-slots response mixes `YYYY-MM-DD` day buckets with
//! bookkeeping keys like `traceId` in one flat object.  Everything here
//! normalizes those shapes at the boundary so nothing platform-shaped
//! leaks past `ghl.rs`.

use crate::types::{AppointmentEvent, AppointmentStatus, Contact, DaySlots};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhlContact {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<GhlContact> for Contact {
    fn from(wire: GhlContact) -> Self {
        // The directory stores empty strings where a field was cleared.
        let non_empty = |field: Option<String>| field.filter(|s| !s.trim().is_empty());
        Contact {
            id: wire.id,
            first_name: non_empty(wire.first_name),
            last_name: non_empty(wire.last_name),
            phone: non_empty(wire.phone),
            email: non_empty(wire.email),
        }
    }
}

/// Duplicate search, contact fetch and contact create all nest the record
/// under `contact`; a miss is an absent or null field, not an error.
#[derive(Debug, Default, Deserialize)]
pub struct ContactEnvelope {
    #[serde(default)]
    pub contact: Option<GhlContact>,
}

/// Free-text contact query results arrive as a list under `contacts`.
#[derive(Debug, Default, Deserialize)]
pub struct ContactListEnvelope {
    #[serde(default)]
    pub contacts: Vec<GhlContact>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpsertRequest<'a> {
    /// Sent on create; the platform rejects it on update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
}

/// One calendar event as the platform reports it.  Only the fields the
/// bridge reasons about are modeled; the rest ride along in the serialized
/// record kept on `AppointmentEvent::search_text`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhlEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// `appointmentStatus` on calendar listings, `status` on contact
    /// appointment histories.
    #[serde(default, alias = "status")]
    pub appointment_status: Option<AppointmentStatus>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

/// Map one raw platform event into the domain model, keeping the full
/// serialized record for the deep scan's containment check.  Records with
/// no id (or that are not objects at all) are dropped.
pub fn event_from_value(value: &Value) -> Option<AppointmentEvent> {
    let wire: GhlEvent = serde_json::from_value(value.clone()).ok()?;
    if wire.id.is_empty() {
        return None;
    }
    Some(AppointmentEvent {
        id: wire.id,
        contact_id: wire.contact_id,
        calendar_id: wire.calendar_id,
        title: wire.title,
        status: wire.appointment_status.unwrap_or(AppointmentStatus::Unknown),
        start_time: wire.start_time.as_deref().and_then(parse_platform_time),
        end_time: wire.end_time.as_deref().and_then(parse_platform_time),
        search_text: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct EventListEnvelope {
    #[serde(default)]
    pub events: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentListEnvelope {
    #[serde(default)]
    pub appointments: Vec<Value>,
}

/// The free-slots endpoint answers with one flat object whose keys are
/// mostly days -- except when they are not (`traceId` rides along at the
/// top level).  Keys whose values do not look like a slot bucket are
/// ignored rather than failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct FreeSlotsResponse {
    #[serde(flatten)]
    pub days: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SlotBucket {
    slots: Vec<String>,
}

impl FreeSlotsResponse {
    /// Day buckets in date order, slot strings untouched.
    pub fn into_day_slots(self) -> Vec<DaySlots> {
        self.days
            .into_iter()
            .filter_map(|(date, value)| {
                let bucket: SlotBucket = serde_json::from_value(value).ok()?;
                Some(DaySlots {
                    date,
                    slots: bucket.slots,
                })
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest<'a> {
    pub calendar_id: &'a str,
    pub location_id: &'a str,
    pub contact_id: &'a str,
    pub start_time: String,
    pub end_time: String,
    pub title: &'a str,
    pub appointment_status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<&'a str>,
    /// The agent only offers slots the platform reported free, so the
    /// platform's own slot re-check adds nothing but spurious rejections.
    pub ignore_free_slot_validation: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentStatusPatch {
    pub appointment_status: AppointmentStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentTimePatch {
    pub start_time: String,
    pub end_time: String,
}

/// Create responses differ across platform versions: sometimes the new
/// event is the body, sometimes it nests under `event` or `appointment`.
#[derive(Debug, Default, Deserialize)]
pub struct CreatedAppointment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "appointment")]
    pub event: Option<Value>,
}

impl CreatedAppointment {
    pub fn created_id(&self) -> Option<String> {
        if let Some(id) = &self.id {
            return Some(id.clone());
        }
        self.event
            .as_ref()
            .and_then(|event| event.get("id"))
            .and_then(|id| id.as_str())
            .map(String::from)
    }
}

/// Rejection bodies carry `message` as either a string or an array of
/// strings, depending on which platform validation layer fired.
#[derive(Debug, Default, Deserialize)]
pub struct GhlErrorBody {
    #[serde(default)]
    pub message: Option<Value>,
}

impl GhlErrorBody {
    pub fn message_text(&self) -> Option<String> {
        match &self.message {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Array(parts)) => Some(
                parts
                    .iter()
                    .filter_map(|part| part.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        }
    }
}

/// Platform timestamps are RFC3339, usually with a venue-local offset.
pub fn parse_platform_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// The platform wants millisecond-precision UTC on appointment writes.
pub fn to_platform_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
