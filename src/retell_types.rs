//! Tool-call payloads exchanged with the Retell voice platform.
//!
//! Every agent tool invocation arrives as `{ "call": {...}, "args": {...} }`.
//! Argument keys drift between snake_case and camelCase across agent
//! revisions, and `phone` arrives as whatever the prompt template produced
//! (sometimes a JSON number, sometimes an unsubstituted `{{...}}` marker),
//! so it stays a raw `Value` until `identity::resolve_caller_phone` vets it.

use crate::types::{AppointmentEvent, AppointmentStatus};

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct ToolCall<T> {
    #[serde(default)]
    pub call: Option<CallContext>,
    #[serde(default)]
    pub args: T,
}

/// Call metadata the platform attaches to every tool invocation.
#[derive(Debug, Default, Deserialize)]
pub struct CallContext {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub from_number: Option<String>,
    #[serde(default)]
    pub to_number: Option<String>,
    #[serde(default, alias = "customerNumber")]
    pub customer_number: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckAvailabilityArgs {
    #[serde(default)]
    pub phone: Option<Value>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookAppointmentArgs {
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<Value>,
    /// Requested slot start, normally RFC3339 with an offset.
    #[serde(default, alias = "dateTime")]
    pub date_time: Option<String>,
    /// When present, retarget this exact event instead of reconciling.
    #[serde(default, alias = "appointmentId")]
    pub appointment_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelAppointmentArgs {
    #[serde(default, alias = "appointmentId")]
    pub appointment_id: Option<String>,
    #[serde(default)]
    pub phone: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactInfoArgs {
    #[serde(default)]
    pub phone: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateContactArgs {
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available_slots: Vec<String>,
    pub existing_appointments: Vec<ExistingAppointment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
}

/// What the agent is told about an appointment the caller already holds.
#[derive(Debug, Serialize)]
pub struct ExistingAppointment {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    pub status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ExistingAppointment {
    pub fn from_event(event: &AppointmentEvent) -> Self {
        Self {
            id: event.id.clone(),
            start_time: event
                .start_time
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            status: event.status,
            title: event.title.clone(),
        }
    }
}

/// Terse acknowledgement the agent reads back to the caller.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Default, Serialize)]
pub struct ContactInfoResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
