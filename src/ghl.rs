use crate::error::AppError;
use crate::ghl_types::{
    event_from_value, to_platform_time, AppointmentListEnvelope, AppointmentStatusPatch,
    AppointmentTimePatch, ContactEnvelope, ContactListEnvelope, ContactUpsertRequest,
    CreateAppointmentRequest, CreatedAppointment, EventListEnvelope, FreeSlotsResponse,
    GhlErrorBody,
};
use crate::types::{AppointmentEvent, AppointmentStatus, Contact, ContactFields, DaySlots};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

pub const DEFAULT_API_BASE: &str = "https://services.leadconnectorhq.com";

/// API version header for contact and calendar reads.
const VERSION_READS: &str = "2021-07-28";
/// Appointment writes only exist under the older version.
const VERSION_APPOINTMENT_WRITES: &str = "2021-04-15";

/// What a booking asks the platform to create.  Location, assigned user
/// and the slot-validation bypass are client configuration, not caller
/// input.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub calendar_id: String,
    pub contact_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The scheduling platform as the rest of the bridge sees it.  Resolution
/// and reconciliation are written against this seam; `GhlClient` is the
/// wire implementation and the tests substitute an in-memory one.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// Exact duplicate search on a phone value, in whatever format.
    async fn find_contact_by_number(&self, number: &str) -> Result<Option<Contact>, AppError>;

    /// Free-text directory query; broader than duplicate search.
    async fn query_contacts(&self, text: &str) -> Result<Vec<Contact>, AppError>;

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, AppError>;

    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, AppError>;

    async fn create_contact(&self, fields: &ContactFields) -> Result<Contact, AppError>;

    async fn update_contact(&self, id: &str, fields: &ContactFields) -> Result<(), AppError>;

    /// The contact's own appointment history: every calendar, every status.
    async fn list_contact_appointments(
        &self,
        contact_id: &str,
    ) -> Result<Vec<AppointmentEvent>, AppError>;

    /// Every event on one calendar inside the window.
    async fn list_events(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AppointmentEvent>, AppError>;

    /// Per-day free-slot buckets inside the window, untouched.
    async fn list_free_slots(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DaySlots>, AppError>;

    /// Returns the new event id when the platform reports one.
    async fn create_appointment(
        &self,
        appointment: NewAppointment,
    ) -> Result<Option<String>, AppError>;

    async fn update_appointment_status(
        &self,
        id: &str,
        status: AppointmentStatus,
    ) -> Result<(), AppError>;

    /// Update-in-place retarget of one event's start and end.
    async fn reschedule_appointment(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), AppError>;
}

pub struct GhlClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    location_id: String,
    assigned_user_id: Option<String>,
}

impl GhlClient {
    pub fn new(
        api_key: String,
        location_id: String,
        assigned_user_id: Option<String>,
        api_base: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key,
            location_id,
            assigned_user_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        version: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .header("Version", version)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, path, "platform request failed");
                AppError::from(e)
            })?;
        Self::decode(response, path).await
    }

    async fn send_json<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        version: &str,
        body: &B,
    ) -> Result<reqwest::Response, AppError> {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
            .header("Version", version)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, path, "platform request failed");
                AppError::from(e)
            })
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body: GhlErrorBody = response.json().await.unwrap_or_default();
            let message = body.message_text().unwrap_or_else(|| status.to_string());
            error!(%status, path, message = %message, "platform rejected request");
            return Err(AppError::UpstreamRejection {
                status: status.as_u16(),
                message,
            });
        }
        response.json::<T>().await.map_err(|e| {
            error!(error = %e, path, "failed to decode platform response");
            AppError::from(e)
        })
    }

    /// `decode` for calls whose success body we do not use.
    async fn expect_success(response: reqwest::Response, path: &str) -> Result<(), AppError> {
        let status = response.status();
        if !status.is_success() {
            let body: GhlErrorBody = response.json().await.unwrap_or_default();
            let message = body.message_text().unwrap_or_else(|| status.to_string());
            error!(%status, path, message = %message, "platform rejected request");
            return Err(AppError::UpstreamRejection {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    fn upsert_body<'a>(
        &'a self,
        fields: &'a ContactFields,
        include_location: bool,
    ) -> ContactUpsertRequest<'a> {
        ContactUpsertRequest {
            location_id: include_location.then_some(self.location_id.as_str()),
            first_name: fields.first_name.as_deref(),
            last_name: fields.last_name.as_deref(),
            phone: fields.phone.as_deref(),
            email: fields.email.as_deref(),
        }
    }
}

#[async_trait]
impl CrmApi for GhlClient {
    async fn find_contact_by_number(&self, number: &str) -> Result<Option<Contact>, AppError> {
        let envelope: ContactEnvelope = self
            .get_json(
                "/contacts/search/duplicate",
                VERSION_READS,
                &[
                    ("locationId", self.location_id.clone()),
                    ("number", number.to_string()),
                ],
            )
            .await?;
        Ok(envelope.contact.map(Contact::from))
    }

    async fn query_contacts(&self, text: &str) -> Result<Vec<Contact>, AppError> {
        let envelope: ContactListEnvelope = self
            .get_json(
                "/contacts/",
                VERSION_READS,
                &[
                    ("locationId", self.location_id.clone()),
                    ("query", text.to_string()),
                ],
            )
            .await?;
        Ok(envelope.contacts.into_iter().map(Contact::from).collect())
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, AppError> {
        let envelope: ContactEnvelope = self
            .get_json(
                "/contacts/search/duplicate",
                VERSION_READS,
                &[
                    ("locationId", self.location_id.clone()),
                    ("email", email.to_string()),
                ],
            )
            .await?;
        Ok(envelope.contact.map(Contact::from))
    }

    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, AppError> {
        let path = format!("/contacts/{id}");
        let response = self
            .http
            .get(self.url(&path))
            .bearer_auth(&self.api_key)
            .header("Version", VERSION_READS)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, path = %path, "platform request failed");
                AppError::from(e)
            })?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: ContactEnvelope = Self::decode(response, &path).await?;
        Ok(envelope.contact.map(Contact::from))
    }

    async fn create_contact(&self, fields: &ContactFields) -> Result<Contact, AppError> {
        let body = self.upsert_body(fields, true);
        let response = self
            .send_json(Method::POST, "/contacts/", VERSION_READS, &body)
            .await?;
        let envelope: ContactEnvelope = Self::decode(response, "/contacts/").await?;
        let contact = envelope.contact.map(Contact::from).ok_or_else(|| {
            AppError::Internal("platform returned no contact for create".to_string())
        })?;
        debug!(contact = %contact.id, "created directory contact");
        Ok(contact)
    }

    async fn update_contact(&self, id: &str, fields: &ContactFields) -> Result<(), AppError> {
        let path = format!("/contacts/{id}");
        let body = self.upsert_body(fields, false);
        let response = self
            .send_json(Method::PUT, &path, VERSION_READS, &body)
            .await?;
        Self::expect_success(response, &path).await
    }

    async fn list_contact_appointments(
        &self,
        contact_id: &str,
    ) -> Result<Vec<AppointmentEvent>, AppError> {
        let path = format!("/contacts/{contact_id}/appointments");
        let envelope: AppointmentListEnvelope =
            self.get_json(&path, VERSION_READS, &[]).await?;
        let events: Vec<AppointmentEvent> =
            envelope.appointments.iter().filter_map(event_from_value).collect();
        debug!(contact = contact_id, count = events.len(), "listed contact appointments");
        Ok(events)
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AppointmentEvent>, AppError> {
        let envelope: EventListEnvelope = self
            .get_json(
                "/calendars/events",
                VERSION_READS,
                &[
                    ("locationId", self.location_id.clone()),
                    ("calendarId", calendar_id.to_string()),
                    ("startTime", start.timestamp_millis().to_string()),
                    ("endTime", end.timestamp_millis().to_string()),
                ],
            )
            .await?;
        let events: Vec<AppointmentEvent> =
            envelope.events.iter().filter_map(event_from_value).collect();
        debug!(calendar = calendar_id, count = events.len(), "listed calendar events");
        Ok(events)
    }

    async fn list_free_slots(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DaySlots>, AppError> {
        let path = format!("/calendars/{calendar_id}/free-slots");
        let response: FreeSlotsResponse = self
            .get_json(
                &path,
                VERSION_READS,
                &[
                    ("startDate", start.timestamp_millis().to_string()),
                    ("endDate", end.timestamp_millis().to_string()),
                ],
            )
            .await?;
        Ok(response.into_day_slots())
    }

    async fn create_appointment(
        &self,
        appointment: NewAppointment,
    ) -> Result<Option<String>, AppError> {
        let path = "/calendars/events/appointments";
        let body = CreateAppointmentRequest {
            calendar_id: &appointment.calendar_id,
            location_id: &self.location_id,
            contact_id: &appointment.contact_id,
            start_time: to_platform_time(appointment.start),
            end_time: to_platform_time(appointment.end),
            title: &appointment.title,
            // Bookings land on the calendar already confirmed.
            appointment_status: AppointmentStatus::Confirmed,
            assigned_user_id: self.assigned_user_id.as_deref(),
            ignore_free_slot_validation: true,
        };
        let response = self
            .send_json(Method::POST, path, VERSION_APPOINTMENT_WRITES, &body)
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body: GhlErrorBody = response.json().await.unwrap_or_default();
            let message = body.message_text().unwrap_or_else(|| status.to_string());
            error!(%status, path, message = %message, "platform rejected booking");
            return Err(AppError::UpstreamRejection {
                status: status.as_u16(),
                message,
            });
        }
        // A 2xx with an odd body is still a created appointment.
        let created: CreatedAppointment = response.json().await.unwrap_or_default();
        Ok(created.created_id())
    }

    async fn update_appointment_status(
        &self,
        id: &str,
        status: AppointmentStatus,
    ) -> Result<(), AppError> {
        let path = format!("/calendars/events/appointments/{id}");
        let body = AppointmentStatusPatch {
            appointment_status: status,
        };
        let response = self
            .send_json(Method::PUT, &path, VERSION_APPOINTMENT_WRITES, &body)
            .await?;
        Self::expect_success(response, &path).await
    }

    async fn reschedule_appointment(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let path = format!("/calendars/events/appointments/{id}");
        let body = AppointmentTimePatch {
            start_time: to_platform_time(start),
            end_time: to_platform_time(end),
        };
        let response = self
            .send_json(Method::PUT, &path, VERSION_APPOINTMENT_WRITES, &body)
            .await?;
        Self::expect_success(response, &path).await
    }
}
