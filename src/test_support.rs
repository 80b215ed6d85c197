//! In-memory stand-in for the scheduling platform, with call recording and
//! per-method failure injection.

use crate::error::AppError;
use crate::ghl::{CrmApi, NewAppointment};
use crate::identity::normalize_phone;
use crate::trace::DebugTrace;
use crate::types::{
    AppointmentEvent, AppointmentStatus, CallCtx, Contact, ContactFields, DaySlots,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub const TEST_CALENDAR: &str = "cal_main";

/// The instant every test agrees is "now".
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 20, 12, 0, 0).unwrap()
}

pub fn test_ctx<'a>(crm: &'a FakeCrm, trace: &'a DebugTrace) -> CallCtx<'a, FakeCrm> {
    CallCtx {
        crm,
        trace,
        request: Uuid::new_v4(),
        calendar_id: TEST_CALENDAR,
        now: fixed_now(),
    }
}

pub fn make_event(
    id: &str,
    contact_id: Option<&str>,
    calendar_id: &str,
    status: AppointmentStatus,
    start: DateTime<Utc>,
) -> AppointmentEvent {
    let search_text = serde_json::json!({
        "id": id,
        "contactId": contact_id,
        "calendarId": calendar_id,
        "startTime": start.to_rfc3339(),
    })
    .to_string();
    AppointmentEvent {
        id: id.to_string(),
        contact_id: contact_id.map(String::from),
        calendar_id: Some(calendar_id.to_string()),
        title: None,
        status,
        start_time: Some(start),
        end_time: Some(start + chrono::Duration::minutes(30)),
        search_text,
    }
}

pub struct FakeCrm {
    contacts: Mutex<Vec<Contact>>,
    events: Mutex<Vec<AppointmentEvent>>,
    free_slots: Mutex<Vec<DaySlots>>,
    /// Contact ids the duplicate search pretends not to know about.
    hidden_from_number_search: Mutex<HashSet<String>>,
    /// "method" or "method:arg" keys forced to fail.
    failures: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeCrm {
    pub fn new() -> Self {
        Self {
            contacts: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            free_slots: Mutex::new(Vec::new()),
            hidden_from_number_search: Mutex::new(HashSet::new()),
            failures: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn add_contact(
        &self,
        id: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        phone: Option<&str>,
        email: Option<&str>,
    ) {
        self.contacts.lock().unwrap().push(Contact {
            id: id.to_string(),
            first_name: first_name.map(String::from),
            last_name: last_name.map(String::from),
            phone: phone.map(String::from),
            email: email.map(String::from),
        });
    }

    pub fn add_event(&self, event: AppointmentEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn set_free_slots(&self, days: Vec<DaySlots>) {
        *self.free_slots.lock().unwrap() = days;
    }

    pub fn hide_from_number_search(&self, contact_id: &str) {
        self.hidden_from_number_search
            .lock()
            .unwrap()
            .insert(contact_id.to_string());
    }

    pub fn fail_method(&self, key: &str) {
        self.failures.lock().unwrap().insert(key.to_string());
    }

    pub fn called(&self, method: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|m| m == method)
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.lock().unwrap().len()
    }

    pub fn contact(&self, id: &str) -> Option<Contact> {
        self.contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn events_snapshot(&self) -> Vec<AppointmentEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event(&self, id: &str) -> Option<AppointmentEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn event_status(&self, id: &str) -> Option<AppointmentStatus> {
        self.event(id).map(|e| e.status)
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }

    fn check_failure(&self, method: &str, arg: Option<&str>) -> Result<(), AppError> {
        let failures = self.failures.lock().unwrap();
        let keyed = arg.map(|a| format!("{method}:{a}"));
        if failures.contains(method) || keyed.map_or(false, |k| failures.contains(&k)) {
            return Err(AppError::UpstreamRejection {
                status: 502,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for FakeCrm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrmApi for FakeCrm {
    async fn find_contact_by_number(&self, number: &str) -> Result<Option<Contact>, AppError> {
        self.record("find_contact_by_number");
        self.check_failure("find_contact_by_number", Some(number))?;
        let wanted = normalize_phone(number);
        if wanted.is_none() {
            return Ok(None);
        }
        let hidden = self.hidden_from_number_search.lock().unwrap();
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| {
                !hidden.contains(&c.id)
                    && c.phone.as_deref().and_then(normalize_phone) == wanted
            })
            .cloned())
    }

    async fn query_contacts(&self, text: &str) -> Result<Vec<Contact>, AppError> {
        self.record("query_contacts");
        self.check_failure("query_contacts", Some(text))?;
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                let digits = c.phone.as_deref().and_then(normalize_phone);
                digits.map_or(false, |d| d.contains(text))
                    || c.first_name.as_deref().map_or(false, |n| n.contains(text))
                    || c.last_name.as_deref().map_or(false, |n| n.contains(text))
            })
            .cloned()
            .collect())
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, AppError> {
        self.record("find_contact_by_email");
        self.check_failure("find_contact_by_email", Some(email))?;
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| {
                c.email
                    .as_deref()
                    .map_or(false, |e| e.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    async fn get_contact(&self, id: &str) -> Result<Option<Contact>, AppError> {
        self.record("get_contact");
        self.check_failure("get_contact", Some(id))?;
        Ok(self.contact(id))
    }

    async fn create_contact(&self, fields: &ContactFields) -> Result<Contact, AppError> {
        self.record("create_contact");
        self.check_failure("create_contact", None)?;
        let contact = Contact {
            id: self.fresh_id("contact"),
            first_name: fields.first_name.clone(),
            last_name: fields.last_name.clone(),
            phone: fields.phone.clone(),
            email: fields.email.clone(),
        };
        self.contacts.lock().unwrap().push(contact.clone());
        Ok(contact)
    }

    async fn update_contact(&self, id: &str, fields: &ContactFields) -> Result<(), AppError> {
        self.record("update_contact");
        self.check_failure("update_contact", Some(id))?;
        let mut contacts = self.contacts.lock().unwrap();
        if let Some(contact) = contacts.iter_mut().find(|c| c.id == id) {
            if fields.first_name.is_some() {
                contact.first_name = fields.first_name.clone();
            }
            if fields.last_name.is_some() {
                contact.last_name = fields.last_name.clone();
            }
            if fields.phone.is_some() {
                contact.phone = fields.phone.clone();
            }
            if fields.email.is_some() {
                contact.email = fields.email.clone();
            }
        }
        Ok(())
    }

    async fn list_contact_appointments(
        &self,
        contact_id: &str,
    ) -> Result<Vec<AppointmentEvent>, AppError> {
        self.record("list_contact_appointments");
        self.check_failure("list_contact_appointments", Some(contact_id))?;
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.contact_id.as_deref() == Some(contact_id))
            .cloned()
            .collect())
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<AppointmentEvent>, AppError> {
        self.record("list_events");
        self.check_failure("list_events", Some(calendar_id))?;
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.calendar_id.as_deref() == Some(calendar_id))
            .cloned()
            .collect())
    }

    async fn list_free_slots(
        &self,
        calendar_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<DaySlots>, AppError> {
        self.record("list_free_slots");
        self.check_failure("list_free_slots", Some(calendar_id))?;
        Ok(self.free_slots.lock().unwrap().clone())
    }

    async fn create_appointment(
        &self,
        appointment: NewAppointment,
    ) -> Result<Option<String>, AppError> {
        self.record("create_appointment");
        self.check_failure("create_appointment", None)?;
        let id = self.fresh_id("evt");
        let search_text = serde_json::json!({
            "id": id,
            "contactId": appointment.contact_id,
            "calendarId": appointment.calendar_id,
            "title": appointment.title,
            "startTime": appointment.start.to_rfc3339(),
        })
        .to_string();
        self.events.lock().unwrap().push(AppointmentEvent {
            id: id.clone(),
            contact_id: Some(appointment.contact_id),
            calendar_id: Some(appointment.calendar_id),
            title: Some(appointment.title),
            status: AppointmentStatus::Confirmed,
            start_time: Some(appointment.start),
            end_time: Some(appointment.end),
            search_text,
        });
        Ok(Some(id))
    }

    async fn update_appointment_status(
        &self,
        id: &str,
        status: AppointmentStatus,
    ) -> Result<(), AppError> {
        self.record("update_appointment_status");
        self.check_failure("update_appointment_status", Some(id))?;
        let mut events = self.events.lock().unwrap();
        match events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                event.status = status;
                Ok(())
            }
            None => Err(AppError::UpstreamRejection {
                status: 404,
                message: "The event was not found".to_string(),
            }),
        }
    }

    async fn reschedule_appointment(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.record("reschedule_appointment");
        self.check_failure("reschedule_appointment", Some(id))?;
        let mut events = self.events.lock().unwrap();
        match events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                event.start_time = Some(start);
                event.end_time = Some(end);
                Ok(())
            }
            None => Err(AppError::UpstreamRejection {
                status: 404,
                message: "The event was not found".to_string(),
            }),
        }
    }
}
