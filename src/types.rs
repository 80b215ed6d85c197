use crate::ghl::GhlClient;
use crate::identity::normalize_phone;
use crate::trace::DebugTrace;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct AppState {
    pub crm: GhlClient,
    pub calendar_id: String,
    pub trace: DebugTrace,
    pub booking_locks: IdentityLocks,
}

impl AppState {
    /// One request's frame of reference.  `now` is sampled exactly once so
    /// every Active check inside the request agrees on what "future" means.
    pub fn call_ctx(&self) -> CallCtx<'_, GhlClient> {
        CallCtx {
            crm: &self.crm,
            trace: &self.trace,
            request: Uuid::new_v4(),
            calendar_id: &self.calendar_id,
            now: Utc::now(),
        }
    }
}

/// Everything an operation needs to talk to the scheduling platform on
/// behalf of one inbound webhook.
pub struct CallCtx<'a, C> {
    pub crm: &'a C,
    pub trace: &'a DebugTrace,
    /// Correlates trace entries and log lines for this webhook.
    pub request: Uuid,
    pub calendar_id: &'a str,
    pub now: DateTime<Utc>,
}

/// Per-identity serialization of appointment reconciliation.  Two webhooks
/// for the same caller interleaving their cancel-then-create sequences can
/// leave zero or two active appointments, so each identity key gets its own
/// async mutex, held across the whole sequence.
pub struct IdentityLocks {
    // identity key => lock shared by all requests for that caller
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for IdentityLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Who is on the phone, as far as this request can tell.  Held for the
/// duration of one webhook and never persisted locally.
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity {
    /// Raw phone text as supplied; normalization happens at comparison time.
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl CallerIdentity {
    pub fn normalized_phone(&self) -> Option<String> {
        self.phone.as_deref().and_then(normalize_phone)
    }
}

/// A directory contact, already normalized out of the platform's wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Contact {
    pub fn display_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => None,
        }
    }
}

/// Contact attributes we are willing to write back to the directory.
#[derive(Debug, Clone, Default)]
pub struct ContactFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// One event on the platform calendar.
#[derive(Debug, Clone)]
pub struct AppointmentEvent {
    pub id: String,
    pub contact_id: Option<String>,
    pub calendar_id: Option<String>,
    pub title: Option<String>,
    pub status: AppointmentStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// The full serialized platform record this event was parsed from.  The
    /// deep scan searches it for caller digits buried in fields we do not
    /// model (notes, nested contact snapshots).
    pub search_text: String,
}

impl AppointmentEvent {
    /// Active means still in a bookable state and strictly in the future.
    /// Events with no parseable start time never count as active.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.start_time.map(|t| t > now).unwrap_or(false)
    }

    pub fn on_calendar(&self, calendar_id: &str) -> bool {
        self.calendar_id.as_deref() == Some(calendar_id)
    }
}

/// Platform appointment lifecycle states.  Anything unrecognized lands on
/// `Unknown` rather than failing the whole event list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    New,
    Booked,
    Confirmed,
    Cancelled,
    Showed,
    NoShow,
    Invalid,
    #[serde(other)]
    Unknown,
}

impl AppointmentStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::New | Self::Booked | Self::Confirmed)
    }
}

/// One day's bucket of free slots, each kept as the exact string the
/// platform reported so the agent re-submits what it was offered.
#[derive(Debug, Clone)]
pub struct DaySlots {
    pub date: String,
    pub slots: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_with(status: AppointmentStatus, start: Option<DateTime<Utc>>) -> AppointmentEvent {
        AppointmentEvent {
            id: "evt_1".to_string(),
            contact_id: None,
            calendar_id: Some("cal_1".to_string()),
            title: None,
            status,
            start_time: start,
            end_time: None,
            search_text: String::new(),
        }
    }

    #[test]
    fn active_requires_future_start_and_live_status() {
        let now = Utc.with_ymd_and_hms(2026, 2, 20, 12, 0, 0).unwrap();
        let future = Some(now + chrono::Duration::hours(2));
        let past = Some(now - chrono::Duration::hours(2));

        assert!(event_with(AppointmentStatus::Confirmed, future).is_active_at(now));
        assert!(event_with(AppointmentStatus::New, future).is_active_at(now));
        assert!(event_with(AppointmentStatus::Booked, future).is_active_at(now));
        assert!(!event_with(AppointmentStatus::Cancelled, future).is_active_at(now));
        assert!(!event_with(AppointmentStatus::Showed, future).is_active_at(now));
        assert!(!event_with(AppointmentStatus::Confirmed, past).is_active_at(now));
        assert!(!event_with(AppointmentStatus::Confirmed, None).is_active_at(now));
    }

    #[test]
    fn start_exactly_now_is_not_active() {
        let now = Utc.with_ymd_and_hms(2026, 2, 20, 12, 0, 0).unwrap();
        assert!(!event_with(AppointmentStatus::Confirmed, Some(now)).is_active_at(now));
    }

    #[test]
    fn display_name_joins_available_parts() {
        let mut contact = Contact {
            id: "c1".to_string(),
            first_name: Some("Pat".to_string()),
            last_name: Some("Lee".to_string()),
            phone: None,
            email: None,
        };
        assert_eq!(contact.display_name().as_deref(), Some("Pat Lee"));
        contact.last_name = None;
        assert_eq!(contact.display_name().as_deref(), Some("Pat"));
        contact.first_name = None;
        assert_eq!(contact.display_name(), None);
    }

    #[tokio::test]
    async fn identity_locks_serialize_same_key() {
        let locks = Arc::new(IdentityLocks::new());
        let guard = locks.acquire("phone:5551234567").await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("phone:5551234567").await;
            })
        };
        // The contender cannot finish while the first guard is held.
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }
}
