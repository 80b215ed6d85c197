//! Appointment reconciliation against the platform calendar.
//!
//! The platform offers no transactions, no idempotency tokens and no
//! server-side one-appointment rule, so "a caller holds at most one
//! upcoming appointment" is enforced here: an id-less booking first
//! cancels everything active the contact still holds on the target
//! calendar, then creates exactly one fresh event.  Reconciliation for one
//! caller is serialized behind a per-identity lock; separate processes
//! still race, which this module cannot close.

use crate::availability;
use crate::deep_scan;
use crate::error::AppError;
use crate::ghl::{CrmApi, NewAppointment};
use crate::resolver;
use crate::types::{
    AppointmentEvent, AppointmentStatus, CallCtx, CallerIdentity, ContactFields, IdentityLocks,
};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{info, warn};

/// Every booking occupies one half-hour slot.
pub const APPOINTMENT_MINUTES: i64 = 30;

/// Parse the agent-supplied slot time.  RFC3339 with an offset is the
/// norm; a bare timestamp with no offset is accepted and read as UTC.
pub fn parse_requested_start(raw: &str) -> Result<DateTime<Utc>, AppError> {
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(time.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    Err(AppError::Validation(format!(
        "could not parse date_time '{raw}'"
    )))
}

/// What check_availability reports back about one caller.
pub struct AvailabilityReport {
    pub slots: Vec<String>,
    pub existing: Vec<AppointmentEvent>,
    pub contact_name: Option<String>,
}

/// Slots plus whatever the caller already holds.  Read-only: no contact is
/// created, nothing is cancelled here.
pub async fn check_availability<C: CrmApi>(
    ctx: &CallCtx<'_, C>,
    identity: &CallerIdentity,
) -> Result<AvailabilityReport, AppError> {
    let slots = availability::candidate_slots(ctx).await?;

    let mut existing = Vec::new();
    let mut contact_name = None;
    if identity.phone.is_some() || identity.email.is_some() {
        if let Some(contact) = resolver::resolve(ctx, identity).await {
            contact_name = contact.display_name();
            existing = active_events_for_contact(ctx, &contact.id).await?;
        }
    }

    Ok(AvailabilityReport {
        slots,
        existing,
        contact_name,
    })
}

/// A vetted booking request, identity junk already stripped by the handler.
pub struct BookingRequest {
    pub identity: CallerIdentity,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub start: DateTime<Utc>,
    /// Present on reschedules where the agent already knows the event.
    pub appointment_id: Option<String>,
}

/// What the booking actually did, for logging and tests.
pub struct BookingOutcome {
    pub contact_id: Option<String>,
    pub appointment_id: Option<String>,
    pub cancelled: usize,
    pub rescheduled_in_place: bool,
}

/// Book the requested slot, enforcing one active appointment per caller.
///
/// With an explicit appointment id the target event is retimed in place
/// and nothing else is touched.  Otherwise: resolve-or-create the contact,
/// cancel every active event it holds on the target calendar, then create
/// the new one.  Stale cancellations are individually best-effort -- the
/// create must still run -- but the create itself surfaces any failure.
pub async fn book_appointment<C: CrmApi>(
    ctx: &CallCtx<'_, C>,
    locks: &IdentityLocks,
    request: BookingRequest,
) -> Result<BookingOutcome, AppError> {
    let end = request.start + Duration::minutes(APPOINTMENT_MINUTES);
    let _guard = locks.acquire(&lock_key(&request.identity)).await;

    if let Some(id) = request.appointment_id.as_deref() {
        ctx.crm.reschedule_appointment(id, request.start, end).await?;
        info!(appointment = id, start = %request.start, "rescheduled in place");
        ctx.trace.push(
            ctx.request,
            "reconcile",
            format!("rescheduled {id} in place to {}", request.start),
        );
        return Ok(BookingOutcome {
            contact_id: None,
            appointment_id: Some(id.to_string()),
            cancelled: 0,
            rescheduled_in_place: true,
        });
    }

    let fields = ContactFields {
        first_name: request.first_name.clone(),
        last_name: request.last_name.clone(),
        phone: request.identity.phone.clone(),
        email: request.identity.email.clone(),
    };
    let contact = resolver::resolve_or_create(ctx, &request.identity, &fields).await?;

    let stale = active_events_for_contact(ctx, &contact.id).await?;
    let mut cancelled = 0;
    for event in &stale {
        match ctx
            .crm
            .update_appointment_status(&event.id, AppointmentStatus::Cancelled)
            .await
        {
            Ok(()) => {
                cancelled += 1;
                ctx.trace.push(
                    ctx.request,
                    "reconcile",
                    format!("cancelled stale event {}", event.id),
                );
            }
            Err(e) => {
                warn!(event = %event.id, error = %e, "stale cancellation failed");
                ctx.trace.push(
                    ctx.request,
                    "reconcile",
                    format!("cancel of {} failed: {e}", event.id),
                );
            }
        }
    }

    let created = ctx
        .crm
        .create_appointment(NewAppointment {
            calendar_id: ctx.calendar_id.to_string(),
            contact_id: contact.id.clone(),
            title: booking_title(request.first_name.as_deref()),
            start: request.start,
            end,
        })
        .await?;
    info!(contact = %contact.id, start = %request.start, cancelled, "booked appointment");
    ctx.trace.push(
        ctx.request,
        "reconcile",
        format!("created appointment for contact {} at {}", contact.id, request.start),
    );

    Ok(BookingOutcome {
        contact_id: Some(contact.id),
        appointment_id: created,
        cancelled,
        rescheduled_in_place: false,
    })
}

/// How a cancellation found its target.
pub struct CancelOutcome {
    pub appointment_id: String,
    pub via: &'static str,
}

/// Cancel the caller's upcoming appointment.
///
/// An explicit id is trusted and cancelled directly, with no resolution
/// machinery at all.  Otherwise the caller's contact history is tried
/// first, then the deep scan.  The decisive status write always surfaces
/// its failure.
pub async fn cancel_appointment<C: CrmApi>(
    ctx: &CallCtx<'_, C>,
    locks: &IdentityLocks,
    explicit_id: Option<&str>,
    identity: &CallerIdentity,
) -> Result<CancelOutcome, AppError> {
    if let Some(id) = explicit_id {
        ctx.crm
            .update_appointment_status(id, AppointmentStatus::Cancelled)
            .await?;
        info!(appointment = id, "cancelled by explicit id");
        ctx.trace.push(
            ctx.request,
            "reconcile",
            format!("cancelled {id} by explicit id"),
        );
        return Ok(CancelOutcome {
            appointment_id: id.to_string(),
            via: "explicit_id",
        });
    }

    let Some(normalized) = identity.normalized_phone() else {
        return Err(AppError::Validation(
            "appointment_id or a usable phone number is required to cancel".to_string(),
        ));
    };
    let _guard = locks.acquire(&lock_key(identity)).await;

    if let Some(contact) = resolver::resolve(ctx, identity).await {
        match active_events_for_contact(ctx, &contact.id).await {
            Ok(events) => {
                if let Some(event) = events.into_iter().next() {
                    ctx.crm
                        .update_appointment_status(&event.id, AppointmentStatus::Cancelled)
                        .await?;
                    info!(appointment = %event.id, contact = %contact.id, "cancelled via contact history");
                    ctx.trace.push(
                        ctx.request,
                        "reconcile",
                        format!("cancelled {} via contact history", event.id),
                    );
                    return Ok(CancelOutcome {
                        appointment_id: event.id,
                        via: "contact_history",
                    });
                }
            }
            Err(e) => {
                // History unavailable is a miss, not a dead end; the deep
                // scan can still find the event.
                warn!(contact = %contact.id, error = %e, "history lookup failed, deep scanning");
                ctx.trace.push(
                    ctx.request,
                    "reconcile",
                    format!("history lookup for {} failed: {e}", contact.id),
                );
            }
        }
    }

    if let Some(event) = deep_scan::find_event_by_phone(ctx, &normalized).await {
        ctx.crm
            .update_appointment_status(&event.id, AppointmentStatus::Cancelled)
            .await?;
        info!(appointment = %event.id, "cancelled via deep scan");
        ctx.trace.push(
            ctx.request,
            "reconcile",
            format!("cancelled {} via deep scan", event.id),
        );
        return Ok(CancelOutcome {
            appointment_id: event.id,
            via: "deep_scan",
        });
    }

    ctx.trace
        .push(ctx.request, "reconcile", "cancel found no appointment");
    Err(AppError::NotFound(
        "no upcoming appointment found for this caller".to_string(),
    ))
}

/// The contact's active events on the target calendar, soonest first.
pub async fn active_events_for_contact<C: CrmApi>(
    ctx: &CallCtx<'_, C>,
    contact_id: &str,
) -> Result<Vec<AppointmentEvent>, AppError> {
    let mut events: Vec<AppointmentEvent> = ctx
        .crm
        .list_contact_appointments(contact_id)
        .await?
        .into_iter()
        .filter(|event| event.on_calendar(ctx.calendar_id) && event.is_active_at(ctx.now))
        .collect();
    events.sort_by_key(|event| event.start_time);
    Ok(events)
}

fn booking_title(first_name: Option<&str>) -> String {
    match first_name {
        Some(name) if !name.trim().is_empty() => format!("Voice AI Booking: {name}"),
        _ => "Voice AI Booking".to_string(),
    }
}

/// Reconciliation serializes on the strongest identity key available.
fn lock_key(identity: &CallerIdentity) -> String {
    if let Some(digits) = identity.normalized_phone() {
        return format!("phone:{digits}");
    }
    if let Some(email) = identity.email.as_deref() {
        return format!("email:{}", email.to_lowercase());
    }
    // No identity at all: serialize globally rather than not at all.
    "anonymous".to_string()
}
