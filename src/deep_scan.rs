//! Last-resort caller lookup by scanning the calendar itself.
//!
//! Directory searches have blind spots: numbers buried in event notes,
//! contacts stored under a formatting variant the duplicate search will
//! not match.  When the resolver and the contact's own history both come
//! up empty, walk every event on the target calendar inside the scan
//! window and look for the caller's digits -- first as a substring of the
//! serialized event record, then by dereferencing the event's contact and
//! comparing normalized phones.
//!
//! Cost is one event listing plus at worst one contact fetch per active
//! event.  The window bounds it; this path is a correctness net, not a
//! volume path.

use crate::ghl::CrmApi;
use crate::identity::normalize_phone;
use crate::types::{AppointmentEvent, CallCtx};

use chrono::Duration;
use tracing::{debug, warn};

/// How far ahead the scan looks for the caller's appointment.
pub const SCAN_WINDOW_DAYS: i64 = 30;

/// Find the caller's next active event by brute force, or nothing.
///
/// Every failure in here downgrades to "not found": by the time the deep
/// scan runs the caller already failed cheaper lookups, and an error now
/// would turn a recoverable miss into a dead webhook.
pub async fn find_event_by_phone<C: CrmApi>(
    ctx: &CallCtx<'_, C>,
    normalized_phone: &str,
) -> Option<AppointmentEvent> {
    let window_end = ctx.now + Duration::days(SCAN_WINDOW_DAYS);
    let events = match ctx.crm.list_events(ctx.calendar_id, ctx.now, window_end).await {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "deep scan could not list events");
            ctx.trace
                .push(ctx.request, "deep_scan", format!("event listing failed: {e}"));
            return None;
        }
    };
    debug!(count = events.len(), "deep scanning calendar events");
    ctx.trace.push(
        ctx.request,
        "deep_scan",
        format!("scanning {} events for {normalized_phone}", events.len()),
    );

    for event in events {
        if !event.is_active_at(ctx.now) {
            continue;
        }
        if event.search_text.contains(normalized_phone) {
            ctx.trace.push(
                ctx.request,
                "deep_scan",
                format!("digit containment matched event {}", event.id),
            );
            return Some(event);
        }
        let Some(contact_id) = event.contact_id.clone() else {
            continue;
        };
        match ctx.crm.get_contact(&contact_id).await {
            Ok(Some(contact)) => {
                let contact_digits = contact.phone.as_deref().and_then(normalize_phone);
                if contact_digits.as_deref() == Some(normalized_phone) {
                    ctx.trace.push(
                        ctx.request,
                        "deep_scan",
                        format!("contact dereference matched event {}", event.id),
                    );
                    return Some(event);
                }
            }
            Ok(None) => {}
            Err(e) => {
                // One bad dereference must not kill the rest of the scan.
                warn!(contact = %contact_id, error = %e, "contact dereference failed");
                ctx.trace.push(
                    ctx.request,
                    "deep_scan",
                    format!("dereference of {contact_id} failed: {e}"),
                );
            }
        }
    }

    ctx.trace
        .push(ctx.request, "deep_scan", "no event matched");
    None
}
