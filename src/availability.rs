//! Bookable-slot computation for the voice agent.
//!
//! The platform reports per-day slot buckets; the agent wants a short flat
//! list it can read out loud.  Flatten the buckets, drop anything the
//! caller could not realistically reach, cap the count, and never reformat
//! the slot strings -- the agent re-submits exactly what it was offered.

use crate::error::AppError;
use crate::ghl::CrmApi;
use crate::ghl_types::parse_platform_time;
use crate::types::{CallCtx, DaySlots};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

/// How far ahead slots are offered.
pub const LOOKAHEAD_DAYS: i64 = 7;
/// Slots starting within this buffer are unreachable by someone currently
/// on the phone.
pub const NEAR_TERM_BUFFER_MINUTES: i64 = 60;
/// The agent reads at most this many options.
pub const MAX_OFFERED_SLOTS: usize = 5;

/// Fetch, flatten and filter the platform's free slots for the window
/// starting now.
pub async fn candidate_slots<C: CrmApi>(ctx: &CallCtx<'_, C>) -> Result<Vec<String>, AppError> {
    let window_end = ctx.now + Duration::days(LOOKAHEAD_DAYS);
    let days = ctx
        .crm
        .list_free_slots(ctx.calendar_id, ctx.now, window_end)
        .await?;
    let slots = filter_slots(days, ctx.now);
    debug!(offered = slots.len(), "computed candidate slots");
    Ok(slots)
}

/// Pure filtering core.  The near-term buffer is strict: a slot exactly on
/// the cutoff is excluded, one second past it is offered.
pub fn filter_slots(days: Vec<DaySlots>, now: DateTime<Utc>) -> Vec<String> {
    let cutoff = now + Duration::minutes(NEAR_TERM_BUFFER_MINUTES);
    days.into_iter()
        .flat_map(|day| day.slots)
        .filter(|slot| match parse_platform_time(slot) {
            Some(start) => start > cutoff,
            None => {
                warn!(slot = %slot, "discarding unparseable slot");
                false
            }
        })
        .take(MAX_OFFERED_SLOTS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixed_now, test_ctx, FakeCrm};
    use crate::trace::DebugTrace;
    use chrono::SecondsFormat;

    fn day(date: &str, slots: &[String]) -> DaySlots {
        DaySlots {
            date: date.to_string(),
            slots: slots.to_vec(),
        }
    }

    fn slot_at(offset: Duration) -> String {
        (fixed_now() + offset).to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    #[test]
    fn buffer_boundary_is_strict() {
        let exactly_on_cutoff = slot_at(Duration::minutes(60));
        let one_second_past = slot_at(Duration::minutes(60) + Duration::seconds(1));
        let days = vec![day(
            "2026-02-20",
            &[exactly_on_cutoff, one_second_past.clone()],
        )];

        assert_eq!(filter_slots(days, fixed_now()), vec![one_second_past]);
    }

    #[test]
    fn output_is_capped_and_in_day_order() {
        let early: Vec<String> = (0..4)
            .map(|i| slot_at(Duration::hours(2) + Duration::minutes(30 * i)))
            .collect();
        let later: Vec<String> = (0..4)
            .map(|i| slot_at(Duration::days(1) + Duration::minutes(30 * i)))
            .collect();
        let days = vec![day("2026-02-20", &early), day("2026-02-21", &later)];

        let offered = filter_slots(days, fixed_now());
        assert_eq!(offered.len(), MAX_OFFERED_SLOTS);
        assert_eq!(&offered[..4], &early[..]);
        assert_eq!(offered[4], later[0]);
    }

    #[test]
    fn slot_strings_pass_through_unmodified() {
        // Venue-local offset format, exactly as the platform sends it.
        let days = vec![day("2026-02-27", &["2026-02-27T10:00:00-05:00".to_string()])];
        let offered = filter_slots(days, fixed_now());
        assert_eq!(offered, vec!["2026-02-27T10:00:00-05:00"]);
    }

    #[test]
    fn unparseable_slots_are_dropped() {
        let good = slot_at(Duration::hours(3));
        let days = vec![day(
            "2026-02-20",
            &["not a time".to_string(), good.clone()],
        )];
        assert_eq!(filter_slots(days, fixed_now()), vec![good]);
    }

    #[test]
    fn no_slots_is_an_empty_list() {
        assert!(filter_slots(Vec::new(), fixed_now()).is_empty());
        let days = vec![day("2026-02-20", &[])];
        assert!(filter_slots(days, fixed_now()).is_empty());
    }

    #[tokio::test]
    async fn candidate_slots_pull_from_the_platform_window() {
        let crm = FakeCrm::new();
        let reachable = slot_at(Duration::hours(26));
        crm.set_free_slots(vec![
            day("2026-02-20", &[slot_at(Duration::minutes(10))]),
            day("2026-02-21", &[reachable.clone()]),
        ]);
        let trace = DebugTrace::new();
        let ctx = test_ctx(&crm, &trace);

        let offered = candidate_slots(&ctx).await.unwrap();
        assert_eq!(offered, vec![reachable]);
        assert!(crm.called("list_free_slots"));
    }
}
