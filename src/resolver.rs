//! Multi-strategy contact resolution against the directory.
//!
//! The directory has no unique-key lookup, only assorted searches with
//! different blind spots: duplicate search wants the exact stored format,
//! the free-text query tokenizes, and email is rarely supplied on a voice
//! call.  Resolution therefore walks an explicit ordered ladder and takes
//! the first hit.  A strategy failing over the network is a trace entry,
//! not an error: caller-not-found must stay distinguishable from
//! system-broken, and the next rung often finds the contact anyway.

use crate::error::AppError;
use crate::ghl::CrmApi;
use crate::types::{CallCtx, CallerIdentity, Contact, ContactFields};

use tracing::{debug, warn};

/// One rung of the resolution ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Duplicate search on the raw phone text (E.164 and friends).  Only
    /// worth a round trip when the raw form differs from the normalized one.
    RawPhone(String),
    /// Duplicate search on the ten-digit comparison key.
    NormalizedPhone(String),
    /// Free-text query on the digits; broadest net, first candidate taken.
    QueryByDigits(String),
    /// Exact email search, last because email is the least reliably
    /// captured field on a call.
    Email(String),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::RawPhone(_) => "raw_phone",
            Strategy::NormalizedPhone(_) => "normalized_phone",
            Strategy::QueryByDigits(_) => "query_digits",
            Strategy::Email(_) => "email",
        }
    }

    async fn run<C: CrmApi>(&self, crm: &C) -> Result<Option<Contact>, AppError> {
        match self {
            Strategy::RawPhone(raw) => crm.find_contact_by_number(raw).await,
            Strategy::NormalizedPhone(digits) => crm.find_contact_by_number(digits).await,
            Strategy::QueryByDigits(digits) => {
                Ok(crm.query_contacts(digits).await?.into_iter().next())
            }
            Strategy::Email(email) => crm.find_contact_by_email(email).await,
        }
    }
}

/// The ladder for one caller identity.  Inapplicable rungs are omitted
/// here rather than skipped at run time, so the plan itself is testable.
pub fn strategy_plan(identity: &CallerIdentity) -> Vec<Strategy> {
    let mut plan = Vec::new();
    let normalized = identity.normalized_phone();
    if let (Some(raw), Some(digits)) = (identity.phone.as_deref(), normalized.as_deref()) {
        if raw != digits {
            plan.push(Strategy::RawPhone(raw.to_string()));
        }
    }
    if let Some(digits) = normalized {
        plan.push(Strategy::NormalizedPhone(digits.clone()));
        plan.push(Strategy::QueryByDigits(digits));
    }
    if let Some(email) = identity.email.as_deref() {
        plan.push(Strategy::Email(email.to_string()));
    }
    plan
}

/// Resolve a caller to at most one directory contact.
///
/// First hit wins and later rungs never run.  Exhausting the ladder is
/// `None` -- an expected outcome, not a failure.
pub async fn resolve<C: CrmApi>(
    ctx: &CallCtx<'_, C>,
    identity: &CallerIdentity,
) -> Option<Contact> {
    for strategy in strategy_plan(identity) {
        match strategy.run(ctx.crm).await {
            Ok(Some(contact)) => {
                debug!(strategy = strategy.name(), contact = %contact.id, "resolved caller");
                ctx.trace.push(
                    ctx.request,
                    "resolver",
                    format!("{} matched contact {}", strategy.name(), contact.id),
                );
                return Some(contact);
            }
            Ok(None) => {
                ctx.trace.push(
                    ctx.request,
                    "resolver",
                    format!("{} found nothing", strategy.name()),
                );
            }
            Err(e) => {
                // A broken search is this rung's problem only.
                warn!(strategy = strategy.name(), error = %e, "strategy failed, trying next");
                ctx.trace.push(
                    ctx.request,
                    "resolver",
                    format!("{} failed: {e}", strategy.name()),
                );
            }
        }
    }
    None
}

/// Resolve the caller, refreshing stored attributes on a hit, or create a
/// fresh contact from what the call supplied.
///
/// The attribute refresh is best-effort: a booking must not die because a
/// cosmetic name update was rejected.  Creation failures do surface, since
/// without a contact there is nothing to book against.
pub async fn resolve_or_create<C: CrmApi>(
    ctx: &CallCtx<'_, C>,
    identity: &CallerIdentity,
    fields: &ContactFields,
) -> Result<Contact, AppError> {
    if let Some(contact) = resolve(ctx, identity).await {
        if let Err(e) = ctx.crm.update_contact(&contact.id, fields).await {
            warn!(contact = %contact.id, error = %e, "attribute refresh failed");
            ctx.trace.push(
                ctx.request,
                "resolver",
                format!("attribute refresh of {} failed: {e}", contact.id),
            );
        }
        return Ok(contact);
    }
    let created = ctx.crm.create_contact(fields).await?;
    debug!(contact = %created.id, "created contact for caller");
    ctx.trace.push(
        ctx.request,
        "resolver",
        format!("created contact {}", created.id),
    );
    Ok(created)
}
