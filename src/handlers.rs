use crate::error::AppError;
use crate::ghl::CrmApi;
use crate::identity::{resolve_caller_phone, sanitize_field};
use crate::reconcile::{self, BookingRequest};
use crate::resolver;
use crate::retell_types::{
    AvailabilityResponse, BookAppointmentArgs, CancelAppointmentArgs, CheckAvailabilityArgs,
    ContactInfoArgs, ContactInfoResponse, ExistingAppointment, StatusResponse, ToolCall,
    UpdateContactArgs,
};
use crate::trace::TraceEntry;
use crate::types::{AppState, CallerIdentity, ContactFields};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tracing::{debug, info};

pub async fn check_availability(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ToolCall<CheckAvailabilityArgs>>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let ctx = app_state.call_ctx();
    debug!(request = %ctx.request, "check_availability webhook");

    let identity = CallerIdentity {
        phone: resolve_caller_phone(payload.args.phone.as_ref(), payload.call.as_ref()),
        email: sanitize_field(payload.args.email),
    };
    let report = reconcile::check_availability(&ctx, &identity)
        .await
        .map_err(|e| {
            ctx.trace
                .push(ctx.request, "check_availability", format!("failed: {e}"));
            e.sync_failure("GHL sync failed")
        })?;

    Ok(Json(AvailabilityResponse {
        available_slots: report.slots,
        existing_appointments: report
            .existing
            .iter()
            .map(ExistingAppointment::from_event)
            .collect(),
        contact_name: report.contact_name,
    }))
}

pub async fn book_appointment(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ToolCall<BookAppointmentArgs>>,
) -> Result<Json<StatusResponse>, AppError> {
    let ctx = app_state.call_ctx();
    info!(request = %ctx.request, "book_appointment webhook");

    let args = payload.args;
    let Some(date_time) = sanitize_field(args.date_time) else {
        return Err(AppError::Validation("date_time is required".to_string()));
    };
    let start = reconcile::parse_requested_start(&date_time)?;

    let identity = CallerIdentity {
        phone: resolve_caller_phone(args.phone.as_ref(), payload.call.as_ref()),
        email: sanitize_field(args.email),
    };
    let outcome = reconcile::book_appointment(
        &ctx,
        &app_state.booking_locks,
        BookingRequest {
            identity,
            first_name: sanitize_field(args.first_name),
            last_name: sanitize_field(args.last_name),
            start,
            appointment_id: sanitize_field(args.appointment_id),
        },
    )
    .await
    .map_err(|e| {
        ctx.trace
            .push(ctx.request, "book_appointment", format!("failed: {e}"));
        e
    })?;
    info!(
        request = %ctx.request,
        cancelled = outcome.cancelled,
        rescheduled = outcome.rescheduled_in_place,
        "booking complete"
    );

    Ok(Json(StatusResponse {
        status: "success",
        message: Some("Appointment confirmed!"),
    }))
}

pub async fn cancel_appointment(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ToolCall<CancelAppointmentArgs>>,
) -> Result<Json<StatusResponse>, AppError> {
    let ctx = app_state.call_ctx();
    info!(request = %ctx.request, "cancel_appointment webhook");

    let explicit_id = sanitize_field(payload.args.appointment_id);
    let identity = CallerIdentity {
        phone: resolve_caller_phone(payload.args.phone.as_ref(), payload.call.as_ref()),
        email: None,
    };
    if explicit_id.is_none() && identity.phone.is_none() {
        return Err(AppError::Validation(
            "appointment_id or phone is required to cancel".to_string(),
        ));
    }
    let outcome = reconcile::cancel_appointment(
        &ctx,
        &app_state.booking_locks,
        explicit_id.as_deref(),
        &identity,
    )
    .await
    .map_err(|e| {
        ctx.trace
            .push(ctx.request, "cancel_appointment", format!("failed: {e}"));
        e
    })?;
    info!(
        request = %ctx.request,
        appointment = %outcome.appointment_id,
        via = outcome.via,
        "cancellation complete"
    );

    Ok(Json(StatusResponse {
        status: "success",
        message: Some("Appointment cancelled."),
    }))
}

pub async fn get_contact_info(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ToolCall<ContactInfoArgs>>,
) -> Result<Json<ContactInfoResponse>, AppError> {
    let ctx = app_state.call_ctx();
    debug!(request = %ctx.request, "get_contact_info webhook");

    let Some(phone) = resolve_caller_phone(payload.args.phone.as_ref(), payload.call.as_ref())
    else {
        return Err(AppError::Validation(
            "no caller phone available".to_string(),
        ));
    };
    let identity = CallerIdentity {
        phone: Some(phone),
        email: None,
    };
    // An unmatched caller is a normal answer here, not an error.
    match resolver::resolve(&ctx, &identity).await {
        Some(contact) => Ok(Json(ContactInfoResponse {
            found: true,
            name: contact.display_name(),
            contact_id: Some(contact.id),
            phone: contact.phone,
            email: contact.email,
        })),
        None => Ok(Json(ContactInfoResponse::default())),
    }
}

pub async fn update_contact_info(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ToolCall<UpdateContactArgs>>,
) -> Result<Json<StatusResponse>, AppError> {
    let ctx = app_state.call_ctx();
    info!(request = %ctx.request, "update_contact_info webhook");

    let args = payload.args;
    let Some(phone) = resolve_caller_phone(args.phone.as_ref(), payload.call.as_ref()) else {
        return Err(AppError::Validation("phone is required".to_string()));
    };
    let fields = ContactFields {
        first_name: sanitize_field(args.first_name),
        last_name: sanitize_field(args.last_name),
        phone: Some(phone.clone()),
        email: sanitize_field(args.email),
    };
    let identity = CallerIdentity {
        phone: Some(phone),
        email: fields.email.clone(),
    };
    match resolver::resolve(&ctx, &identity).await {
        Some(contact) => {
            app_state
                .crm
                .update_contact(&contact.id, &fields)
                .await
                .map_err(|e| {
                    ctx.trace
                        .push(ctx.request, "update_contact_info", format!("update failed: {e}"));
                    e.sync_failure("GHL sync failed")
                })?;
        }
        None => {
            app_state
                .crm
                .create_contact(&fields)
                .await
                .map_err(|e| {
                    ctx.trace
                        .push(ctx.request, "update_contact_info", format!("create failed: {e}"));
                    e.sync_failure("GHL sync failed")
                })?;
        }
    }

    Ok(Json(StatusResponse {
        status: "success",
        message: None,
    }))
}

pub async fn trace_snapshot(State(app_state): State<Arc<AppState>>) -> Json<Vec<TraceEntry>> {
    Json(app_state.trace.snapshot())
}

pub async fn trace_reset(State(app_state): State<Arc<AppState>>) -> StatusCode {
    app_state.trace.reset();
    StatusCode::NO_CONTENT
}
