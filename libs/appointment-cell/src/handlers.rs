// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::tenant::TenantContext;

use crate::models::{
    AppointmentError, AppointmentFilters, AppointmentStatus, ConflictCheckRequest,
    CreateAppointmentRequest, ListAppointmentsQuery, RescheduleAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidStatusTransition { .. } => AppError::ValidationError(err.to_string()),
            // Missing, inactive and foreign-tenant rows all look the same
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::Conflict { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::Storage(detail) => {
                error!("Appointment storage failure: {}", detail);
                AppError::Database("Appointment storage is unavailable".to_string())
            }
        }
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQueryParams {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub status: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl AppointmentQueryParams {
    pub fn into_query(self) -> Result<ListAppointmentsQuery, AppointmentError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<AppointmentStatus>)
            .transpose()?;

        Ok(ListAppointmentsQuery {
            skip: self.skip,
            limit: self.limit,
            filters: AppointmentFilters {
                patient_id: self.patient_id,
                provider_id: self.provider_id,
                service_id: self.service_id,
                status,
                date_from: self.date_from,
                date_to: self.date_to,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = service.create_appointment(&tenant, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(tenant): Extension<TenantContext>,
    Query(params): Query<AppointmentQueryParams>,
) -> Result<Json<Value>, AppError> {
    let page = service.list_appointments(&tenant, params.into_query()?).await?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(tenant): Extension<TenantContext>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.get_appointment(&tenant, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(tenant): Extension<TenantContext>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.update_appointment(&tenant, appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(tenant): Extension<TenantContext>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.reschedule_appointment(&tenant, appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(tenant): Extension<TenantContext>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.cancel_appointment(&tenant, appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(tenant): Extension<TenantContext>,
    Path(appointment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service.delete_appointment(&tenant, appointment_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// CONFLICT DETECTION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(tenant): Extension<TenantContext>,
    Query(params): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let request = ConflictCheckRequest {
        provider_id: params.provider_id,
        start_time: params.start_time,
        end_time: params.end_time,
        exclude_appointment_id: params.exclude_appointment_id,
    };

    let conflict_response = service.check_conflicts(&tenant, request).await?;

    Ok(Json(json!(conflict_response)))
}
