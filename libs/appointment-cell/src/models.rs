// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use shared_models::tenant::TenantId;

use crate::services::conflict::TimeWindow;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Cancelled,
    Completed,
    Rescheduled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Rescheduled => "rescheduled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            "rescheduled" => Ok(AppointmentStatus::Rescheduled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(AppointmentError::Validation(format!("Invalid status value '{}'", other))),
        }
    }
}

// ==============================================================================
// PARTIAL UPDATE SUPPORT
// ==============================================================================

/// A field in a partial update: left out, explicitly cleared, or set.
///
/// Use with `#[serde(default)]` so a missing key deserializes to `Absent`
/// while `null` deserializes to `Null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    /// Resolve a field that may never be cleared.
    pub fn resolve_required(self, field: &str, current: T) -> Result<T, AppointmentError> {
        match self {
            Patch::Absent => Ok(current),
            Patch::Null => Err(AppointmentError::Validation(format!("{} cannot be null", field))),
            Patch::Value(value) => Ok(value),
        }
    }

    /// Resolve a nullable field.
    pub fn resolve_optional(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Absent => current,
            Patch::Null => None,
            Patch::Value(value) => Some(value),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Patch::from)
    }
}

impl<T> Serialize for Patch<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Absent | Patch::Null => serializer.serialize_none(),
            Patch::Value(value) => value.serialize(serializer),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Reference ids are optional here so a missing one surfaces as a
/// validation error naming the field rather than a body rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub patient_id: Patch<Uuid>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub provider_id: Patch<Uuid>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub service_id: Patch<Uuid>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub start_time: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub end_time: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub status: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub notes: Patch<String>,
}

impl UpdateAppointmentRequest {
    pub fn touches_window(&self) -> bool {
        !self.start_time.is_absent() || !self.end_time.is_absent()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentFilters {
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl AppointmentFilters {
    pub fn validate(&self) -> Result<(), AppointmentError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(AppointmentError::Validation(format!(
                    "date_from ({}) must not be after date_to ({})",
                    from, to
                )));
            }
        }
        Ok(())
    }

    /// Row-level predicate; tenant and soft-delete scoping are applied by the store.
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.provider_id.map_or(true, |id| appointment.provider_id == id)
            && self.service_id.map_or(true, |id| appointment.service_id == id)
            && self.status.map_or(true, |status| appointment.status == status)
            && self.date_from.map_or(true, |from| appointment.start_time >= from)
            && self.date_to.map_or(true, |to| appointment.start_time <= to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListAppointmentsQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub filters: AppointmentFilters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentPage {
    pub total: u64,
    pub items: Vec<Appointment>,
    pub page: u64,
    pub size: u32,
    pub pages: u64,
}

impl AppointmentPage {
    pub fn new(items: Vec<Appointment>, total: u64, skip: u32, limit: u32) -> Self {
        let limit = limit.max(1);
        Self {
            total,
            items,
            page: u64::from(skip) / u64::from(limit) + 1,
            size: limit,
            pages: total.div_ceil(limit as u64),
        }
    }
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckRequest {
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub has_conflict: bool,
}

/// Full post-mutation state handed to `AppointmentStore::update`.
///
/// `id`, `tenant_id` and `created_at` are deliberately absent: they never change.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentChanges {
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub window: TimeWindow,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Appointment> for AppointmentChanges {
    fn from(appointment: &Appointment) -> Self {
        Self {
            patient_id: appointment.patient_id,
            provider_id: appointment.provider_id,
            service_id: appointment.service_id,
            window: appointment.window(),
            status: appointment.status,
            notes: appointment.notes.clone(),
            updated_at: appointment.updated_at,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment not found")]
    NotFound,

    #[error("Provider {provider_id} is already booked between {start_time} and {end_time}")]
    Conflict {
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppointmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppointmentError::Validation(_) | AppointmentError::InvalidStatusTransition { .. } => {
                ErrorKind::Validation
            }
            AppointmentError::NotFound => ErrorKind::NotFound,
            AppointmentError::Conflict { .. } => ErrorKind::Conflict,
            AppointmentError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn conflict(provider_id: Uuid, window: &TimeWindow) -> Self {
        AppointmentError::Conflict {
            provider_id,
            start_time: window.start(),
            end_time: window.end(),
        }
    }
}
