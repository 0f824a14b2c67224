// libs/appointment-cell/src/services/conflict.rs
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use shared_models::tenant::TenantId;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Statuses that occupy a provider's calendar.
pub const BLOCKING_STATUSES: [AppointmentStatus; 3] = [
    AppointmentStatus::Scheduled,
    AppointmentStatus::Confirmed,
    AppointmentStatus::Rescheduled,
];

impl AppointmentStatus {
    pub fn blocks_provider(&self) -> bool {
        BLOCKING_STATUSES.contains(self)
    }
}

/// Half-open interval `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AppointmentError> {
        if start >= end {
            return Err(AppointmentError::Validation(format!(
                "start_time ({}) must be before end_time ({})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// For bounds read back from storage, where the check constraint already holds.
    pub(crate) fn from_trusted(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        intervals_overlap(self.start, self.end, other.start, other.end)
    }
}

/// Two half-open intervals overlap iff each starts before the other ends.
/// Touching endpoints (`end1 == start2`) do not overlap.
pub fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

/// A candidate booking to test against one provider's calendar inside one tenant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConflictQuery {
    pub tenant_id: TenantId,
    pub provider_id: Uuid,
    pub window: TimeWindow,
    pub exclude_id: Option<Uuid>,
}

impl ConflictQuery {
    pub fn new(tenant_id: TenantId, provider_id: Uuid, window: TimeWindow) -> Self {
        Self {
            tenant_id,
            provider_id,
            window,
            exclude_id: None,
        }
    }

    pub fn excluding(mut self, appointment_id: Option<Uuid>) -> Self {
        self.exclude_id = appointment_id;
        self
    }

    /// Single predicate: same tenant and provider, active, blocking status,
    /// not the excluded row, and overlapping window.
    pub fn matches(&self, appointment: &Appointment) -> bool {
        appointment.tenant_id == self.tenant_id
            && appointment.provider_id == self.provider_id
            && appointment.is_active
            && appointment.status.blocks_provider()
            && self.exclude_id != Some(appointment.id)
            && self.window.overlaps(&appointment.window())
    }

    pub fn find_conflicts<'a, I>(&self, appointments: I) -> Vec<&'a Appointment>
    where
        I: IntoIterator<Item = &'a Appointment>,
    {
        appointments
            .into_iter()
            .filter(|appointment| self.matches(appointment))
            .collect()
    }

    pub fn has_conflict<'a, I>(&self, appointments: I) -> bool
    where
        I: IntoIterator<Item = &'a Appointment>,
    {
        appointments.into_iter().any(|appointment| self.matches(appointment))
    }

    pub fn to_error(&self) -> AppointmentError {
        AppointmentError::conflict(self.provider_id, &self.window)
    }
}
