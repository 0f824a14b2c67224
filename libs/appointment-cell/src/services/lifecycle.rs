// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::tenant::TenantId;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::conflict::TimeWindow;

impl AppointmentStatus {
    /// All valid next statuses for this status.
    pub fn valid_transitions(&self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentStatus::Scheduled => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::Rescheduled,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::Completed,
                AppointmentStatus::Rescheduled,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Rescheduled => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => &[],
            AppointmentStatus::Cancelled => &[],
            AppointmentStatus::NoShow => &[],
        }
    }

    /// Staying in the same status is always allowed and is a no-op.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        *self == next || self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// Statuses a new booking may start in.
    pub fn is_valid_initial(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }
}

impl Appointment {
    /// Build a fresh, active appointment. Call `validate` before persisting.
    pub fn new(
        tenant_id: TenantId,
        patient_id: Uuid,
        provider_id: Uuid,
        service_id: Uuid,
        window: TimeWindow,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            patient_id,
            provider_id,
            service_id,
            start_time: window.start(),
            end_time: window.end(),
            status,
            notes,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::from_trusted(self.start_time, self.end_time)
    }

    /// Structural validity: every reference is set and the window is forward.
    pub fn validate(&self) -> Result<(), AppointmentError> {
        for (field, id) in [
            ("patient_id", self.patient_id),
            ("provider_id", self.provider_id),
            ("service_id", self.service_id),
        ] {
            if id.is_nil() {
                return Err(AppointmentError::Validation(format!("{} is required", field)));
            }
        }

        TimeWindow::new(self.start_time, self.end_time).map(|_| ())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to `next`, enforcing the transition table.
    pub fn transition_to(&mut self, next: AppointmentStatus) -> Result<(), AppointmentError> {
        if self.status == next {
            return Ok(());
        }

        if !self.status.can_transition_to(next) {
            warn!("Invalid status transition attempted on {}: {} -> {}", self.id, self.status, next);
            return Err(AppointmentError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }

        debug!("Appointment {} status {} -> {}", self.id, self.status, next);
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Cancelling an already-cancelled appointment succeeds without changes.
    pub fn cancel(&mut self) -> Result<(), AppointmentError> {
        if self.status == AppointmentStatus::Cancelled {
            return Ok(());
        }
        self.transition_to(AppointmentStatus::Cancelled)
    }

    /// Move the time window. Only non-terminal appointments can be moved and
    /// the status is left as it is.
    pub fn reschedule(
        &mut self,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let window = TimeWindow::new(new_start, new_end)?;

        if self.status.is_terminal() {
            warn!("Refusing to reschedule appointment {} in status {}", self.id, self.status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: self.status,
                to: AppointmentStatus::Rescheduled,
            });
        }

        self.start_time = window.start();
        self.end_time = window.end();
        self.touch();
        Ok(())
    }

    /// Clear the soft-delete flag without touching the status.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.touch();
    }

    /// Soft delete: deactivates the row and forces the status to `cancelled`.
    pub fn mark_deleted(&mut self) {
        self.status = AppointmentStatus::Cancelled;
        self.deactivate();
    }
}
