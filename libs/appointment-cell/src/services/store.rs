// libs/appointment-cell/src/services/store.rs
use async_trait::async_trait;
use uuid::Uuid;

use shared_models::tenant::TenantId;

use crate::models::{Appointment, AppointmentChanges, AppointmentError, AppointmentFilters};
use crate::services::conflict::TimeWindow;

/// Persistence boundary for appointments.
///
/// Every method takes the owning tenant; implementations must never read or
/// write a row outside it. Reads only see active rows unless stated otherwise.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Insert a new appointment.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the provider already has a blocking booking that overlaps
    /// - `Storage` on persistence failure
    async fn create(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    /// Fetch an active appointment. Inactive rows are reported as `None`.
    async fn get_by_id(&self, id: Uuid, tenant_id: TenantId) -> Result<Option<Appointment>, AppointmentError>;

    /// Fetch a soft-deleted appointment.
    async fn get_archived(&self, id: Uuid, tenant_id: TenantId) -> Result<Option<Appointment>, AppointmentError>;

    /// Replace the mutable fields of an active appointment.
    ///
    /// When the provider or window changes, conflict detection runs again
    /// with the appointment's own id excluded.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the id does not resolve to an active row in the tenant
    /// - `Conflict` on overlap
    /// - `Storage` on persistence failure
    async fn update(
        &self,
        id: Uuid,
        changes: AppointmentChanges,
        tenant_id: TenantId,
    ) -> Result<Appointment, AppointmentError>;

    /// Soft delete: `is_active = false` and `status = cancelled`.
    ///
    /// Returns `false` if the row is missing or already inactive.
    async fn delete(&self, id: Uuid, tenant_id: TenantId) -> Result<bool, AppointmentError>;

    /// Active rows matching `filters`, newest `start_time` first.
    async fn list(
        &self,
        tenant_id: TenantId,
        skip: u32,
        limit: u32,
        filters: &AppointmentFilters,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Number of rows `list` would page over for the same filters.
    async fn count(&self, tenant_id: TenantId, filters: &AppointmentFilters) -> Result<u64, AppointmentError>;

    /// Whether the provider has a blocking booking overlapping `window`.
    async fn check_conflicts(
        &self,
        provider_id: Uuid,
        window: TimeWindow,
        tenant_id: TenantId,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError>;
}
