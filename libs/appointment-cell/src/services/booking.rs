// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::{AppConfig, CancellationPolicy};
use shared_database::supabase::SupabaseClient;
use shared_models::tenant::TenantContext;

use crate::models::{
    Appointment, AppointmentChanges, AppointmentError, AppointmentPage, AppointmentStatus,
    ConflictCheckRequest, ConflictCheckResponse, CreateAppointmentRequest, ListAppointmentsQuery,
    Patch, RescheduleAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::conflict::TimeWindow;
use crate::services::store::AppointmentStore;
use crate::services::supabase_store::SupabaseAppointmentStore;

/// Appointment use cases. Stateless apart from the store handle; every call
/// is scoped to the tenant carried by its `TenantContext`.
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    cancellation_policy: CancellationPolicy,
    default_page_size: u32,
    max_page_size: u32,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self::with_store(Arc::new(SupabaseAppointmentStore::new(supabase)), config)
    }

    pub fn with_store(store: Arc<dyn AppointmentStore>, config: &AppConfig) -> Self {
        Self {
            store,
            cancellation_policy: config.cancellation_policy,
            default_page_size: config.default_page_size.max(1),
            max_page_size: config.max_page_size.max(1),
        }
    }

    // ==============================================================================
    // CREATE / READ
    // ==============================================================================

    #[instrument(skip(self, request), fields(tenant_id = %context.tenant_id))]
    pub async fn create_appointment(
        &self,
        context: &TenantContext,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = required(request.patient_id, "patient_id")?;
        let provider_id = required(request.provider_id, "provider_id")?;
        let service_id = required(request.service_id, "service_id")?;
        let start_time = required(request.start_time, "start_time")?;
        let end_time = required(request.end_time, "end_time")?;

        let status = match request.status.as_deref() {
            None => AppointmentStatus::Scheduled,
            Some(raw) => raw.parse::<AppointmentStatus>()?,
        };
        if !status.is_valid_initial() {
            return Err(AppointmentError::Validation(format!(
                "A new appointment cannot start as {}",
                status
            )));
        }

        let window = TimeWindow::new(start_time, end_time)?;
        let appointment = Appointment::new(
            context.tenant_id,
            patient_id,
            provider_id,
            service_id,
            window,
            status,
            request.notes,
        );
        appointment.validate()?;

        let created = self.store.create(appointment).await?;

        info!(
            "Appointment {} booked for provider {} from {} to {}",
            created.id, created.provider_id, created.start_time, created.end_time
        );
        Ok(created)
    }

    #[instrument(skip(self), fields(tenant_id = %context.tenant_id))]
    pub async fn get_appointment(
        &self,
        context: &TenantContext,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment {}", appointment_id);

        self.store
            .get_by_id(appointment_id, context.tenant_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    #[instrument(skip(self, query), fields(tenant_id = %context.tenant_id))]
    pub async fn list_appointments(
        &self,
        context: &TenantContext,
        query: ListAppointmentsQuery,
    ) -> Result<AppointmentPage, AppointmentError> {
        query.filters.validate()?;

        let skip = query.skip.unwrap_or(0);
        let limit = match query.limit {
            Some(0) => {
                return Err(AppointmentError::Validation("limit must be at least 1".to_string()));
            }
            Some(limit) => limit.min(self.max_page_size),
            None => self.default_page_size.min(self.max_page_size),
        };

        debug!("Listing appointments skip={} limit={} filters={:?}", skip, limit, query.filters);

        let total = self.store.count(context.tenant_id, &query.filters).await?;
        let items = self
            .store
            .list(context.tenant_id, skip, limit, &query.filters)
            .await?;

        Ok(AppointmentPage::new(items, total, skip, limit))
    }

    // ==============================================================================
    // MUTATIONS
    // ==============================================================================

    /// Partial update. A single supplied bound is validated against the
    /// stored other bound; moving the window or provider re-runs conflict
    /// detection in the store. Setting the status to `cancelled` persists the
    /// other changes and then cancels as `cancel_appointment` does.
    #[instrument(skip(self, request), fields(tenant_id = %context.tenant_id))]
    pub async fn update_appointment(
        &self,
        context: &TenantContext,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get_appointment(context, appointment_id).await?;
        let stored = AppointmentChanges::from(&appointment);
        let touches_window = request.touches_window();

        appointment.patient_id = request.patient_id.resolve_required("patient_id", appointment.patient_id)?;
        appointment.provider_id = request.provider_id.resolve_required("provider_id", appointment.provider_id)?;
        appointment.service_id = request.service_id.resolve_required("service_id", appointment.service_id)?;

        if touches_window {
            let start_time = request.start_time.resolve_required("start_time", appointment.start_time)?;
            let end_time = request.end_time.resolve_required("end_time", appointment.end_time)?;
            appointment.reschedule(start_time, end_time)?;
        }

        let cancel_requested = match request.status {
            Patch::Absent => false,
            Patch::Null => {
                return Err(AppointmentError::Validation("status cannot be null".to_string()));
            }
            Patch::Value(raw) => match raw.parse::<AppointmentStatus>()? {
                AppointmentStatus::Cancelled => {
                    let from = appointment.status;
                    if !from.can_transition_to(AppointmentStatus::Cancelled) {
                        return Err(AppointmentError::InvalidStatusTransition {
                            from,
                            to: AppointmentStatus::Cancelled,
                        });
                    }
                    true
                }
                next => {
                    appointment.transition_to(next)?;
                    false
                }
            },
        };

        appointment.notes = request.notes.resolve_optional(appointment.notes);
        appointment.validate()?;

        // A cancelled status is applied by the configured cancellation policy
        if cancel_requested {
            if AppointmentChanges::from(&appointment) != stored {
                appointment.touch();
                self.store
                    .update(appointment_id, AppointmentChanges::from(&appointment), context.tenant_id)
                    .await?;
            }
            return self.cancel_appointment(context, appointment_id).await;
        }

        appointment.touch();

        let updated = self
            .store
            .update(appointment_id, AppointmentChanges::from(&appointment), context.tenant_id)
            .await?;

        info!("Appointment {} updated (status {})", updated.id, updated.status);
        Ok(updated)
    }

    #[instrument(skip(self, request), fields(tenant_id = %context.tenant_id))]
    pub async fn reschedule_appointment(
        &self,
        context: &TenantContext,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let update = UpdateAppointmentRequest {
            start_time: Patch::Value(request.start_time),
            end_time: Patch::Value(request.end_time),
            ..Default::default()
        };

        self.update_appointment(context, appointment_id, update).await
    }

    /// Idempotent: cancelling an already-cancelled appointment returns it unchanged.
    #[instrument(skip(self), fields(tenant_id = %context.tenant_id))]
    pub async fn cancel_appointment(
        &self,
        context: &TenantContext,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = match self.store.get_by_id(appointment_id, context.tenant_id).await? {
            Some(appointment) => appointment,
            None => {
                // A deactivating cancel leaves the row archived
                return match self.store.get_archived(appointment_id, context.tenant_id).await? {
                    Some(archived) if archived.status == AppointmentStatus::Cancelled => {
                        debug!("Appointment {} already cancelled", appointment_id);
                        Ok(archived)
                    }
                    _ => Err(AppointmentError::NotFound),
                };
            }
        };

        let already_cancelled = appointment.status == AppointmentStatus::Cancelled;
        appointment.cancel()?;

        let cancelled = match self.cancellation_policy {
            CancellationPolicy::Retain if already_cancelled => appointment,
            CancellationPolicy::Retain => {
                self.store
                    .update(appointment_id, AppointmentChanges::from(&appointment), context.tenant_id)
                    .await?
            }
            CancellationPolicy::Deactivate => {
                if !self.store.delete(appointment_id, context.tenant_id).await? {
                    warn!("Appointment {} disappeared before it could be cancelled", appointment_id);
                    return Err(AppointmentError::NotFound);
                }
                match self.store.get_archived(appointment_id, context.tenant_id).await? {
                    Some(archived) => archived,
                    None => {
                        appointment.deactivate();
                        appointment
                    }
                }
            }
        };

        info!("Appointment {} cancelled ({})", appointment_id, self.cancellation_policy);
        Ok(cancelled)
    }

    #[instrument(skip(self), fields(tenant_id = %context.tenant_id))]
    pub async fn delete_appointment(
        &self,
        context: &TenantContext,
        appointment_id: Uuid,
    ) -> Result<(), AppointmentError> {
        if !self.store.delete(appointment_id, context.tenant_id).await? {
            return Err(AppointmentError::NotFound);
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    // ==============================================================================
    // CONFLICT CHECK
    // ==============================================================================

    #[instrument(skip(self, request), fields(tenant_id = %context.tenant_id))]
    pub async fn check_conflicts(
        &self,
        context: &TenantContext,
        request: ConflictCheckRequest,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let window = TimeWindow::new(request.start_time, request.end_time)?;

        let has_conflict = self
            .store
            .check_conflicts(request.provider_id, window, context.tenant_id, request.exclude_appointment_id)
            .await?;

        debug!("Provider {} conflict check: {}", request.provider_id, has_conflict);

        Ok(ConflictCheckResponse {
            provider_id: request.provider_id,
            start_time: window.start(),
            end_time: window.end(),
            has_conflict,
        })
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AppointmentError> {
    value.ok_or_else(|| AppointmentError::Validation(format!("{} is required", field)))
}
