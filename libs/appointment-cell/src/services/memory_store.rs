// libs/appointment-cell/src/services/memory_store.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::tenant::TenantId;

use crate::models::{Appointment, AppointmentChanges, AppointmentError, AppointmentFilters};
use crate::services::conflict::{ConflictQuery, TimeWindow};
use crate::services::store::AppointmentStore;

/// Process-local store. The conflict check and the write share one write
/// lock, so concurrent bookings for the same provider serialize.
#[derive(Clone, Default)]
pub struct InMemoryAppointmentStore {
    appointments: Arc<RwLock<HashMap<Uuid, Appointment>>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows held, active or not, across every tenant.
    pub async fn len(&self) -> usize {
        self.appointments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.appointments.read().await.is_empty()
    }

    fn owned<'a>(
        appointments: &'a HashMap<Uuid, Appointment>,
        id: &Uuid,
        tenant_id: TenantId,
    ) -> Option<&'a Appointment> {
        appointments
            .get(id)
            .filter(|appointment| appointment.tenant_id == tenant_id)
    }

    fn filtered<'a>(
        appointments: &'a HashMap<Uuid, Appointment>,
        tenant_id: TenantId,
        filters: &'a AppointmentFilters,
    ) -> impl Iterator<Item = &'a Appointment> + 'a {
        appointments.values().filter(move |appointment| {
            appointment.tenant_id == tenant_id && appointment.is_active && filters.matches(appointment)
        })
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn create(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;

        if appointment.is_active && appointment.status.blocks_provider() {
            let query = ConflictQuery::new(appointment.tenant_id, appointment.provider_id, appointment.window());
            if query.has_conflict(appointments.values()) {
                warn!("Rejecting booking for provider {}: slot taken", appointment.provider_id);
                return Err(query.to_error());
            }
        }

        if appointments.contains_key(&appointment.id) {
            return Err(AppointmentError::Storage(format!(
                "duplicate appointment id {}",
                appointment.id
            )));
        }

        appointments.insert(appointment.id, appointment.clone());
        debug!("Stored appointment {}", appointment.id);
        Ok(appointment)
    }

    async fn get_by_id(&self, id: Uuid, tenant_id: TenantId) -> Result<Option<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        Ok(Self::owned(&appointments, &id, tenant_id)
            .filter(|appointment| appointment.is_active)
            .cloned())
    }

    async fn get_archived(&self, id: Uuid, tenant_id: TenantId) -> Result<Option<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        Ok(Self::owned(&appointments, &id, tenant_id)
            .filter(|appointment| !appointment.is_active)
            .cloned())
    }

    async fn update(
        &self,
        id: Uuid,
        changes: AppointmentChanges,
        tenant_id: TenantId,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;

        let current = Self::owned(&appointments, &id, tenant_id)
            .filter(|appointment| appointment.is_active)
            .ok_or(AppointmentError::NotFound)?;

        let moved = current.provider_id != changes.provider_id || current.window() != changes.window;
        if moved && changes.status.blocks_provider() {
            let query = ConflictQuery::new(tenant_id, changes.provider_id, changes.window).excluding(Some(id));
            if query.has_conflict(appointments.values()) {
                warn!("Rejecting move of appointment {}: slot taken", id);
                return Err(query.to_error());
            }
        }

        let appointment = appointments.get_mut(&id).ok_or(AppointmentError::NotFound)?;
        appointment.patient_id = changes.patient_id;
        appointment.provider_id = changes.provider_id;
        appointment.service_id = changes.service_id;
        appointment.start_time = changes.window.start();
        appointment.end_time = changes.window.end();
        appointment.status = changes.status;
        appointment.notes = changes.notes;
        appointment.updated_at = changes.updated_at;

        Ok(appointment.clone())
    }

    async fn delete(&self, id: Uuid, tenant_id: TenantId) -> Result<bool, AppointmentError> {
        let mut appointments = self.appointments.write().await;

        match appointments.get_mut(&id) {
            Some(appointment) if appointment.tenant_id == tenant_id && appointment.is_active => {
                appointment.mark_deleted();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        skip: u32,
        limit: u32,
        filters: &AppointmentFilters,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;

        let mut rows: Vec<&Appointment> = Self::filtered(&appointments, tenant_id, filters).collect();
        // id breaks ties so pages stay stable between calls
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| a.id.cmp(&b.id)));

        Ok(rows
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, tenant_id: TenantId, filters: &AppointmentFilters) -> Result<u64, AppointmentError> {
        let appointments = self.appointments.read().await;
        Ok(Self::filtered(&appointments, tenant_id, filters).count() as u64)
    }

    async fn check_conflicts(
        &self,
        provider_id: Uuid,
        window: TimeWindow,
        tenant_id: TenantId,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let appointments = self.appointments.read().await;
        let query = ConflictQuery::new(tenant_id, provider_id, window).excluding(exclude_id);
        Ok(query.has_conflict(appointments.values()))
    }
}
