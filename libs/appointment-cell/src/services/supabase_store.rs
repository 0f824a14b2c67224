// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, SupabaseError};
use shared_models::tenant::TenantId;

use crate::models::{Appointment, AppointmentChanges, AppointmentError, AppointmentFilters, AppointmentStatus};
use crate::services::conflict::{TimeWindow, BLOCKING_STATUSES};
use crate::services::store::AppointmentStore;

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";

/// PostgREST-backed store over the `appointments` table.
///
/// Writes run a conflict pre-check for a precise error, then a single
/// statement. The `appointments_no_overlap` exclusion constraint is what
/// actually guarantees no double booking when two writers race.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn encode_time(time: DateTime<Utc>) -> String {
        urlencoding::encode(&time.to_rfc3339()).into_owned()
    }

    /// Filter prefix shared by every tenant-scoped path. Tenant comes first.
    fn scoped(tenant_id: TenantId) -> Vec<String> {
        vec![format!("tenant_id=eq.{}", tenant_id)]
    }

    fn row_path(id: Uuid, tenant_id: TenantId, active: bool) -> String {
        let mut query_parts = Self::scoped(tenant_id);
        query_parts.push(format!("id=eq.{}", id));
        query_parts.push(format!("is_active=is.{}", active));
        format!("{}?{}", APPOINTMENTS_PATH, query_parts.join("&"))
    }

    fn filter_parts(tenant_id: TenantId, filters: &AppointmentFilters) -> Vec<String> {
        let mut query_parts = Self::scoped(tenant_id);
        query_parts.push("is_active=is.true".to_string());

        if let Some(patient_id) = filters.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(provider_id) = filters.provider_id {
            query_parts.push(format!("provider_id=eq.{}", provider_id));
        }
        if let Some(service_id) = filters.service_id {
            query_parts.push(format!("service_id=eq.{}", service_id));
        }
        if let Some(status) = filters.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(date_from) = filters.date_from {
            query_parts.push(format!("start_time=gte.{}", Self::encode_time(date_from)));
        }
        if let Some(date_to) = filters.date_to {
            query_parts.push(format!("start_time=lte.{}", Self::encode_time(date_to)));
        }

        query_parts
    }

    pub(crate) fn conflict_path(
        provider_id: Uuid,
        window: &TimeWindow,
        tenant_id: TenantId,
        exclude_id: Option<Uuid>,
    ) -> String {
        let statuses = BLOCKING_STATUSES
            .iter()
            .map(|status| status.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let mut query_parts = Self::scoped(tenant_id);
        query_parts.push("select=id".to_string());
        query_parts.push(format!("provider_id=eq.{}", provider_id));
        query_parts.push("is_active=is.true".to_string());
        query_parts.push(format!("status=in.({})", statuses));
        query_parts.push(format!("start_time=lt.{}", Self::encode_time(window.end())));
        query_parts.push(format!("end_time=gt.{}", Self::encode_time(window.start())));
        if let Some(exclude_id) = exclude_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }
        query_parts.push("limit=1".to_string());

        format!("{}?{}", APPOINTMENTS_PATH, query_parts.join("&"))
    }

    fn storage_error(context: &str, err: SupabaseError) -> AppointmentError {
        error!("{}: {}", context, err);
        AppointmentError::Storage(format!("{}: {}", context, err))
    }

    /// Only the exclusion constraint's SQLSTATE means a lost race for the slot.
    fn write_error(context: &str, err: SupabaseError, provider_id: Uuid, window: &TimeWindow) -> AppointmentError {
        if err.is_exclusion_violation() {
            warn!("Exclusion constraint rejected booking for provider {}", provider_id);
            return AppointmentError::conflict(provider_id, window);
        }
        Self::storage_error(context, err)
    }

    async fn fetch_one(&self, path: &str) -> Result<Option<Appointment>, AppointmentError> {
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, path, None)
            .await
            .map_err(|e| Self::storage_error("Failed to fetch appointment", e))?;

        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn create(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let window = appointment.window();

        if appointment.status.blocks_provider()
            && self
                .check_conflicts(appointment.provider_id, window, appointment.tenant_id, None)
                .await?
        {
            warn!("Rejecting booking for provider {}: slot taken", appointment.provider_id);
            return Err(AppointmentError::conflict(appointment.provider_id, &window));
        }

        let body = serde_json::to_value(&appointment)
            .map_err(|e| AppointmentError::Storage(format!("Failed to encode appointment: {}", e)))?;

        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::POST, APPOINTMENTS_PATH, Some(body))
            .await
            .map_err(|e| Self::write_error("Failed to create appointment", e, appointment.provider_id, &window))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::Storage("Insert returned no rows".to_string()))
    }

    async fn get_by_id(&self, id: Uuid, tenant_id: TenantId) -> Result<Option<Appointment>, AppointmentError> {
        self.fetch_one(&Self::row_path(id, tenant_id, true)).await
    }

    async fn get_archived(&self, id: Uuid, tenant_id: TenantId) -> Result<Option<Appointment>, AppointmentError> {
        self.fetch_one(&Self::row_path(id, tenant_id, false)).await
    }

    async fn update(
        &self,
        id: Uuid,
        changes: AppointmentChanges,
        tenant_id: TenantId,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_by_id(id, tenant_id).await?.ok_or(AppointmentError::NotFound)?;

        let moved = current.provider_id != changes.provider_id || current.window() != changes.window;
        if moved
            && changes.status.blocks_provider()
            && self
                .check_conflicts(changes.provider_id, changes.window, tenant_id, Some(id))
                .await?
        {
            warn!("Rejecting move of appointment {}: slot taken", id);
            return Err(AppointmentError::conflict(changes.provider_id, &changes.window));
        }

        let body = json!({
            "patient_id": changes.patient_id,
            "provider_id": changes.provider_id,
            "service_id": changes.service_id,
            "start_time": changes.window.start().to_rfc3339(),
            "end_time": changes.window.end().to_rfc3339(),
            "status": changes.status,
            "notes": changes.notes,
            "updated_at": changes.updated_at.to_rfc3339(),
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::PATCH, &Self::row_path(id, tenant_id, true), Some(body))
            .await
            .map_err(|e| Self::write_error("Failed to update appointment", e, changes.provider_id, &changes.window))?;

        // Deactivated between the read and the write
        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn delete(&self, id: Uuid, tenant_id: TenantId) -> Result<bool, AppointmentError> {
        let body = json!({
            "is_active": false,
            "status": AppointmentStatus::Cancelled,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::PATCH, &Self::row_path(id, tenant_id, true), Some(body))
            .await
            .map_err(|e| Self::storage_error("Failed to delete appointment", e))?;

        Ok(!rows.is_empty())
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        skip: u32,
        limit: u32,
        filters: &AppointmentFilters,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "{}?{}&order=start_time.desc,id.asc&offset={}&limit={}",
            APPOINTMENTS_PATH,
            Self::filter_parts(tenant_id, filters).join("&"),
            skip,
            limit
        );
        debug!("Listing appointments: {}", path);

        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| Self::storage_error("Failed to list appointments", e))
    }

    async fn count(&self, tenant_id: TenantId, filters: &AppointmentFilters) -> Result<u64, AppointmentError> {
        let path = format!(
            "{}?{}",
            APPOINTMENTS_PATH,
            Self::filter_parts(tenant_id, filters).join("&")
        );

        self.supabase
            .count(&path)
            .await
            .map_err(|e| Self::storage_error("Failed to count appointments", e))
    }

    async fn check_conflicts(
        &self,
        provider_id: Uuid,
        window: TimeWindow,
        tenant_id: TenantId,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let path = Self::conflict_path(provider_id, &window, tenant_id, exclude_id);
        debug!("Checking conflicts: {}", path);

        let rows: Vec<serde_json::Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| Self::storage_error("Failed to check conflicts", e))?;

        Ok(!rows.is_empty())
    }
}
