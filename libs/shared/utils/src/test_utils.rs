use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use shared_config::{AppConfig, CancellationPolicy};
use shared_models::tenant::{TenantContext, TenantId};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub cancellation_policy: CancellationPolicy,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            cancellation_policy: CancellationPolicy::Deactivate,
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            cancellation_policy: self.cancellation_policy,
            ..AppConfig::default()
        }
    }
}

/// A clinic plus one provider, enough to book against.
pub struct TestTenant {
    pub tenant_id: TenantId,
    pub provider_id: Uuid,
    pub actor_id: Uuid,
}

impl Default for TestTenant {
    fn default() -> Self {
        Self {
            tenant_id: TenantId::new(Uuid::new_v4()),
            provider_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
        }
    }
}

impl TestTenant {
    pub fn context(&self) -> TenantContext {
        TenantContext::new(self.tenant_id).with_actor(self.actor_id)
    }
}

pub struct TestClock;

impl TestClock {
    /// Fixed reference day so interval tests read as wall-clock times.
    pub fn day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 4, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }

    pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Self::day() + Duration::hours(hour as i64) + Duration::minutes(minute as i64)
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_row(
        id: Uuid,
        tenant_id: TenantId,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "tenant_id": tenant_id,
            "patient_id": Uuid::new_v4(),
            "provider_id": provider_id,
            "service_id": Uuid::new_v4(),
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "status": status,
            "notes": null,
            "is_active": true,
            "created_at": "2030-01-01T00:00:00Z",
            "updated_at": "2030-01-01T00:00:00Z"
        })
    }

    pub fn exclusion_violation() -> serde_json::Value {
        json!({
            "code": "23P01",
            "details": "Key conflicts with existing key.",
            "hint": null,
            "message": "conflicting key value violates exclusion constraint \"appointments_no_overlap\""
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "code": code,
            "details": null,
            "hint": null,
            "message": message
        })
    }
}
