use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::Response,
};
use http::{HeaderMap, HeaderName};
use tracing::debug;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::tenant::{TenantContext, TenantId};

/// Set by the gateway once the caller's organization is resolved.
pub const TENANT_HEADER: HeaderName = HeaderName::from_static("x-tenant-id");
/// Set by the gateway once the calling user is resolved.
pub const ACTOR_HEADER: HeaderName = HeaderName::from_static("x-actor-id");

// Middleware that turns the resolved identity headers into a TenantContext extension
pub async fn tenant_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let context = tenant_context_from_headers(request.headers())?;
    debug!("Request scoped to tenant {}", context.tenant_id);

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

pub fn tenant_context_from_headers(headers: &HeaderMap) -> Result<TenantContext, AppError> {
    let tenant_value = headers
        .get(&TENANT_HEADER)
        .ok_or_else(|| AppError::BadRequest("Missing tenant header".to_string()))?;

    let tenant_id = tenant_value
        .to_str()
        .ok()
        .and_then(|raw| raw.parse::<TenantId>().ok())
        .ok_or_else(|| AppError::BadRequest("Invalid tenant header format".to_string()))?;

    let mut context = TenantContext::new(tenant_id);

    if let Some(actor_value) = headers.get(&ACTOR_HEADER) {
        let actor_id = actor_value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .ok_or_else(|| AppError::BadRequest("Invalid actor header format".to_string()))?;
        context = context.with_actor(actor_id);
    }

    Ok(context)
}
