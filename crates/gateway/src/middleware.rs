//! API-key authentication middleware.
//!
//! For every request outside the public-path set: extract the bearer key,
//! validate it, enforce the per-key minute rate and the monthly quota, attach
//! the [`AuthContext`] to the request, and add `X-RateLimit-*` headers to the
//! response. Usage is recorded fire-and-forget after the handler runs; a
//! tracking failure is logged and never surfaced.

use crate::SharedState;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use switchyard_auth::UsageEvent;
use switchyard_core::AuthError;
use switchyard_security::RateInfo;
use tracing::warn;

/// Paths that skip authentication. `/` is public only for GET (agent
/// discovery); the JSON-RPC POST on `/` is protected.
const PUBLIC_PATHS: &[&str] = &["/health", "/ready", "/metrics", "/docs", "/openapi.json", "/redoc"];

fn is_public(path: &str, method: &Method) -> bool {
    if path == "/" {
        return method == Method::GET;
    }
    PUBLIC_PATHS.iter().any(|p| path.starts_with(p))
}

/// Extractor for the request's auth context, if the middleware attached one.
/// Absent when API security is disabled.
pub struct MaybeAuth(pub Option<switchyard_core::AuthContext>);

impl<S> axum::extract::FromRequestParts<S> for MaybeAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuth(
            parts.extensions.get::<switchyard_core::AuthContext>().cloned(),
        ))
    }
}

/// Build the JSON error response for an auth failure.
pub fn auth_error_response(error: &AuthError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(error.to_body())).into_response()
}

pub async fn api_key_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_public(&path, request.method()) {
        return next.run(request).await;
    }

    let Some(api_key) = extract_api_key(request.headers()) else {
        state
            .audit
            .authentication("missing_key", &path, switchyard_security::AuditSeverity::Warning);
        return auth_error_response(&AuthError::MissingApiKey);
    };

    let ctx = match state.service.validate(&api_key).await {
        Ok(ctx) => ctx,
        Err(error) => return auth_error_response(&error),
    };

    let (allowed, rate_info) = state.key_limiter.check(ctx.key_id, ctx.rate_limit);
    if !allowed {
        let error = AuthError::RateLimitExceeded {
            limit: rate_info.limit,
            reset_at: rate_info.reset_at.map(|t| t.to_rfc3339()),
        };
        state.audit.rate_limit_exceeded(&ctx.key_id.to_string(), "minute");
        let mut response = auth_error_response(&error);
        apply_rate_headers(response.headers_mut(), &rate_info);
        return response;
    }

    if let Err(error) = state.service.check_monthly_quota(ctx.organization_id).await {
        let mut response = auth_error_response(&error);
        apply_rate_headers(response.headers_mut(), &rate_info);
        return response;
    }

    // Request details for usage tracking, captured before the handler
    // consumes the request.
    let method = request.method().to_string();
    let ip_address = client_ip(&request);
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let mut request = request;
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    apply_rate_headers(response.headers_mut(), &rate_info);

    // Fire-and-forget usage tracking
    let service = state.service.clone();
    let status_code = response.status().as_u16();
    tokio::spawn(async move {
        let event = UsageEvent {
            endpoint: path,
            method,
            status_code,
            ip_address,
            user_agent,
            ..UsageEvent::default()
        };
        if let Err(e) = service
            .track_usage(ctx.key_id, ctx.organization_id, event)
            .await
        {
            warn!(error = %e, "Failed to track usage");
        }
    });

    response
}

/// `Authorization: Bearer pk_…` or a bare `Authorization: pk_…`.
fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let key = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Client IP: first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer when connect info is available.
fn client_ip(request: &Request) -> Option<String> {
    let headers = request.headers();
    if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    if let Some(real_ip) = headers.get("X-Real-IP").and_then(|v| v.to_str().ok()) {
        return Some(real_ip.trim().to_string());
    }
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

fn apply_rate_headers(headers: &mut HeaderMap, rate_info: &RateInfo) {
    if let Ok(value) = HeaderValue::from_str(&rate_info.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&rate_info.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Some(reset_at) = rate_info.reset_at {
        if let Ok(value) = HeaderValue::from_str(&reset_at.to_rfc3339()) {
            headers.insert("X-RateLimit-Reset", value);
        }
    }
}
