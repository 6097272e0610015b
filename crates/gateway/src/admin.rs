//! Admin HTTP surface: organizations, keys, and usage summaries.
//!
//! All routes run behind the API-key middleware and additionally require the
//! `admin` scope (a wildcard key passes). When the middleware is disabled
//! (local development), requests arrive without an [`AuthContext`] and are
//! allowed through.

use crate::SharedState;
use crate::middleware::{MaybeAuth, auth_error_response};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use switchyard_auth::{ApiKeyService, Organization};
use switchyard_core::{AuthContext, AuthError, KeyEnvironment};
use uuid::Uuid;

pub fn admin_router() -> Router<SharedState> {
    Router::new()
        .route("/organizations", post(create_organization))
        .route("/organizations", get(list_organizations))
        .route("/organizations/{id}", get(get_organization))
        .route("/organizations/{id}/keys", post(create_key))
        .route("/organizations/{id}/keys", get(list_keys))
        .route("/organizations/{id}/keys/{key_id}", delete(revoke_key))
        .route("/organizations/{id}/usage", get(usage_summary))
}

fn require_admin(ctx: &Option<AuthContext>) -> Result<(), Response> {
    match ctx {
        Some(ctx) => ApiKeyService::check_scope(&ctx.scopes, "admin")
            .map_err(|e| auth_error_response(&e)),
        // Middleware disabled: nothing to enforce
        None => Ok(()),
    }
}

fn error(e: AuthError) -> Response {
    auth_error_response(&e)
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not_found", "message": what })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct CreateOrganizationBody {
    name: String,
    slug: String,
    email: String,
    #[serde(default)]
    plan: Option<String>,
    #[serde(default)]
    monthly_request_limit: Option<i64>,
    #[serde(default)]
    rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    max_api_keys: Option<u32>,
}

async fn create_organization(
    State(state): State<SharedState>,
    MaybeAuth(ctx): MaybeAuth,
    Json(body): Json<CreateOrganizationBody>,
) -> Response {
    if let Err(response) = require_admin(&ctx) {
        return response;
    }

    let mut org = Organization::new(body.name, body.slug, body.email);
    if let Some(plan) = body.plan {
        org.plan = plan;
    }
    if let Some(limit) = body.monthly_request_limit {
        org.monthly_request_limit = limit.max(0);
    }
    if let Some(rate) = body.rate_limit_per_minute {
        org.rate_limit_per_minute = rate.max(1);
    }
    if let Some(max_keys) = body.max_api_keys {
        org.max_api_keys = max_keys.max(1);
    }

    match state.service.organizations().create(org).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => error(AuthError::Storage(e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    is_active: Option<bool>,
}

fn default_limit() -> i64 {
    50
}

async fn list_organizations(
    State(state): State<SharedState>,
    MaybeAuth(ctx): MaybeAuth,
    Query(query): Query<ListQuery>,
) -> Response {
    if let Err(response) = require_admin(&ctx) {
        return response;
    }

    let orgs = state
        .service
        .organizations()
        .get_all(query.limit, query.offset, query.is_active)
        .await;
    let total = state.service.organizations().count().await;

    match (orgs, total) {
        (Ok(organizations), Ok(total)) => Json(serde_json::json!({
            "organizations": organizations,
            "total": total,
            "limit": query.limit,
            "offset": query.offset,
        }))
        .into_response(),
        (Err(e), _) | (_, Err(e)) => error(AuthError::Storage(e.to_string())),
    }
}

async fn get_organization(
    State(state): State<SharedState>,
    MaybeAuth(ctx): MaybeAuth,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(response) = require_admin(&ctx) {
        return response;
    }

    match state.service.organizations().get_by_id(id).await {
        Ok(Some(org)) => {
            let current_api_keys = state
                .service
                .organizations()
                .api_key_count(id)
                .await
                .unwrap_or(0);
            Json(serde_json::json!({
                "organization": org,
                "current_api_keys": current_api_keys,
            }))
            .into_response()
        }
        Ok(None) => not_found("organization not found"),
        Err(e) => error(AuthError::Storage(e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct CreateKeyBody {
    name: String,
    environment: KeyEnvironment,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    scopes: Option<Vec<String>>,
    #[serde(default)]
    custom_rate_limit: Option<u32>,
    #[serde(default)]
    expires_in_days: Option<i64>,
}

async fn create_key(
    State(state): State<SharedState>,
    MaybeAuth(ctx): MaybeAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<CreateKeyBody>,
) -> Response {
    if let Err(response) = require_admin(&ctx) {
        return response;
    }

    match state
        .service
        .create_key(
            id,
            &body.name,
            body.environment,
            body.description,
            body.scopes,
            body.custom_rate_limit,
            body.expires_in_days,
        )
        .await
    {
        // full_key appears exactly once, in this response
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => error(e),
    }
}

async fn list_keys(
    State(state): State<SharedState>,
    MaybeAuth(ctx): MaybeAuth,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(response) = require_admin(&ctx) {
        return response;
    }

    match state.service.list_keys(id).await {
        Ok(keys) => Json(serde_json::json!({ "keys": keys })).into_response(),
        Err(e) => error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RevokeBody {
    #[serde(default)]
    reason: Option<String>,
}

async fn revoke_key(
    State(state): State<SharedState>,
    MaybeAuth(ctx): MaybeAuth,
    Path((_org_id, key_id)): Path<(Uuid, Uuid)>,
    body: axum::body::Bytes,
) -> Response {
    if let Err(response) = require_admin(&ctx) {
        return response;
    }

    // The body is optional; tolerate empty and malformed payloads
    let parsed: RevokeBody = serde_json::from_slice(&body).unwrap_or_default();
    let reason = parsed
        .reason
        .unwrap_or_else(|| "revoked via admin API".into());
    let revoked_by = ctx.map(|c| c.key_id);

    match state.service.revoke_key(key_id, &reason, revoked_by).await {
        Ok(()) => Json(serde_json::json!({ "revoked": true, "key_id": key_id })).into_response(),
        Err(e) => error(e),
    }
}

#[derive(Debug, Deserialize)]
struct UsageQuery {
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    month: Option<u32>,
}

async fn usage_summary(
    State(state): State<SharedState>,
    MaybeAuth(ctx): MaybeAuth,
    Path(id): Path<Uuid>,
    Query(query): Query<UsageQuery>,
) -> Response {
    if let Err(response) = require_admin(&ctx) {
        return response;
    }

    let now = Utc::now();
    let year = query.year.unwrap_or_else(|| now.year());
    let month = query.month.unwrap_or_else(|| now.month()).clamp(1, 12);

    match state.service.usage_summary(id, year, month).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => error(e),
    }
}
