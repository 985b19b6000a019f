//! Access management endpoints: roles, modules, users and invites.
//!
//! Any authenticated user may read and change these.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::auth::body_or_default;
use super::error::{ApiError, ErrorCode};
use super::validation::{non_blank, parse_id, role_id_from_json};
use crate::db::{
    is_truthy, CreateInviteRequest, InviteStatusRequest, ModuleToggleRequest, RoleRequest, User,
};
use crate::services::{access, credentials};
use crate::AppState;

pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    _user: User,
) -> Result<Json<Value>, ApiError> {
    let roles = access::list_roles(&state.db).await?;
    Ok(Json(json!({ "roles": roles })))
}

pub async fn create_role(
    State(state): State<Arc<AppState>>,
    _user: User,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = body_or_default(payload);
    let name = non_blank(request.name.as_deref())
        .ok_or_else(|| ApiError::new(ErrorCode::NameRequired, "Role name is required"))?;

    let role = access::create_role(&state.db, &name).await?;
    tracing::info!(role_id = role.id, "Role created");

    Ok(Json(json!({ "id": role.id, "name": role.name, "members": 0 })))
}

pub async fn rename_role(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = body_or_default(payload);
    let id = parse_id(&id).map_err(ApiError::invalid_request)?;
    let name = non_blank(request.name.as_deref())
        .ok_or_else(|| ApiError::invalid_request("Role name is required"))?;

    let role = access::rename_role(&state.db, id, &name)
        .await?
        .ok_or_else(|| ApiError::not_found("Role not found"))?;

    Ok(Json(json!({ "id": role.id, "name": role.name })))
}

/// Deleting an unknown role is a no-op
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id).map_err(ApiError::invalid_request)?;
    access::delete_role(&state.db, id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn list_modules(
    State(state): State<Arc<AppState>>,
    _user: User,
) -> Result<Json<Value>, ApiError> {
    let modules = access::list_modules(&state.db).await?;
    Ok(Json(json!({ "modules": modules })))
}

pub async fn toggle_module(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
    payload: Result<Json<ModuleToggleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = body_or_default(payload);
    let id = parse_id(&id).map_err(ApiError::invalid_request)?;

    let module = access::set_module_enabled(&state.db, id, is_truthy(&request.enabled))
        .await?
        .ok_or_else(|| ApiError::not_found("Module not found"))?;

    tracing::info!(module_id = id, enabled = module.enabled, "Module toggled");
    Ok(Json(json!({ "module": module })))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _user: User,
) -> Result<Json<Value>, ApiError> {
    let users = credentials::list(&state.db).await?;
    Ok(Json(json!({ "users": users })))
}

pub async fn list_invites(
    State(state): State<Arc<AppState>>,
    _user: User,
) -> Result<Json<Value>, ApiError> {
    let invites = access::list_invites(&state.db).await?;
    Ok(Json(json!({ "invites": invites })))
}

pub async fn create_invite(
    State(state): State<Arc<AppState>>,
    _user: User,
    payload: Result<Json<CreateInviteRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = body_or_default(payload);
    let email = non_blank(request.email.as_deref())
        .ok_or_else(|| ApiError::new(ErrorCode::EmailRequired, "Email is required"))?;

    let invite =
        access::create_invite(&state.db, &email, role_id_from_json(request.role_id.as_ref()))
            .await?;

    Ok(Json(json!({ "invite": invite })))
}

pub async fn update_invite_status(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(id): Path<String>,
    payload: Result<Json<InviteStatusRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = body_or_default(payload);
    let id = parse_id(&id).map_err(ApiError::invalid_request)?;
    let status = non_blank(request.status.as_deref())
        .ok_or_else(|| ApiError::invalid_request("Status is required"))?;

    if !access::set_invite_status(&state.db, id, &status).await? {
        return Err(ApiError::not_found("Invite not found"));
    }
    Ok(Json(json!({ "ok": true })))
}
