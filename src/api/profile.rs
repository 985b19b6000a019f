//! Profile and preference endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;

use super::auth::body_or_default;
use super::error::{ApiError, ErrorCode};
use crate::db::{ProfileResponse, UpdateProfileRequest, User};
use crate::services::{credentials, profile};
use crate::AppState;

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile_data = profile::get_profile(&state.db, user.id).await?;
    let preferences = profile::get_preferences(&state.db, user.id).await?;

    Ok(Json(ProfileResponse {
        user: user.into(),
        profile: profile_data,
        preferences,
    }))
}

/// Replace account fields, contact lists and preferences in one call
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: User,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let request = body_or_default(payload);

    let email = request
        .email
        .as_str()
        .map(credentials::normalize_email)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::new(ErrorCode::EmailRequired, "Email is required"))?;

    // The profile form always submits the name; a missing one clears it
    let name = request.name.as_str().unwrap_or("");

    let profile_data = request.profile();
    let preferences = request.preferences();
    let updated = profile::save_all(
        &state.db,
        user.id,
        Some(name),
        Some(&email),
        &profile_data,
        &preferences,
    )
    .await?;

    Ok(Json(ProfileResponse {
        user: updated.into(),
        profile: profile_data,
        preferences,
    }))
}
