use axum::{
    async_trait,
    body::Body,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ErrorCode};
use super::validation::non_blank;
use crate::config::Config;
use crate::db::{
    ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest, LoginResponse,
    ResetPasswordRequest, SignupRequest, UpdateAccountRequest, User, UserResponse,
};
use crate::services::{credentials, password_reset, sessions, AuthError};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

/// Parsed JSON body, or the type's empty value when the body is missing or
/// malformed. Required-field checks then report what is missing.
pub(super) fn body_or_default<T: Default>(payload: Result<Json<T>, JsonRejection>) -> T {
    payload.map(|Json(body)| body).unwrap_or_default()
}

/// Bearer token from the `Authorization` header, falling back to the session
/// cookie
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

fn session_cookie(config: &Config, token: String, expires_at: DateTime<Utc>) -> Cookie<'static> {
    let mut cookie = Cookie::build((config.auth.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.server.production)
        .build();

    if let Ok(expires) = time::OffsetDateTime::from_unix_timestamp(expires_at.timestamp()) {
        cookie.set_expires(expires);
    }
    cookie
}

/// Expired, empty session cookie. Sent on every logout, whether or not the
/// request carried the cookie.
fn removal_cookie(config: &Config) -> Cookie<'static> {
    Cookie::build((config.auth.cookie_name.clone(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.server.production)
        .max_age(time::Duration::ZERO)
        .expires(time::OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// Signup endpoint
pub async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let request = body_or_default(payload);

    let email = non_blank(request.email.as_deref());
    let password = request.password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::new(
            ErrorCode::EmailAndPasswordRequired,
            "Email and password are required",
        ));
    };

    let user = credentials::create(
        &state.db,
        &state.hashing,
        &email,
        request.name.as_deref(),
        &password,
    )
    .await?;

    let session = sessions::issue(&state.db, user.id, state.config.auth.session_ttl()).await?;
    let jar = jar.add(session_cookie(&state.config, session.token.clone(), session.expires_at));

    Ok((
        jar,
        Json(LoginResponse {
            user: user.into(),
            token: session.token,
        }),
    ))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let request = body_or_default(payload);

    let email = non_blank(request.email.as_deref());
    let password = request.password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::new(
            ErrorCode::EmailAndPasswordRequired,
            "Email and password are required",
        ));
    };

    let (user, session) = sessions::login(
        &state.db,
        &state.hashing,
        &email,
        &password,
        state.config.auth.session_ttl(),
    )
    .await?;

    let jar = jar.add(session_cookie(&state.config, session.token.clone(), session.expires_at));

    Ok((
        jar,
        Json(LoginResponse {
            user: user.into(),
            token: session.token,
        }),
    ))
}

/// Logout endpoint; succeeds with or without a session
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    if let Some(token) = extract_token(&headers, &state.config.auth.cookie_name) {
        sessions::logout(&state.db, &token).await?;
    }

    Ok((jar.add(removal_cookie(&state.config)), Json(json!({ "ok": true }))))
}

pub async fn me(user: User) -> Json<UserEnvelope> {
    Json(UserEnvelope { user: user.into() })
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: User,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let request = body_or_default(payload);

    let updated = credentials::update(
        &state.db,
        user.id,
        request.name.as_deref(),
        request.email.as_deref(),
    )
    .await?;

    info!(user_id = user.id, "Account updated");
    Ok(Json(UserEnvelope {
        user: updated.into(),
    }))
}

/// Always answers `{ok: true}` so the response never reveals whether an
/// account exists
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<ForgotPasswordResponse>, ApiError> {
    let request = body_or_default(payload);

    let token = match non_blank(request.email.as_deref()) {
        Some(email) => {
            password_reset::request(&state.db, &email, state.config.auth.reset_ttl()).await?
        }
        None => None,
    };

    Ok(Json(ForgotPasswordResponse {
        ok: true,
        reset_token: token.filter(|_| state.config.auth.expose_reset_token),
    }))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = body_or_default(payload);

    let token = non_blank(request.token.as_deref());
    let password = request.password.filter(|p| !p.is_empty());
    let (Some(token), Some(password)) = (token, password) else {
        return Err(ApiError::new(
            ErrorCode::TokenAndPasswordRequired,
            "Token and password are required",
        ));
    };

    password_reset::consume(&state.db, &state.hashing, &token, &password).await?;
    Ok(Json(json!({ "ok": true })))
}

/// Resolve the caller from the request headers
pub async fn get_current_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = extract_token(headers, &state.config.auth.cookie_name)
        .ok_or_else(ApiError::unauthorized)?;
    sessions::authenticate(&state.db, &token)
        .await
        .map_err(|e| match e {
            AuthError::Database(db) => ApiError::from(db),
            _ => ApiError::unauthorized(),
        })
}

/// Rejects unauthenticated requests and stashes the caller for the handler
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = get_current_user(&state, request.headers()).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extractor for getting the current authenticated user from a request
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(user.clone());
        }
        get_current_user(state, &parts.headers).await
    }
}
