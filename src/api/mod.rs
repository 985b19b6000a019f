mod access;
pub mod auth;
mod documents;
pub mod error;
mod profile;
pub mod rate_limit;
mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential routes (public, tighter rate limit)
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ))
        // Logout works with or without a valid session
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me).patch(auth::update_me));

    // Protected API routes
    let api_routes = Router::new()
        // Profile
        .route("/profile", get(profile::get_profile).put(profile::update_profile))
        // Access management
        .route("/access/roles", get(access::list_roles).post(access::create_role))
        .route(
            "/access/roles/:id",
            patch(access::rename_role).delete(access::delete_role),
        )
        .route("/access/modules", get(access::list_modules))
        .route("/access/modules/:id", patch(access::toggle_module))
        .route("/access/users", get(access::list_users))
        .route(
            "/access/invites",
            get(access::list_invites).post(access::create_invite),
        )
        .route("/access/invites/:id", patch(access::update_invite_status))
        // Documents
        .route(
            "/pipeline/board",
            get(documents::get_board).put(documents::put_board),
        )
        .route(
            "/pipeline/data",
            get(documents::get_pipeline_data).put(documents::put_pipeline_data),
        )
        .route(
            "/finance/data",
            get(documents::get_finance_data).put(documents::put_finance_data),
        )
        .route(
            "/storage/:key",
            get(documents::get_storage).put(documents::put_storage),
        )
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Credentialed CORS. Outside production any origin is mirrored back.
fn cors_layer(config: &Config) -> CorsLayer {
    let origins = if config.server.production {
        let allowed: Vec<HeaderValue> = config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(allowed)
    } else {
        AllowOrigin::mirror_request()
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let pool = db::init_memory().await.unwrap();
        let state = AppState::for_tests(Config::default(), pool);
        create_router(Arc::new(state))
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn signup(app: &Router, email: &str, password: &str) -> String {
        let response = call(
            app,
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({ "name": "Ana", "email": email, "password": password })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let response = call(&app, "GET", "/api/health", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_signup_login_and_me() {
        let app = test_app().await;

        let response = call(
            &app,
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({ "name": " Ana ", "email": "Ana@X.io", "password": "pw" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("sc_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        let body = json_body(response).await;
        assert_eq!(body["user"]["email"], "ana@x.io");
        assert_eq!(body["user"]["name"], "Ana");

        let response = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ana@x.io", "password": "pw" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = json_body(response).await["token"].as_str().unwrap().to_string();

        let response = call(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user"]["email"], "ana@x.io");
    }

    #[tokio::test]
    async fn test_session_cookie_authenticates() {
        let app = test_app().await;
        let token = signup(&app, "a@x.io", "pw").await;

        let request = Request::builder()
            .uri("/api/auth/me")
            .header("Cookie", format!("sc_session={}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_validation_errors() {
        let app = test_app().await;

        let response = call(&app, "POST", "/api/auth/signup", None, Some(json!({ "email": "a@x.io" }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "email_and_password_required"
        );

        let response = call(&app, "POST", "/api/auth/login", None, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        signup(&app, "a@x.io", "pw").await;
        let response = call(
            &app,
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({ "email": "A@X.IO", "password": "other" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error"], "email_in_use");

        let response = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "a@x.io", "password": "wrong" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "invalid_credentials");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = test_app().await;

        for uri in ["/api/auth/me", "/api/profile", "/api/access/roles", "/api/finance/data"] {
            let response = call(&app, "GET", uri, None, None).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(json_body(response).await["error"], "unauthorized");
        }

        let response = call(&app, "GET", "/api/auth/me", Some("bogus"), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let app = test_app().await;
        let token = signup(&app, "a@x.io", "pw").await;

        let response = call(&app, "POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cleared = response
            .headers()
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cleared.starts_with("sc_session=;"));
        assert!(cleared.contains("Max-Age=0"));

        let response = call(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Without any token logout still succeeds and still clears the cookie
        let response = call(&app, "POST", "/api/auth/logout", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("set-cookie").is_some());
    }

    #[tokio::test]
    async fn test_update_me() {
        let app = test_app().await;
        let token = signup(&app, "a@x.io", "pw").await;
        signup(&app, "b@x.io", "pw").await;

        let response = call(
            &app,
            "PATCH",
            "/api/auth/me",
            Some(&token),
            Some(json!({ "name": "Ana Clara" })),
        )
        .await;
        let body = json_body(response).await;
        assert_eq!(body["user"]["name"], "Ana Clara");
        assert_eq!(body["user"]["email"], "a@x.io");

        let response = call(
            &app,
            "PATCH",
            "/api/auth/me",
            Some(&token),
            Some(json!({ "email": "B@x.io" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_single_session_conflict_over_http() {
        let app = test_app().await;
        let token = signup(&app, "a@x.io", "pw").await;

        let response = call(
            &app,
            "PUT",
            "/api/profile",
            Some(&token),
            Some(json!({ "email": "a@x.io", "preferences": { "singleSession": true } })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let login = json!({ "email": "a@x.io", "password": "pw" });
        let response = call(&app, "POST", "/api/auth/login", None, Some(login.clone())).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error"], "session_conflict");

        let response = call(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(&app, "POST", "/api/auth/login", None, Some(login)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forgot_password_does_not_reveal_accounts() {
        let app = test_app().await;
        signup(&app, "a@x.io", "pw").await;

        let response = call(
            &app,
            "POST",
            "/api/auth/forgot-password",
            None,
            Some(json!({ "email": "ghost@x.io" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "ok": true }));

        let response = call(
            &app,
            "POST",
            "/api/auth/forgot-password",
            None,
            Some(json!({ "email": "a@x.io" })),
        )
        .await;
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);
        assert!(body["resetToken"].is_string());
    }

    #[tokio::test]
    async fn test_forgot_password_hides_token_when_not_exposed() {
        let pool = db::init_memory().await.unwrap();
        let mut config = Config::default();
        config.auth.expose_reset_token = false;
        let app = create_router(Arc::new(AppState::for_tests(config, pool)));
        signup(&app, "a@x.io", "pw").await;

        let known = call(
            &app,
            "POST",
            "/api/auth/forgot-password",
            None,
            Some(json!({ "email": "a@x.io" })),
        )
        .await;
        let unknown = call(
            &app,
            "POST",
            "/api/auth/forgot-password",
            None,
            Some(json!({ "email": "ghost@x.io" })),
        )
        .await;
        assert_eq!(json_body(known).await, json_body(unknown).await);
    }

    #[tokio::test]
    async fn test_reset_password_flow() {
        let app = test_app().await;
        let session = signup(&app, "a@x.io", "old").await;

        let response = call(
            &app,
            "POST",
            "/api/auth/forgot-password",
            None,
            Some(json!({ "email": "a@x.io" })),
        )
        .await;
        let reset_token = json_body(response).await["resetToken"]
            .as_str()
            .unwrap()
            .to_string();

        let response = call(&app, "POST", "/api/auth/reset-password", None, Some(json!({ "token": reset_token }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "token_and_password_required"
        );

        let reset = json!({ "token": reset_token, "password": "new" });
        let response = call(&app, "POST", "/api/auth/reset-password", None, Some(reset.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = call(&app, "GET", "/api/auth/me", Some(&session), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(&app, "POST", "/api/auth/reset-password", None, Some(reset)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_token");

        let response = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "a@x.io", "password": "new" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let app = test_app().await;
        let token = signup(&app, "a@x.io", "pw").await;

        let response = call(&app, "GET", "/api/profile", Some(&token), None).await;
        let body = json_body(response).await;
        assert_eq!(body["preferences"]["emailNotifications"], true);
        assert_eq!(body["preferences"]["singleSession"], false);
        assert_eq!(body["preferences"]["language"], "pt-BR");
        assert_eq!(body["profile"]["phones"], json!([]));

        let response = call(
            &app,
            "PUT",
            "/api/profile",
            Some(&token),
            Some(json!({
                "name": "Ana",
                "email": "a@x.io",
                "team": " Vendas ",
                "phones": ["  11 9999 ", ""],
                "preferences": { "moduleFinance": true, "language": "en-US" }
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(call(&app, "GET", "/api/profile", Some(&token), None).await).await;
        assert_eq!(body["profile"]["team"], "Vendas");
        assert_eq!(body["profile"]["phone"], "11 9999");
        assert_eq!(body["profile"]["phones"], json!(["11 9999"]));
        assert_eq!(body["preferences"]["moduleFinance"], true);
        assert_eq!(body["preferences"]["modulePipeline"], false);
        assert_eq!(body["preferences"]["language"], "en-US");

        let response = call(&app, "PUT", "/api/profile", Some(&token), Some(json!({ "name": "Ana" }))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "email_required");
    }

    #[tokio::test]
    async fn test_access_management() {
        let app = test_app().await;
        let token = signup(&app, "a@x.io", "pw").await;
        let t = Some(token.as_str());

        let body = json_body(call(&app, "GET", "/api/access/roles", t, None).await).await;
        assert_eq!(body["roles"][0]["name"], "Administrador");
        assert_eq!(body["roles"][0]["members"], 1);

        let response = call(&app, "POST", "/api/access/roles", t, Some(json!({ "name": "  " }))).await;
        assert_eq!(json_body(response).await["error"], "name_required");

        let body = json_body(
            call(&app, "POST", "/api/access/roles", t, Some(json!({ "name": "Financeiro" }))).await,
        )
        .await;
        assert_eq!(body["members"], 0);
        let role_id = body["id"].as_i64().unwrap();

        let response = call(&app, "POST", "/api/access/roles", t, Some(json!({ "name": "Financeiro" }))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["error"], "conflict");

        let uri = format!("/api/access/roles/{}", role_id);
        let response = call(&app, "PATCH", &uri, t, Some(json!({ "name": "Financas" }))).await;
        assert_eq!(json_body(response).await["name"], "Financas");

        let response = call(&app, "PATCH", "/api/access/roles/abc", t, Some(json!({ "name": "x" }))).await;
        assert_eq!(json_body(response).await["error"], "invalid_request");

        let response = call(&app, "DELETE", &uri, t, None).await;
        assert_eq!(json_body(response).await, json!({ "ok": true }));

        let body = json_body(call(&app, "GET", "/api/access/modules", t, None).await).await;
        let module_id = body["modules"][0]["id"].as_i64().unwrap();
        let uri = format!("/api/access/modules/{}", module_id);
        let body = json_body(call(&app, "PATCH", &uri, t, Some(json!({ "enabled": false }))).await).await;
        assert_eq!(body["module"]["enabled"], false);

        let response = call(&app, "PATCH", "/api/access/modules/999", t, Some(json!({ "enabled": true }))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = json_body(call(&app, "GET", "/api/access/users", t, None).await).await;
        assert_eq!(body["users"][0]["email"], "a@x.io");
        assert!(body["users"][0].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_invites() {
        let app = test_app().await;
        let token = signup(&app, "a@x.io", "pw").await;
        let t = Some(token.as_str());

        let response = call(&app, "POST", "/api/access/invites", t, Some(json!({ "roleId": 1 }))).await;
        assert_eq!(json_body(response).await["error"], "email_required");

        let body = json_body(
            call(
                &app,
                "POST",
                "/api/access/invites",
                t,
                Some(json!({ "email": " New@X.io ", "roleId": "2" })),
            )
            .await,
        )
        .await;
        assert_eq!(body["invite"]["email"], "new@x.io");
        assert_eq!(body["invite"]["roleId"], 2);
        assert_eq!(body["invite"]["status"], "Pendente");
        let invite_id = body["invite"]["id"].as_i64().unwrap();

        let uri = format!("/api/access/invites/{}", invite_id);
        let response = call(&app, "PATCH", &uri, t, Some(json!({ "status": "" }))).await;
        assert_eq!(json_body(response).await["error"], "invalid_request");

        let response = call(&app, "PATCH", &uri, t, Some(json!({ "status": "Aceito" }))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(call(&app, "GET", "/api/access/invites", t, None).await).await;
        assert_eq!(body["invites"][0]["status"], "Aceito");
        assert_eq!(body["invites"][0]["roleName"], "Gestor");
    }

    #[tokio::test]
    async fn test_finance_data_round_trip() {
        let app = test_app().await;
        let token = signup(&app, "a@x.io", "pw").await;
        let other = signup(&app, "b@x.io", "pw").await;

        let body = json_body(call(&app, "GET", "/api/finance/data", Some(&token), None).await).await;
        assert_eq!(body, json!({ "data": null }));

        let finance = json!({ "expenses": [{ "id": "e1", "amount": 10 }], "categories": [] });
        let response = call(&app, "PUT", "/api/finance/data", Some(&token), Some(json!({ "data": finance.clone() }))).await;
        assert_eq!(json_body(response).await, json!({ "ok": true }));

        let body = json_body(call(&app, "GET", "/api/finance/data", Some(&token), None).await).await;
        assert_eq!(body["data"], finance);

        let body = json_body(call(&app, "GET", "/api/finance/data", Some(&other), None).await).await;
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn test_pipeline_board_is_shared_and_wrapped() {
        let app = test_app().await;
        let a = signup(&app, "a@x.io", "pw").await;
        let b = signup(&app, "b@x.io", "pw").await;

        let columns = json!([{ "id": "leads", "title": "Leads", "deals": [] }]);
        call(&app, "PUT", "/api/pipeline/board", Some(&a), Some(columns.clone())).await;

        let body = json_body(call(&app, "GET", "/api/pipeline/board", Some(&b), None).await).await;
        assert_eq!(body["pipeline"], json!({ "columns": columns }));
    }

    #[tokio::test]
    async fn test_user_storage() {
        let app = test_app().await;
        let token = signup(&app, "a@x.io", "pw").await;

        let uri = "/api/storage/finance_table_layout_v1";
        call(&app, "PUT", uri, Some(&token), Some(json!({ "data": { "dense": true } }))).await;
        let body = json_body(call(&app, "GET", uri, Some(&token), None).await).await;
        assert_eq!(body["data"], json!({ "dense": true }));

        let response = call(&app, "GET", "/api/storage/bad%20key", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_auth_routes_are_rate_limited() {
        let pool = db::init_memory().await.unwrap();
        let mut config = Config::default();
        config.rate_limit.auth_requests_per_window = 2;
        let app = create_router(Arc::new(AppState::for_tests(config, pool)));

        for _ in 0..2 {
            let response = call(&app, "POST", "/api/auth/login", None, None).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        let response = call(&app, "POST", "/api/auth/login", None, None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
        assert_eq!(json_body(response).await["error"], "too_many_requests");
    }
}
