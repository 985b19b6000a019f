//! JSON document endpoints: the shared pipeline board, per-user pipeline and
//! finance data, and keyed user storage.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::validate_storage_key;
use crate::db::{DocumentKey, User};
use crate::AppState;

/// The value to store for a PUT body: its `data` field when present and not
/// null, otherwise the body itself
pub fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) if !data.is_null() => data,
            Some(data) => {
                map.insert("data".to_string(), data);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

/// Board documents always carry a `columns` field
pub fn normalize_board(value: Value) -> Value {
    let has_columns = value
        .get("columns")
        .map(|columns| !columns.is_null())
        .unwrap_or(false);
    if has_columns {
        return value;
    }

    let mut board = Map::new();
    board.insert("columns".to_string(), value);
    Value::Object(board)
}

async fn load(state: &AppState, key: &DocumentKey) -> Result<Value, ApiError> {
    Ok(state.documents.get(key).await?.unwrap_or(Value::Null))
}

async fn store(state: &AppState, key: &DocumentKey, value: &Value) -> Result<Json<Value>, ApiError> {
    state.documents.put(key, value).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn get_board(
    State(state): State<Arc<AppState>>,
    _user: User,
) -> Result<Json<Value>, ApiError> {
    let pipeline = load(&state, &DocumentKey::PipelineBoard).await?;
    Ok(Json(json!({ "pipeline": pipeline })))
}

pub async fn put_board(
    State(state): State<Arc<AppState>>,
    user: User,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let board = normalize_board(unwrap_data(body));

    tracing::debug!(user_id = user.id, "Pipeline board replaced");
    store(&state, &DocumentKey::PipelineBoard, &board).await
}

pub async fn get_pipeline_data(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Value>, ApiError> {
    let data = load(&state, &DocumentKey::PipelineData(user.id)).await?;
    Ok(Json(json!({ "data": data })))
}

pub async fn put_pipeline_data(
    State(state): State<Arc<AppState>>,
    user: User,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    store(&state, &DocumentKey::PipelineData(user.id), &unwrap_data(body)).await
}

pub async fn get_finance_data(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Value>, ApiError> {
    let data = load(&state, &DocumentKey::FinanceData(user.id)).await?;
    Ok(Json(json!({ "data": data })))
}

pub async fn put_finance_data(
    State(state): State<Arc<AppState>>,
    user: User,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    store(&state, &DocumentKey::FinanceData(user.id), &unwrap_data(body)).await
}

fn storage_key(user: &User, key: String) -> Result<DocumentKey, ApiError> {
    validate_storage_key(&key).map_err(ApiError::invalid_request)?;
    Ok(DocumentKey::UserStorage {
        user_id: user.id,
        key,
    })
}

pub async fn get_storage(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let key = storage_key(&user, key)?;
    let data = load(&state, &key).await?;
    Ok(Json(json!({ "data": data })))
}

pub async fn put_storage(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(key): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let key = storage_key(&user, key)?;
    let Json(body) = payload?;
    store(&state, &key, &unwrap_data(body)).await
}
