use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Map, Value};

use crate::errors::ApiError;
use crate::services::records_service::{UpsertOutcome, DEFAULT_LIMIT};
use crate::state::AppState;

/// Record routes:
/// - /record         (GET one, POST upsert)
/// - /record/output  (PUT output only)
/// - /records        (GET/POST most recent, paginated)
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/record", get(get_record).post(upsert_record))
        .route("/record/output", put(set_output))
        .route("/records", get(recent_from_query).post(recent_from_body))
}

type Params = HashMap<String, String>;

fn parse_json_body(body: &Bytes) -> Result<Map<String, Value>, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::bad_request("Invalid JSON: expected an object")),
        Err(e) => Err(ApiError::bad_request(format!("Invalid JSON: {e}"))),
    }
}

fn require_str(body: &Map<String, Value>, key: &str) -> Result<String, ApiError> {
    match body.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(ApiError::bad_request(format!("Missing or invalid '{key}'."))),
    }
}

/// A present, non-null payload field.
fn optional_any<'a>(body: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    body.get(key).filter(|v| !v.is_null())
}

fn upsert_response(outcome: UpsertOutcome) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "ok": true,
        "user_id": outcome.user_id,
        "match_id": outcome.match_id,
        "updated_at": outcome.updated_at,
        "created_at_set": outcome.created,
    }))
}

//
// ─────────────────────────────────────────────────────────────
// POST /record
// Create or update a record with input and optional output
// ─────────────────────────────────────────────────────────────
//
async fn upsert_record(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError>
{
    let body = parse_json_body(&body)?;
    let user_id = require_str(&body, "user_id")?;
    let match_id = require_str(&body, "match")?;

    let outcome = state
        .records
        .upsert(
            &user_id,
            &match_id,
            optional_any(&body, "input"),
            optional_any(&body, "output"),
        )
        .await
        .map_err(|e| ApiError::from_records(e, "upsert_record"))?;

    Ok(upsert_response(outcome))
}

//
// ─────────────────────────────────────────────────────────────
// GET /record?user_id=...&match=...
// Return one record or 404
// ─────────────────────────────────────────────────────────────
//
async fn get_record(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiError>
{
    let user_id = params.get("user_id").map(String::as_str).unwrap_or("");
    let match_id = params.get("match").map(String::as_str).unwrap_or("");

    if user_id.is_empty() || match_id.is_empty() {
        return Err(ApiError::bad_request("user_id and match are required"));
    }

    let record = state
        .records
        .get_one(user_id, match_id)
        .await
        .map_err(|e| ApiError::from_records(e, "fetch_record"))?;

    match record {
        Some(record) => Ok(Json(json!(record))),
        None => Err(ApiError::not_found()),
    }
}

//
// ─────────────────────────────────────────────────────────────
// PUT /record/output
// Set or replace the output only
// ─────────────────────────────────────────────────────────────
//
async fn set_output(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError>
{
    let body = parse_json_body(&body)?;
    let user_id = require_str(&body, "user_id")?;
    let match_id = require_str(&body, "match")?;
    let output = body
        .get("output")
        .ok_or_else(|| ApiError::bad_request("Missing 'output'."))?;

    let outcome = state
        .records
        .set_output(&user_id, &match_id, output)
        .await
        .map_err(|e| ApiError::from_records(e, "set_output"))?;

    Ok(upsert_response(outcome))
}

//
// ─────────────────────────────────────────────────────────────
// GET /records?user_id=...&limit=10&offset=0
// POST /records {user_id, limit, offset}
// Most recent records first
// ─────────────────────────────────────────────────────────────
//
async fn recent_from_query(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiError>
{
    let user_id = params.get("user_id").cloned().unwrap_or_default();
    let limit = params.get("limit").map(|v| Value::String(v.clone()));
    let offset = params.get("offset").map(|v| Value::String(v.clone()));

    respond_recent(&state, &user_id, limit.as_ref(), offset.as_ref()).await
}

async fn recent_from_body(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError>
{
    let body = parse_json_body(&body)?;
    let user_id = require_str(&body, "user_id")?;

    respond_recent(&state, &user_id, body.get("limit"), body.get("offset")).await
}

/// Integer from a JSON number (integral floats included) or a numeric string.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn page_params(limit: Option<&Value>, offset: Option<&Value>) -> Result<(i64, i64), ApiError> {
    let invalid =
        || ApiError::bad_request("limit must be a positive integer and offset a non-negative integer.");

    let limit = match limit.filter(|v| !v.is_null()) {
        Some(v) => as_integer(v).ok_or_else(invalid)?,
        None => DEFAULT_LIMIT,
    };
    let offset = match offset.filter(|v| !v.is_null()) {
        Some(v) => as_integer(v).ok_or_else(invalid)?,
        None => 0,
    };

    if limit <= 0 || offset < 0 {
        return Err(invalid());
    }
    Ok((limit, offset))
}

async fn respond_recent(
    state: &AppState,
    user_id: &str,
    limit: Option<&Value>,
    offset: Option<&Value>,
) -> Result<Json<Value>, ApiError>
{
    if user_id.is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }
    let (limit, offset) = page_params(limit, offset)?;

    let items = state
        .records
        .get_recent(user_id, limit, offset)
        .await
        .map_err(|e| ApiError::from_records(e, "fetch_recent_records"))?;

    Ok(Json(json!({
        "user_id": user_id,
        "count": items.len(),
        "items": items,
        "offset": offset,
        "limit": limit,
    })))
}
