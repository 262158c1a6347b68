//! HTTP routes for the server.

use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use reportwatch_core::{FailureKind, ReportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/getFiles", get(get_files))
        .route("/search", post(search))
        .route("/details", get(details))
        .route("/history", get(history))
        .route("/edit", post(edit))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
    code: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

impl ApiError {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(msg, "bad_request")))
    }

    fn from_report(err: ReportError) -> (StatusCode, Json<Self>) {
        let kind = err.kind();
        let status = match kind {
            FailureKind::FileNotFound | FailureKind::FailEditNotFound => StatusCode::NOT_FOUND,
            FailureKind::InvalidFileName => StatusCode::BAD_REQUEST,
            FailureKind::FailPersist => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::FailTimeout => StatusCode::GATEWAY_TIMEOUT,
            FailureKind::FailRead | FailureKind::FailWrite | FailureKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(code = %kind, error = %err, "Request failed");
        }
        (status, Json(Self::new(err.to_string(), kind.as_str())))
    }
}

/// Text of a non-empty parameter, or `None`.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// A caller identity with surrounding whitespace removed, or `None` if blank.
fn identity(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Render a JSON cell value as the text stored in a file.
fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
        "watch": state.service.watch().stats(),
    }))
}

/// List every tabular file under the root.
async fn get_files(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let files = state
        .service
        .list_files()
        .await
        .map_err(ApiError::from_report)?;
    Ok(Json(files))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: Option<String>,
    email: Option<String>,
    #[serde(default)]
    selected_files: Option<Vec<String>>,
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(query), Some(email)) = (present(req.query), identity(req.email)) else {
        return Err(ApiError::bad_request(
            "a search query and an identity are required",
        ));
    };

    let results = state
        .service
        .search(&query, req.selected_files.as_deref())
        .await
        .map_err(ApiError::from_report)?;

    info!(by = %email, query = %query, files = results.len(), "Search");
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailsQuery {
    file_name: Option<String>,
    query: Option<String>,
}

async fn details(
    State(state): State<AppState>,
    Query(params): Query<DetailsQuery>,
) -> ApiResult<impl IntoResponse> {
    let (Some(file_name), Some(query)) = (present(params.file_name), present(params.query)) else {
        return Err(ApiError::bad_request("fileName and query are required"));
    };

    let matches = state
        .service
        .details(&file_name, &query)
        .await
        .map_err(ApiError::from_report)?;
    Ok(Json(matches))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    file_name: Option<String>,
    row_index: Option<String>,
    column_name: Option<String>,
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let (Some(file_name), Some(row_index), Some(column_name)) = (
        present(params.file_name),
        present(params.row_index),
        present(params.column_name),
    ) else {
        return Err(ApiError::bad_request(
            "fileName, rowIndex and columnName are required",
        ));
    };
    let row_index: usize = row_index
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid rowIndex: {}", row_index)))?;

    let events = state
        .service
        .history(&file_name, row_index, &column_name)
        .await
        .map_err(ApiError::from_report)?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditRequest {
    file_name: Option<String>,
    row_index: Option<usize>,
    column_name: Option<String>,
    #[serde(default)]
    new_value: Value,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditResponse {
    message: &'static str,
    #[serde(flatten)]
    outcome: reportwatch_core::EditOutcome,
}

async fn edit(
    State(state): State<AppState>,
    Json(req): Json<EditRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(file_name), Some(row_index), Some(column_name), Some(email)) = (
        present(req.file_name),
        req.row_index,
        present(req.column_name),
        identity(req.email),
    ) else {
        return Err(ApiError::bad_request(
            "fileName, rowIndex, columnName and email are required",
        ));
    };

    let outcome = state
        .service
        .edit(
            &file_name,
            row_index,
            &column_name,
            &cell_text(req.new_value),
            &email,
        )
        .await
        .map_err(ApiError::from_report)?;

    let message = if outcome.event.is_some() {
        "Change saved"
    } else {
        "Value unchanged"
    };
    Ok(Json(EditResponse { message, outcome }))
}
