//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the record endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::{store_failure, Rejection};
use crate::web::dashboard::{self, RecordView, WindowQuery};
use crate::web::middleware::CurrentUser;
use crate::web::state::AppState;
use crate::web::auth;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{OpenApi, ToSchema};
use weight_tracker_core::domain::{RecordError, WeightRecord};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::status_handler,
        create_record_handler,
        list_records_handler,
        update_record_handler,
        delete_record_handler,
        dashboard::dashboard_handler,
    ),
    components(
        schemas(
            auth::CredentialsRequest,
            auth::AuthResponse,
            auth::IdentityStatus,
            auth::SessionStatusResponse,
            CreateRecordRequest,
            UpdateRecordRequest,
            CreateRecordResponse,
            RecordView,
            dashboard::MealIntervalOption,
            dashboard::DashboardResponse,
        )
    ),
    tags(
        (name = "Weight Tracker API", description = "Record body weight, chart both users' trends and forecast them.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateRecordRequest {
    pub weight: f64,
    /// Hours since the last meal; one of 0.5, 1.0, ... 3.5.
    pub time_after_meal: f64,
    /// Defaults to the current time.
    #[schema(value_type = Option<String>, format = DateTime)]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateRecordRequest {
    pub weight: f64,
    pub time_after_meal: f64,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: DateTime<FixedOffset>,
}

#[derive(Serialize, ToSchema)]
pub struct CreateRecordResponse {
    pub id: String,
}

fn invalid(e: RecordError) -> Rejection {
    (StatusCode::BAD_REQUEST, e.to_string())
}

/// Validates submitted values as a record in the reference timezone.
fn build_record(
    state: &AppState,
    weight: f64,
    time_after_meal: f64,
    timestamp: DateTime<FixedOffset>,
) -> Result<WeightRecord, Rejection> {
    let timestamp = timestamp.with_timezone(&state.config.reference_offset);
    let record = WeightRecord::new(weight, timestamp, time_after_meal).map_err(invalid)?;
    record.validate_input().map_err(invalid)?;
    Ok(record)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Record a new weight measurement for the logged-in identity.
#[utoipa::path(
    post,
    path = "/records",
    request_body = CreateRecordRequest,
    responses(
        (status = 201, description = "Record saved", body = CreateRecordResponse),
        (status = 400, description = "Invalid weight or meal interval"),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_record_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Json(req): Json<CreateRecordRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let timestamp = req.timestamp.unwrap_or_else(|| state.now());
    let record = build_record(&state, req.weight, req.time_after_meal, timestamp)?;

    let id = state
        .records
        .create(&identity, &record)
        .await
        .map_err(|e| store_failure("save record", e))?;
    info!("Saved record {} for {}", id, identity);

    Ok((StatusCode::CREATED, Json(CreateRecordResponse { id })))
}

/// List the logged-in identity's records inside a date window, oldest first.
#[utoipa::path(
    get,
    path = "/records",
    params(
        ("start" = Option<String>, Query, description = "First day shown (YYYY-MM-DD); defaults to a week before `end`."),
        ("end" = Option<String>, Query, description = "Last day shown (YYYY-MM-DD); defaults to today.")
    ),
    responses(
        (status = 200, description = "Records in the window", body = [RecordView]),
        (status = 400, description = "Invalid window"),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_records_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Query(query): Query<WindowQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let window = dashboard::resolve_window(&query, state.now())?;
    let records = state
        .records
        .read_all(&identity)
        .await
        .map_err(|e| store_failure("load records", e))?;

    let views: Vec<RecordView> = window
        .filter(&records)
        .into_iter()
        .map(RecordView::from_record)
        .collect();
    Ok(Json(views))
}

/// Replace one of the logged-in identity's records. The record is marked as edited.
#[utoipa::path(
    put,
    path = "/records/{id}",
    request_body = UpdateRecordRequest,
    params(("id" = String, Path, description = "Record id")),
    responses(
        (status = 204, description = "Record updated"),
        (status = 400, description = "Invalid weight or meal interval"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such record"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_record_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRecordRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let record = build_record(&state, req.weight, req.time_after_meal, req.timestamp)?;

    state
        .records
        .update(&identity, &id, &record)
        .await
        .map_err(|e| store_failure("update record", e))?;
    info!("Updated record {} for {}", id, identity);

    Ok(StatusCode::NO_CONTENT)
}

/// Delete one of the logged-in identity's records.
#[utoipa::path(
    delete,
    path = "/records/{id}",
    params(("id" = String, Path, description = "Record id")),
    responses(
        (status = 204, description = "Record deleted"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such record"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_record_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    state
        .records
        .delete(&identity, &id)
        .await
        .map_err(|e| store_failure("delete record", e))?;
    info!("Deleted record {} for {}", id, identity);

    Ok(StatusCode::NO_CONTENT)
}
