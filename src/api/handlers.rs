use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use log::error;
use std::sync::Arc;
use tracing::instrument;

use crate::assignment::{assign, AssignmentError, AssignmentPolicy, AssignmentRequest};
use crate::cache::LiveViews;
use crate::geo::display_circle;
use crate::lifecycle::{classify, current_duties as displayable, partition};
use crate::map::{DutyOverlay, MapSurface, ShapeBuffer};
use crate::resolver::{available_officers, available_vehicles, resolve, resolve_vehicles};
use crate::store::{Store, StoreError};
use crate::sweep::ExpirySweeper;
use crate::utils::{activity, Activity, Config, Duty, DutyPatch, Officer};
use super::models::*;

pub struct AppStateInner {
    pub store: Arc<dyn Store>,
    pub backend: &'static str,
    pub views: LiveViews,
    pub config: Config,
    pub policy: AssignmentPolicy,
    pub sweeper: ExpirySweeper,
}

pub type AppState = Arc<AppStateInner>;

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let sweeper = if state.sweeper.is_running().await {
        "running"
    } else {
        "stopped"
    };

    let response = HealthResponse {
        status: "ok".to_string(),
        store: state.backend.to_string(),
        sweeper: sweeper.to_string(),
        timestamp: Utc::now(),
    };

    Json(response)
}

fn error_response(status: StatusCode, error: &str, message: String) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
        }),
    )
}

fn internal_error(message: String) -> ApiError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_server_error", message)
}

fn not_found(message: String) -> ApiError {
    error_response(StatusCode::NOT_FOUND, "not_found", message)
}

fn bad_request(message: String) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, "bad_request", message)
}

/// Unwraps a query string, answering a malformed one with the JSON error body.
fn query<T>(extracted: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    extracted
        .map(|Query(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn json_body<T>(extracted: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    extracted
        .map(|Json(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(id) => not_found(format!("Duty '{}' not found", id)),
        other => {
            error!("Store write failed: {}", other);
            internal_error(other.to_string())
        }
    }
}

pub async fn list_duties(
    State(state): State<AppState>,
    params: Result<Query<DutyListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query(params)?;
    let duties = state.views.duties.snapshot();

    let selected: Vec<Duty> = match query.bucket {
        DutyBucket::All => duties.iter().cloned().collect(),
        DutyBucket::Active => partition(&duties, Utc::now()).active.into_iter().cloned().collect(),
        DutyBucket::Completed => partition(&duties, Utc::now()).completed.into_iter().cloned().collect(),
    };

    Ok(Json(selected))
}

pub async fn current_duties(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let duties = state.views.duties.snapshot();
    let officers = state.views.officers.snapshot();
    let vehicles = state.views.vehicles.snapshot();
    let minimum = state.config.minimum_radius_m;

    let responses: Vec<CurrentDutyResponse> = displayable(&duties, now)
        .into_iter()
        .filter_map(|duty| {
            let (center, radius_m) = display_circle(&duty.area, minimum)?;
            Some(CurrentDutyResponse {
                id: duty.id.clone(),
                duty_type: duty.duty_type,
                status: duty.status.clone(),
                effective_status: classify(duty, now),
                officer: resolve(&duty.officer_ids, &officers),
                vehicles: resolve_vehicles(&duty.vehicle_ids, &vehicles),
                center,
                radius_m,
                start_time: duty.start_time,
                end_time: duty.end_time,
                assigned_at: duty.assigned_at,
                comments: duty.comments.clone(),
            })
        })
        .collect();

    Ok(Json(responses))
}

#[instrument(skip_all)]
pub async fn create_duty(
    State(state): State<AppState>,
    body: Result<Json<AssignmentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(body)?;
    let officers = state.views.officers.snapshot();

    let id = assign(state.store.as_ref(), &payload, &officers, &state.policy, Utc::now())
        .await
        .map_err(|e| match e {
            AssignmentError::Store(e) => store_error(e),
            invalid => bad_request(invalid.to_string()),
        })?;

    Ok((StatusCode::CREATED, Json(CreateDutyResponse { id })))
}

#[instrument(skip(state, body))]
pub async fn update_duty_status(
    State(state): State<AppState>,
    Path(duty_id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(body)?;
    if payload.status.as_str().trim().is_empty() {
        return Err(bad_request("Status must not be empty".to_string()));
    }

    let patch = DutyPatch {
        status: Some(payload.status),
        comments: payload.comments,
    };

    state.store.update(&duty_id, patch).await.map_err(store_error)?;

    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn delete_duty(
    State(state): State<AppState>,
    Path(duty_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete(&duty_id).await.map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_officers(
    State(state): State<AppState>,
    params: Result<Query<OfficerQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query(params)?;
    let roster = state.views.officers.snapshot();

    let mut officers: Vec<&Officer> = if query.available {
        available_officers(&roster)
    } else {
        roster.iter().collect()
    };

    if let Some(term) = query.q.as_deref().filter(|t| !t.trim().is_empty()) {
        officers.retain(|o| o.matches_search(term));
    }

    Ok(Json(officers.into_iter().cloned().collect::<Vec<_>>()))
}

pub async fn list_vehicles(
    State(state): State<AppState>,
    params: Result<Query<VehicleQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query(params)?;
    let vehicles = state.views.vehicles.snapshot();

    let selected: Vec<_> = if query.available {
        available_vehicles(&vehicles).into_iter().cloned().collect()
    } else {
        vehicles.iter().cloned().collect()
    };

    Ok(Json(selected))
}

pub async fn list_activities(
    State(state): State<AppState>,
    params: Result<Query<ActivityQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query(params)?;
    let all = state.views.activities.snapshot();

    let mut filtered: Vec<Activity> = match query.officer.as_deref() {
        Some(officer) => activity::for_officer(&all, officer).cloned().collect(),
        None => all.to_vec(),
    };
    if let Some(duty) = query.duty.as_deref() {
        filtered = activity::for_duty(&filtered, duty).cloned().collect();
    }

    let limit = query.limit.unwrap_or(state.config.recent_activity_limit);
    Ok(Json(activity::recent(&filtered, limit)))
}

/// The duty overlay as drawn on a fresh map, for clients that only paint.
pub async fn map_scene(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let duties = state.views.duties.snapshot();
    let officers = state.views.officers.snapshot();
    let utc_offset = state.config.utc_offset().map_err(|e| internal_error(e.to_string()))?;

    let mut surface = ShapeBuffer::new(state.config.map.center, state.config.map.zoom);
    let mut overlay = DutyOverlay::new(state.config.minimum_radius_m, utc_offset);
    let centers = overlay.render(&mut surface, &duties, &officers, Utc::now());

    if centers.len() > 1 {
        surface.fit_to_bounds(&centers);
    }

    Ok(Json(surface.scene()))
}

#[instrument(skip(state))]
pub async fn run_sweep(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sweeper.sweep_now().await))
}
