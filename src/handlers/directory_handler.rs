// src/handlers/directory_handler.rs
use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::RideLinkError;
use crate::models::driver::{DriverRegistration, DriverResponse, DriverUpdate};
use crate::models::feedback::{Feedback, FeedbackRecord};
use crate::models::location::LocationFix;
use crate::models::trip::{CreateTripRequest, Page, PageRequest, TripResponse};
use crate::services::driver_service::DriverOperations;
use crate::services::feedback_service::FeedbackOperations;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        let defaults = PageRequest::default();
        PageRequest {
            offset: params.offset.unwrap_or(defaults.offset),
            limit: params.limit.unwrap_or(defaults.limit),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

// --- Trips ---

pub async fn create_trip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTripRequest>,
) -> Result<Json<TripResponse>, RideLinkError> {
    let trip = state.registry.create(&request.rider_id, request.stops).await?;
    Ok(Json(trip.into()))
}

pub async fn all_trips(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Json<Page<TripResponse>> {
    Json(state.directory.all_trips(params.into()).await)
}

pub async fn active_trips(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Json<Page<TripResponse>> {
    Json(state.directory.active_trips(params.into()).await)
}

pub async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripResponse>, RideLinkError> {
    Ok(Json(state.directory.trip(&trip_id).await?))
}

pub async fn trip_candidate(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Result<Json<serde_json::Value>, RideLinkError> {
    let candidate = state.directory.candidate_for_trip(&trip_id).await?;
    Ok(Json(json!({ "trip_id": trip_id, "driver_id": candidate })))
}

pub async fn trips_for_rider(
    State(state): State<Arc<AppState>>,
    Path(rider_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Json<Page<TripResponse>> {
    Json(state.directory.trips_for_rider(&rider_id, params.into()).await)
}

pub async fn active_trip_for_rider(
    State(state): State<Arc<AppState>>,
    Path(rider_id): Path<String>,
) -> Result<Json<TripResponse>, RideLinkError> {
    state
        .directory
        .active_trip_for_rider(&rider_id)
        .await
        .map(Json)
        .ok_or_else(|| RideLinkError::not_found(format!("no active trip for rider {}", rider_id)))
}

pub async fn trips_for_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Json<Page<TripResponse>> {
    Json(state.directory.trips_for_driver(&driver_id, params.into()).await)
}

pub async fn active_trip_for_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Result<Json<TripResponse>, RideLinkError> {
    state
        .directory
        .active_trip_for_driver(&driver_id)
        .await
        .map(Json)
        .ok_or_else(|| {
            RideLinkError::not_found(format!("no active trip for driver {}", driver_id))
        })
}

// --- Drivers ---

pub async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(registration): Json<DriverRegistration>,
) -> Result<Json<DriverResponse>, RideLinkError> {
    Ok(Json(state.drivers.register_driver(registration).await?))
}

pub async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<DriverResponse>>, RideLinkError> {
    let page = state.directory.clamp(params.into());
    Ok(Json(state.drivers.list_drivers(page).await?))
}

pub async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Result<Json<DriverResponse>, RideLinkError> {
    state
        .drivers
        .get_driver(&driver_id)
        .await?
        .map(Json)
        .ok_or_else(|| RideLinkError::driver_not_found(&driver_id))
}

pub async fn get_driver_by_mobile(
    State(state): State<Arc<AppState>>,
    Path(mobile): Path<String>,
) -> Result<Json<DriverResponse>, RideLinkError> {
    state
        .drivers
        .get_driver_by_mobile(&mobile)
        .await?
        .map(Json)
        .ok_or_else(|| RideLinkError::driver_not_found(&mobile))
}

pub async fn update_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
    Json(update): Json<DriverUpdate>,
) -> Result<Json<DriverResponse>, RideLinkError> {
    Ok(Json(state.drivers.update_driver(&driver_id, update).await?))
}

pub async fn delete_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Result<Json<serde_json::Value>, RideLinkError> {
    state.drivers.delete_driver(&driver_id).await?;
    Ok(Json(json!({ "deleted": driver_id })))
}

// --- Locations ---

pub async fn driver_locations(
    State(state): State<Arc<AppState>>,
) -> Json<HashMap<String, LocationFix>> {
    Json(state.directory.driver_locations().await)
}

pub async fn driver_history(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<LocationFix>> {
    Json(state.directory.driver_history(&driver_id, params.from, params.to).await)
}

// --- Feedback ---

pub async fn provide_feedback(
    State(state): State<Arc<AppState>>,
    Json(feedback): Json<Feedback>,
) -> Result<Json<FeedbackRecord>, RideLinkError> {
    Ok(Json(state.feedback.provide_feedback(feedback).await?))
}
