//! Stall browsing and administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use booking_store::{
    BookingStore, Stall, StallFilter, StallId, StallSize, StallStatistics, StallStatus,
};
use domain::{CreateStall, StallDetails, UpdateStall};
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::{JsonBody, QueryParams};
use crate::identity::Caller;
use crate::routes::parse_uuid;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct StallListQuery {
    pub size: Option<String>,
    pub status: Option<String>,
}

impl StallListQuery {
    fn to_filter(&self) -> Result<StallFilter, ApiError> {
        let mut filter = StallFilter::new();
        if let Some(size) = &self.size {
            let size: StallSize = size
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("Invalid size: {size}")))?;
            filter = filter.size(size);
        }
        if let Some(status) = &self.status {
            let status: StallStatus = status
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("Invalid status: {status}")))?;
            filter = filter.status(status);
        }
        Ok(filter)
    }
}

fn parse_stall_id(raw: &str) -> Result<StallId, ApiError> {
    parse_uuid(raw, "stall").map(StallId::from_uuid)
}

// -- Handlers --

/// GET /stalls — list stalls, optionally filtered by size and status.
#[tracing::instrument(skip(state))]
pub async fn list<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    QueryParams(query): QueryParams<StallListQuery>,
) -> Result<Json<Vec<Stall>>, ApiError> {
    let filter = query.to_filter()?;
    Ok(Json(state.catalog.list_stalls(&filter).await?))
}

/// GET /stalls/available — list stalls that can be booked now.
#[tracing::instrument(skip(state))]
pub async fn available<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Stall>>, ApiError> {
    Ok(Json(state.catalog.list_available().await?))
}

/// GET /stalls/statistics — occupancy counts (admin).
#[tracing::instrument(skip(state, caller))]
pub async fn statistics<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
) -> Result<Json<StallStatistics>, ApiError> {
    Ok(Json(state.catalog.statistics(&caller).await?))
}

/// GET /stalls/{id} — one stall with its active reservation.
#[tracing::instrument(skip(state))]
pub async fn get<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StallDetails>, ApiError> {
    let stall_id = parse_stall_id(&id)?;
    Ok(Json(state.catalog.get_stall(stall_id).await?))
}

/// POST /stalls — add a stall (admin).
#[tracing::instrument(skip(state, caller, cmd))]
pub async fn create<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    JsonBody(cmd): JsonBody<CreateStall>,
) -> Result<(StatusCode, Json<Stall>), ApiError> {
    let stall = state.catalog.create_stall(&caller, cmd).await?;
    Ok((StatusCode::CREATED, Json(stall)))
}

/// PUT /stalls/{id} — edit a stall or toggle maintenance (admin).
#[tracing::instrument(skip(state, caller, cmd))]
pub async fn update<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    JsonBody(cmd): JsonBody<UpdateStall>,
) -> Result<Json<Stall>, ApiError> {
    let stall_id = parse_stall_id(&id)?;
    Ok(Json(state.catalog.update_stall(&caller, stall_id, cmd).await?))
}

/// DELETE /stalls/{id} — remove a stall (admin).
#[tracing::instrument(skip(state, caller))]
pub async fn delete<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let stall_id = parse_stall_id(&id)?;
    state.catalog.delete_stall(&caller, stall_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
