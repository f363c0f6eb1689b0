//! Reservation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use booking_store::{BookingStore, Money, ReservationId, ReservationStatistics, StallId};
use domain::{AllocationError, ReservationDetails, UserProfile};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::identity::Caller;
use crate::routes::{MessageResponse, parse_uuid};
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub stall_id: String,
    pub total_amount: Money,
}

// -- Response types --

/// Public projection of the booking user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub business_name: Option<String>,
}

impl From<UserProfile> for UserSummary {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id.to_string(),
            name: profile.name,
            email: profile.email,
            business_name: profile.business_name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    #[serde(flatten)]
    pub details: ReservationDetails,
    pub user: Option<UserSummary>,
}

fn parse_reservation_id(raw: &str) -> Result<ReservationId, ApiError> {
    parse_uuid(raw, "reservation").map(ReservationId::from_uuid)
}

/// Attaches the user projection. Unknown users are rendered without one.
async fn with_user<S: BookingStore>(
    state: &AppState<S>,
    details: ReservationDetails,
) -> Result<ReservationResponse, ApiError> {
    let user = state
        .directory
        .find_user(&details.reservation.user_id)
        .await?
        .map(UserSummary::from);
    Ok(ReservationResponse { details, user })
}

async fn with_users<S: BookingStore>(
    state: &AppState<S>,
    all: Vec<ReservationDetails>,
) -> Result<Vec<ReservationResponse>, ApiError> {
    let mut responses = Vec::with_capacity(all.len());
    for details in all {
        responses.push(with_user(state, details).await?);
    }
    Ok(responses)
}

// -- Handlers --

/// POST /reservations — reserve a stall for the caller.
#[tracing::instrument(skip(state, caller, req))]
pub async fn create<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    JsonBody(req): JsonBody<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let stall_id = StallId::from_uuid(parse_uuid(&req.stall_id, "stall")?);
    let details = state
        .engine
        .reserve(&caller, stall_id, req.total_amount)
        .await?;
    let response = with_user(&state, details).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /reservations/mine — the caller's reservations, newest first.
#[tracing::instrument(skip(state, caller))]
pub async fn mine<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let all = state.engine.list_my_reservations(&caller).await?;
    Ok(Json(with_users(&state, all).await?))
}

/// GET /reservations — every reservation (admin).
#[tracing::instrument(skip(state, caller))]
pub async fn list<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let all = state.engine.list_all_reservations(&caller).await?;
    Ok(Json(with_users(&state, all).await?))
}

/// GET /reservations/statistics — counts and revenue (admin).
#[tracing::instrument(skip(state, caller))]
pub async fn statistics<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
) -> Result<Json<ReservationStatistics>, ApiError> {
    Ok(Json(state.engine.statistics(&caller).await?))
}

/// GET /reservations/{id} — one reservation (owner or admin).
#[tracing::instrument(skip(state, caller))]
pub async fn get<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation_id = parse_reservation_id(&id)?;
    let details = state.engine.get_reservation(&caller, reservation_id).await?;
    Ok(Json(with_user(&state, details).await?))
}

/// PUT /reservations/{id}/cancel — cancel and free the stall (owner or admin).
#[tracing::instrument(skip(state, caller))]
pub async fn cancel<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let reservation_id = parse_reservation_id(&id)?;
    let details = state.engine.cancel(&caller, reservation_id).await?;
    Ok(Json(with_user(&state, details).await?))
}

/// POST /reservations/{id}/send-confirmation — resend the confirmation now.
#[tracing::instrument(skip(state, caller))]
pub async fn send_confirmation<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let reservation_id = parse_reservation_id(&id)?;
    let details = state.engine.get_reservation(&caller, reservation_id).await?;
    if !details.reservation.is_active() {
        return Err(AllocationError::AlreadyCancelled(reservation_id).into());
    }

    let sent = state.dispatcher.send_now(&details).await?;
    Ok(Json(MessageResponse {
        message: format!("Confirmation sent to {}", sent.recipient_email),
    }))
}
