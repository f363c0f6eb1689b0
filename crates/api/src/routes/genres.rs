//! Genre endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use booking_store::{BookingStore, Genre, GenreId};
use domain::{CreateGenre, GenreList, UpdateGenre};

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::identity::Caller;
use crate::routes::{MessageResponse, parse_uuid};
use crate::state::AppState;

fn parse_genre_id(raw: &str) -> Result<GenreId, ApiError> {
    parse_uuid(raw, "genre").map(GenreId::from_uuid)
}

/// GET /genres — every genre, ordered by name.
#[tracing::instrument(skip(state))]
pub async fn list<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<GenreList>, ApiError> {
    Ok(Json(state.genres.list_genres().await?))
}

/// GET /genres/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Genre>, ApiError> {
    let genre_id = parse_genre_id(&id)?;
    Ok(Json(state.genres.get_genre(genre_id).await?))
}

/// POST /genres — add a genre (admin).
#[tracing::instrument(skip(state, caller, cmd))]
pub async fn create<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    JsonBody(cmd): JsonBody<CreateGenre>,
) -> Result<(StatusCode, Json<Genre>), ApiError> {
    let genre = state.genres.create_genre(&caller, cmd).await?;
    Ok((StatusCode::CREATED, Json(genre)))
}

/// PUT /genres/{id} — rename or describe a genre (admin).
#[tracing::instrument(skip(state, caller, cmd))]
pub async fn update<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    JsonBody(cmd): JsonBody<UpdateGenre>,
) -> Result<Json<Genre>, ApiError> {
    let genre_id = parse_genre_id(&id)?;
    Ok(Json(state.genres.update_genre(&caller, genre_id, cmd).await?))
}

/// DELETE /genres/{id} — remove a genre (admin).
#[tracing::instrument(skip(state, caller))]
pub async fn delete<S: BookingStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let genre_id = parse_genre_id(&id)?;
    state.genres.delete_genre(&caller, genre_id).await?;
    Ok(Json(MessageResponse {
        message: "Genre deleted successfully".to_string(),
    }))
}
