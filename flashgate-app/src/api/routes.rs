use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use flashgate_core::{
    deck_summary, due_for_review, load_card, ready_for_testing, submit_event, track_deck,
    CardStateRecord, CardStateRepository, CoreError, DeckSummary, Event, Submission,
};

use crate::api::dto::{CardOut, DeckQuery, ErrorOut, QueueQuery, TrackIn};

const DEFAULT_QUEUE_MAX: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn CardStateRepository>,
}

pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Invalid(_)
            | CoreError::IllegalTransition { .. }
            | CoreError::OutOfOrderCheck { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorOut { error: self.0.to_string() })).into_response()
    }
}

pub async fn track(
    State(st): State<Arc<AppState>>,
    Path((user, deck)): Path<(Uuid, Uuid)>,
    Json(body): Json<TrackIn>,
) -> Result<Json<Vec<CardStateRecord>>, ApiError> {
    let states = track_deck(&*st.repo, user, deck, &body.cards, Utc::now()).await?;
    Ok(Json(states))
}

pub async fn summary(
    State(st): State<Arc<AppState>>,
    Path(user): Path<Uuid>,
    Query(q): Query<DeckQuery>,
) -> Result<Json<DeckSummary>, ApiError> {
    Ok(Json(deck_summary(&*st.repo, user, q.deck, Utc::now()).await?))
}

pub async fn due(
    State(st): State<Arc<AppState>>,
    Path(user): Path<Uuid>,
    Query(q): Query<QueueQuery>,
) -> Result<Json<Vec<CardStateRecord>>, ApiError> {
    let max = q.max.unwrap_or(DEFAULT_QUEUE_MAX);
    Ok(Json(due_for_review(&*st.repo, user, q.deck, Utc::now(), max).await?))
}

pub async fn testable(
    State(st): State<Arc<AppState>>,
    Path(user): Path<Uuid>,
    Query(q): Query<QueueQuery>,
) -> Result<Json<Vec<CardStateRecord>>, ApiError> {
    let max = q.max.unwrap_or(DEFAULT_QUEUE_MAX);
    Ok(Json(ready_for_testing(&*st.repo, user, q.deck, max).await?))
}

pub async fn get_card(
    State(st): State<Arc<AppState>>,
    Path((user, card)): Path<(Uuid, Uuid)>,
) -> Result<Json<CardOut>, ApiError> {
    let (state, next_test_type) = load_card(&*st.repo, user, card).await?;
    Ok(Json(CardOut {
        state,
        next_test_type,
    }))
}

pub async fn post_event(
    State(st): State<Arc<AppState>>,
    Path((user, card)): Path<(Uuid, Uuid)>,
    Json(event): Json<Event>,
) -> Result<Json<Submission>, ApiError> {
    Ok(Json(submit_event(&*st.repo, user, card, event, Utc::now()).await?))
}
