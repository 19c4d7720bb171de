use flashgate_core::{CardStateRecord, CheckType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct TrackIn {
    pub cards: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct DeckQuery {
    pub deck: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct QueueQuery {
    pub deck: Option<Uuid>,
    pub max: Option<usize>,
}

#[derive(Serialize)]
pub struct CardOut {
    pub state: CardStateRecord,
    pub next_test_type: Option<CheckType>,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}
