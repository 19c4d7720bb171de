use crate::{CardStatus, CheckType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("storage error: {0}")]
    Storage(&'static str),
    #[error("{op} is not allowed for a card in status {status}")]
    IllegalTransition { op: &'static str, status: CardStatus },
    #[error("expected a {expected} check, got {got}")]
    OutOfOrderCheck { expected: CheckType, got: CheckType },
}
