use crate::{
    ReviewStage, EF_LAPSE_PENALTY, EF_MIN, MATURE_INTERVAL_DAYS, MAX_INTERVAL_DAYS, RECOVERY_FACTOR,
};
use chrono::{DateTime, Duration, Utc};

fn scale_interval(interval_days: u32, factor: f32) -> u32 {
    let base = interval_days.max(1) as f32;
    (base * factor).round().clamp(1.0, MAX_INTERVAL_DAYS as f32) as u32
}

/// Interval after a passed review of a young or mature card.
pub fn grown_interval(interval_days: u32, ease_factor: f32) -> u32 {
    scale_interval(interval_days, ease_factor)
}

/// Interval after a relearning card is recalled again: half the lapsed one.
pub fn recovery_interval(interval_days: u32) -> u32 {
    scale_interval(interval_days, RECOVERY_FACTOR)
}

pub fn lapsed_ease(ease_factor: f32) -> f32 {
    (ease_factor - EF_LAPSE_PENALTY).max(EF_MIN)
}

/// Stage reached by a passed review landing on `new_interval`.
pub fn stage_after_success(stage: ReviewStage, new_interval: u32) -> ReviewStage {
    let long = new_interval >= MATURE_INTERVAL_DAYS;
    match stage {
        ReviewStage::Relearning if long => ReviewStage::Mature,
        ReviewStage::Relearning => ReviewStage::Young,
        ReviewStage::Young if long => ReviewStage::Mature,
        ReviewStage::Young => ReviewStage::Young,
        ReviewStage::Mature => ReviewStage::Mature,
    }
}

pub fn due_after(now: DateTime<Utc>, interval_days: u32) -> DateTime<Utc> {
    now.checked_add_signed(Duration::days(interval_days.min(MAX_INTERVAL_DAYS) as i64))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
