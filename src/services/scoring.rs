//! Points awarded for a single answer.

use std::time::{Duration, SystemTime};

/// Points for picking the correct definition.
pub const CORRECT_POINTS: u32 = 100;
/// Maximum bonus for answering instantly; decays linearly to zero at the deadline.
pub const MAX_TIME_POINTS: u32 = 50;

/// Score one answer given the time elapsed since the round started.
///
/// Late answers earn nothing regardless of correctness. Everything is computed in
/// integer milliseconds so the result never depends on floating point rounding.
pub fn score_answer(
    submitted_index: u32,
    correct_index: u32,
    elapsed: Duration,
    seconds_per_question: u32,
) -> u32 {
    let allowed_ms = u128::from(seconds_per_question) * 1_000;
    let elapsed_ms = elapsed.as_millis();
    if allowed_ms == 0 || elapsed_ms > allowed_ms {
        return 0;
    }

    let correct_points = if submitted_index == correct_index {
        CORRECT_POINTS
    } else {
        0
    };
    let remaining_ms = allowed_ms - elapsed_ms;
    let time_points = (u128::from(MAX_TIME_POINTS) * remaining_ms / allowed_ms) as u32;

    correct_points + time_points.min(MAX_TIME_POINTS)
}

/// Time elapsed between the round start and the answer. Clock skew counts as zero.
pub fn elapsed_since(round_start: SystemTime, received: SystemTime) -> Duration {
    received
        .duration_since(round_start)
        .unwrap_or(Duration::ZERO)
}
