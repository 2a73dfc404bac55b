//! Elo rating arithmetic shared by the SCORING update and the `%ELO` /
//! admin `rating` displays.

/// Expected score for the player rated `rating_a` facing `rating_b`.
pub fn expectancy(rating_a: i64, rating_b: i64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) as f64 / 400.0))
}

/// New rating for the player rated `rating_a`, given the observed
/// `result` (1.0 win, 0.5 draw, 0.0 loss) against `rating_b` and the
/// K-factor `weight`. Each side is computed independently and
/// round-to-nearest, matching the original's per-side formula rather
/// than deriving one side from `-delta`.
pub fn updated_rating(rating_a: i64, rating_b: i64, result: f64, weight: i64) -> i64 {
    let e = expectancy(rating_a, rating_b);
    (rating_a as f64 + weight as f64 * (result - e)).round() as i64
}

/// Decrement an Elo K-factor, floored so it never drops below the floor.
pub fn decay_weight(weight: i64, decrement: i64, floor: i64) -> i64 {
    (weight - decrement).max(floor)
}
