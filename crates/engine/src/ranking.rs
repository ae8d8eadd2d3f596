//! Most-polluted ranking across a set of checked places.

use common::{AqiScore, Place, PollutantSample};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceReading {
    pub place: Place,
    pub score: AqiScore,
    pub sample: PollutantSample,
}

/// Highest AQI first, at most `limit` entries.
pub fn rank_most_polluted(mut readings: Vec<PlaceReading>, limit: usize) -> Vec<PlaceReading> {
    readings.sort_by(|a, b| b.score.value.total_cmp(&a.score.value));
    readings.truncate(limit);
    readings
}
