//! Forecast labelling and a persistence baseline forecaster.

use chrono::Duration;
use common::aqi::{aqi_from_pm25, category_for, AQI_MAX};
use common::provider::ForecastProvider;
use common::{ForecastPoint, LabelledForecast, PollutantSample, Result};

/// Attach a category to each point; values are passed through untouched.
pub fn label_forecast(points: &[ForecastPoint]) -> Vec<LabelledForecast> {
    points
        .iter()
        .map(|p| LabelledForecast {
            date: p.date,
            predicted_aqi: p.predicted_aqi,
            confidence: p.confidence,
            category: category_for(p.predicted_aqi),
        })
        .collect()
}

/// Assumes today's air persists, drifting upward by a fixed amount per day.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceForecaster {
    pub daily_drift: f64,
    pub confidence_decay: f64,
    pub confidence_floor: f64,
}

impl Default for PersistenceForecaster {
    fn default() -> Self {
        Self {
            daily_drift: 2.0,
            confidence_decay: 0.05,
            confidence_floor: 0.5,
        }
    }
}

impl ForecastProvider for PersistenceForecaster {
    fn forecast(&self, sample: &PollutantSample, horizon_days: u32) -> Result<Vec<ForecastPoint>> {
        let base = aqi_from_pm25(sample.pm25)?;
        let today = sample.captured_at.date_naive();

        Ok((1..=horizon_days)
            .map(|day| {
                let d = f64::from(day);
                ForecastPoint {
                    date: today + Duration::days(i64::from(day)),
                    predicted_aqi: (base + self.daily_drift * d).clamp(0.0, AQI_MAX),
                    confidence: (1.0 - self.confidence_decay * d).max(self.confidence_floor),
                }
            })
            .collect())
    }
}
