//! PM2.5 → AQI conversion using the US EPA breakpoint table.
//!
//! Pure and deterministic. Bands are selected by their upper concentration
//! bound, so a value in the 0.1 gap between two published bands interpolates
//! against the upper band's lower bound.

use crate::types::AqiCategory;
use crate::{Error, Result};

/// Highest AQI on the scale; concentrations past the last band clamp here.
pub const AQI_MAX: f64 = 500.0;

/// One row of the breakpoint table.
#[derive(Debug, Clone, Copy)]
pub struct Breakpoint {
    pub conc_lo: f64,
    pub conc_hi: f64,
    pub aqi_lo: f64,
    pub aqi_hi: f64,
}

impl Breakpoint {
    const fn new(conc_lo: f64, conc_hi: f64, aqi_lo: f64, aqi_hi: f64) -> Self {
        Self {
            conc_lo,
            conc_hi,
            aqi_lo,
            aqi_hi,
        }
    }

    fn interpolate(&self, c: f64) -> f64 {
        // Pin the endpoints so published boundaries come out exact.
        if c >= self.conc_hi {
            return self.aqi_hi;
        }
        if c == self.conc_lo {
            return self.aqi_lo;
        }
        self.aqi_lo + (c - self.conc_lo) * (self.aqi_hi - self.aqi_lo) / (self.conc_hi - self.conc_lo)
    }
}

/// PM2.5 (µg/m³, 24-hour) breakpoints.
pub const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    Breakpoint::new(0.0, 12.0, 0.0, 50.0),
    Breakpoint::new(12.1, 35.4, 51.0, 100.0),
    Breakpoint::new(35.5, 55.4, 101.0, 150.0),
    Breakpoint::new(55.5, 150.4, 151.0, 200.0),
    Breakpoint::new(150.5, 250.4, 201.0, 300.0),
    Breakpoint::new(250.5, 350.4, 301.0, 400.0),
    Breakpoint::new(350.5, 500.4, 401.0, 500.0),
];

/// Convert a PM2.5 concentration into an AQI in `[0, 500]`.
///
/// Negative or non-finite input is a caller bug and is rejected rather than
/// clamped.
pub fn aqi_from_pm25(concentration: f64) -> Result<f64> {
    if !concentration.is_finite() || concentration < 0.0 {
        return Err(Error::InvalidConcentration {
            pollutant: "pm2.5",
            value: concentration,
        });
    }

    let aqi = PM25_BREAKPOINTS
        .iter()
        .find(|bp| concentration <= bp.conc_hi)
        .map(|bp| bp.interpolate(concentration))
        .unwrap_or(AQI_MAX);

    Ok(aqi.clamp(0.0, AQI_MAX))
}

/// Category for an AQI value.
pub fn category_for(aqi: f64) -> AqiCategory {
    if aqi <= 50.0 {
        AqiCategory::Good
    } else if aqi <= 100.0 {
        AqiCategory::Moderate
    } else if aqi <= 150.0 {
        AqiCategory::UnhealthyForSensitive
    } else if aqi <= 200.0 {
        AqiCategory::Unhealthy
    } else if aqi <= 300.0 {
        AqiCategory::VeryUnhealthy
    } else {
        AqiCategory::Hazardous
    }
}
