//! In-memory fakes for the provider capabilities.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::provider::{AuthoritativeAqiProvider, GeocodeProvider, Notifier, PollutantDetailProvider};
use common::{
    AqiScore, AuthoritativeReading, Error, GeocodeCandidate, Place, PollutantSample, Result,
};

pub fn place(name: &str, lat: f64, lon: f64) -> Place {
    Place {
        name: name.into(),
        country: "XX".into(),
        lat,
        lon,
    }
}

pub fn sample(pm25: f64) -> PollutantSample {
    PollutantSample {
        co: 500.0,
        no: 15.0,
        no2: 25.0,
        o3: 50.0,
        so2: 10.0,
        pm25,
        pm10: 75.0,
        nh3: 20.0,
        captured_at: DateTime::parse_from_rfc3339("2026-02-13T09:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc),
    }
}

/// Geocoder answering from a fixed map keyed by lowercase query.
#[derive(Default)]
pub struct FakeGeocoder {
    pub answers: HashMap<String, GeocodeCandidate>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeGeocoder {
    pub fn with(entries: &[(&str, &str, f64, f64)]) -> Self {
        let answers = entries
            .iter()
            .map(|(query, name, lat, lon)| {
                (
                    query.to_lowercase(),
                    GeocodeCandidate {
                        matched_name: (*name).into(),
                        lat: *lat,
                        lon: *lon,
                        country: "XX".into(),
                    },
                )
            })
            .collect();
        Self {
            answers,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodeProvider for FakeGeocoder {
    async fn lookup(&self, name: &str) -> Result<Option<GeocodeCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::ProviderUnavailable {
                provider: "fake-geo",
                reason: "down".into(),
            });
        }
        Ok(self.answers.get(&name.trim().to_lowercase()).cloned())
    }
}

/// How the fake authoritative provider should behave.
#[derive(Debug, Clone, Copy)]
pub enum AuthoritativeBehavior {
    Reading { aqi: f64, pm25: Option<f64> },
    RateLimited,
    Failing,
    Hang,
}

pub struct FakeAuthoritative {
    pub behavior: Mutex<AuthoritativeBehavior>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeAuthoritative {
    pub fn new(behavior: AuthoritativeBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set(&self, behavior: AuthoritativeBehavior) {
        *self.behavior.lock().expect("behavior lock") = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthoritativeAqiProvider for FakeAuthoritative {
    async fn fetch(&self, _lat: f64, _lon: f64) -> Result<AuthoritativeReading> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().expect("behavior lock");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match behavior {
            AuthoritativeBehavior::Reading { aqi, pm25 } => Ok(AuthoritativeReading {
                aqi,
                pm25,
                timestamp: Utc::now(),
            }),
            AuthoritativeBehavior::RateLimited => Err(Error::RateLimited { provider: "fake-aqi" }),
            AuthoritativeBehavior::Failing => Err(Error::ProviderUnavailable {
                provider: "fake-aqi",
                reason: "boom".into(),
            }),
            AuthoritativeBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Other("unreachable".into()))
            }
        }
    }
}

/// Pollutant detail fake returning a fixed PM2.5 (or failing when `None`).
pub struct FakeDetail {
    pub pm25: Option<f64>,
    pub calls: AtomicUsize,
}

impl FakeDetail {
    pub fn new(pm25: Option<f64>) -> Self {
        Self {
            pm25,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollutantDetailProvider for FakeDetail {
    async fn fetch(&self, _lat: f64, _lon: f64) -> Result<PollutantSample> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pm25 {
            Some(pm25) => Ok(sample(pm25)),
            None => Err(Error::ProviderUnavailable {
                provider: "fake-detail",
                reason: "down".into(),
            }),
        }
    }
}

/// Notifier that records recipients and fails for a chosen subscriber.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    pub fail_for: Option<String>,
}

impl RecordingNotifier {
    pub fn failing_for(subscriber: &str) -> Self {
        Self {
            fail_for: Some(subscriber.into()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        subscriber: &str,
        _place_name: &str,
        _score: &AqiScore,
        _sample: &PollutantSample,
    ) -> Result<()> {
        if self.fail_for.as_deref() == Some(subscriber) {
            return Err(Error::NotifierFailure {
                subscriber: subscriber.into(),
                reason: "mailbox unavailable".into(),
            });
        }
        self.sent.lock().expect("sent lock").push(subscriber.into());
        Ok(())
    }
}
