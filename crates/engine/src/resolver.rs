//! Strict free-text place resolution.
//!
//! A query must survive every rule, in order, before a place is produced:
//! minimum length, allow-list membership, a geocoder candidate, and a name
//! match between query and candidate. A wrong match would file telemetry under
//! the wrong city, so anything doubtful is rejected.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::config::AppConfig;
use common::provider::GeocodeProvider;
use common::{Error, GeocodeCandidate, Place, Result};
use dashmap::DashMap;
use tracing::{debug, info, warn};

/// Which rule accepted a geocoder candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Candidate name equals the query.
    Exact,
    /// Query equals one whitespace-separated word of the candidate name.
    Word,
    /// Candidate name starts with a sufficiently long query.
    Prefix,
}

pub struct PlaceResolver {
    geocoder: Arc<dyn GeocodeProvider>,
    allowed: HashSet<String>,
    min_query_chars: usize,
    min_prefix_chars: usize,
    timeout: Duration,
    /// Accepted places keyed by normalized query.
    resolved: DashMap<String, Place>,
}

impl PlaceResolver {
    pub fn new(geocoder: Arc<dyn GeocodeProvider>, config: &AppConfig) -> Self {
        Self {
            geocoder,
            allowed: config.allowed_places.iter().map(|p| normalize(p)).collect(),
            min_query_chars: config.resolver.min_query_chars,
            min_prefix_chars: config.resolver.min_prefix_chars,
            timeout: Duration::from_millis(config.providers.timeout_ms),
            resolved: DashMap::new(),
        }
    }

    /// Resolve free text into a place with authoritative coordinates.
    pub async fn resolve(&self, text: &str) -> Result<Place> {
        let query = normalize(text);

        if query.chars().count() < self.min_query_chars {
            debug!("Rejected '{}': shorter than {} characters", text, self.min_query_chars);
            return Err(Error::PlaceNotFound(format!(
                "'{}' is shorter than {} characters",
                text.trim(),
                self.min_query_chars
            )));
        }

        if !self.allowed.contains(&query) {
            debug!("Rejected '{}': not a recognized major place", text);
            return Err(Error::PlaceNotFound(format!(
                "'{}' is not a recognized place",
                text.trim()
            )));
        }

        if let Some(place) = self.resolved.get(&query) {
            return Ok(place.value().clone());
        }

        let candidate = match tokio::time::timeout(self.timeout, self.geocoder.lookup(text)).await {
            Ok(Ok(Some(candidate))) => candidate,
            Ok(Ok(None)) => {
                return Err(Error::PlaceNotFound(format!("no geocoding match for '{}'", text.trim())))
            }
            Ok(Err(e)) => {
                warn!("Geocoding failed for '{}': {}", text, e);
                return Err(Error::PlaceNotFound(format!("geocoding failed for '{}'", text.trim())));
            }
            Err(_) => {
                warn!("Geocoding timed out for '{}' after {:?}", text, self.timeout);
                return Err(Error::PlaceNotFound(format!("geocoding timed out for '{}'", text.trim())));
            }
        };

        let Some(rule) = match_rule(&query, &candidate.matched_name, self.min_prefix_chars) else {
            info!(
                "Rejected '{}': geocoder offered '{}' which does not match",
                text, candidate.matched_name
            );
            return Err(Error::PlaceNotFound(format!(
                "'{}' does not match '{}'",
                text.trim(),
                candidate.matched_name
            )));
        };

        let place = into_place(candidate)?;
        debug!(
            "Resolved '{}' -> {} ({:.4}, {:.4}) via {:?}",
            text, place.name, place.lat, place.lon, rule
        );
        self.resolved.insert(query, place.clone());
        Ok(place)
    }

    /// Number of memoized places.
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

/// Trim and case-fold.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Decide whether `candidate` is an acceptable answer for a normalized query.
pub fn match_rule(query: &str, candidate: &str, min_prefix_chars: usize) -> Option<MatchRule> {
    let found = normalize(candidate);

    if found == query {
        return Some(MatchRule::Exact);
    }
    if found.split_whitespace().any(|word| word == query) {
        return Some(MatchRule::Word);
    }
    if query.chars().count() >= min_prefix_chars && found.starts_with(query) {
        return Some(MatchRule::Prefix);
    }
    None
}

fn into_place(candidate: GeocodeCandidate) -> Result<Place> {
    let place = Place {
        name: candidate.matched_name,
        country: candidate.country,
        lat: candidate.lat,
        lon: candidate.lon,
    };
    if !place.is_resolved() || !place.lat.is_finite() || !place.lon.is_finite() {
        return Err(Error::PlaceNotFound(format!(
            "geocoder returned unusable coordinates for '{}'",
            place.name
        )));
    }
    Ok(place)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGeocoder;

    fn resolver_with(geocoder: FakeGeocoder, allowed: &[&str]) -> (PlaceResolver, Arc<FakeGeocoder>) {
        let geocoder = Arc::new(geocoder);
        let mut config = AppConfig::default();
        if !allowed.is_empty() {
            config.allowed_places = allowed.iter().map(|s| s.to_string()).collect();
        }
        (PlaceResolver::new(geocoder.clone(), &config), geocoder)
    }

    #[test]
    fn test_match_rules() {
        assert_eq!(match_rule("lahore", "Lahore", 6), Some(MatchRule::Exact));
        assert_eq!(match_rule("new", "New York", 6), Some(MatchRule::Word));
        assert_eq!(match_rule("york", "New York", 6), Some(MatchRule::Word));
        assert_eq!(match_rule("santiag", "Santiago de Chile", 6), Some(MatchRule::Prefix));
        assert_eq!(match_rule("loki", "Lokichogio", 6), None);
        assert_eq!(match_rule("lahore", "Lahore Cantonment", 6), Some(MatchRule::Word));
        assert_eq!(match_rule("paris", "Parisot", 6), None);
    }

    #[tokio::test]
    async fn test_short_query_rejected_before_geocoding() {
        let (resolver, geo) = resolver_with(FakeGeocoder::with(&[("lhr", "Lahore", 31.5, 74.3)]), &[]);
        let err = resolver.resolve("lhr").await.unwrap_err();
        assert!(matches!(err, Error::PlaceNotFound(_)));
        assert_eq!(geo.calls(), 0);
    }

    #[tokio::test]
    async fn test_exact_match_resolves() {
        let (resolver, _) =
            resolver_with(FakeGeocoder::with(&[("lahore", "Lahore", 31.5497, 74.3436)]), &[]);
        let place = resolver.resolve("  Lahore ").await.expect("Lahore resolves");
        assert_eq!(place.name, "Lahore");
        assert!((place.lat - 31.5497).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_word_match_resolves_to_multi_word_name() {
        let (resolver, _) = resolver_with(
            FakeGeocoder::with(&[("york", "New York", 40.7128, -74.0060)]),
            &["york"],
        );
        let place = resolver.resolve("York").await.expect("word match");
        assert_eq!(place.name, "New York");
    }

    #[tokio::test]
    async fn test_short_prefix_rejected_even_with_loose_candidate() {
        let (resolver, geo) = resolver_with(
            FakeGeocoder::with(&[("loki", "Lokichogio", 4.2, 34.35)]),
            &["loki"],
        );
        let err = resolver.resolve("loki").await.unwrap_err();
        assert!(matches!(err, Error::PlaceNotFound(_)));
        assert_eq!(geo.calls(), 1);
    }

    #[tokio::test]
    async fn test_unlisted_place_never_reaches_geocoder() {
        let (resolver, geo) =
            resolver_with(FakeGeocoder::with(&[("gotham", "Gotham", 1.0, 1.0)]), &[]);
        assert!(resolver.resolve("Gotham").await.is_err());
        assert_eq!(geo.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_or_failing_geocoder_is_not_found() {
        let (resolver, _) = resolver_with(FakeGeocoder::default(), &[]);
        assert!(matches!(
            resolver.resolve("Karachi").await,
            Err(Error::PlaceNotFound(_))
        ));

        let failing = FakeGeocoder {
            fail: true,
            ..FakeGeocoder::default()
        };
        let (resolver, _) = resolver_with(failing, &[]);
        assert!(matches!(
            resolver.resolve("Karachi").await,
            Err(Error::PlaceNotFound(_))
        ));
        assert_eq!(resolver.resolved_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_coordinates_rejected() {
        let (resolver, _) = resolver_with(FakeGeocoder::with(&[("dubai", "Dubai", 0.0, 0.0)]), &[]);
        assert!(resolver.resolve("Dubai").await.is_err());
    }

    #[tokio::test]
    async fn test_accepted_place_is_memoized() {
        let (resolver, geo) =
            resolver_with(FakeGeocoder::with(&[("tokyo", "Tokyo", 35.6895, 139.6917)]), &[]);
        let first = resolver.resolve("Tokyo").await.expect("resolves");
        let second = resolver.resolve("TOKYO").await.expect("resolves");
        assert_eq!(first, second);
        assert_eq!(geo.calls(), 1);
        assert_eq!(resolver.resolved_count(), 1);
    }
}
