//! Free-text geocoding via an OpenStreetMap Nominatim-compatible service.

use super::types::{Coordinate, Identifier};
use crate::error::{FinderError, Result};
use crate::transport::{endpoint_url, Transport};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Deserialize, Debug, Clone)]
pub struct NominatimResult {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone)]
pub struct GeoCoder {
    transport: Arc<dyn Transport>,
    endpoint: String,
}

impl GeoCoder {
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    /// The `q` parameter: every identifier value, in order, joined by ", ".
    pub fn query_string(identifier: &Identifier) -> String {
        identifier.values().collect::<Vec<_>>().join(", ")
    }

    /// All candidates in the order the service returned them.
    ///
    /// An empty list means "no match" and is not an error.
    pub async fn geocode(&self, identifier: &Identifier) -> Result<Vec<Coordinate>> {
        let q = Self::query_string(identifier);
        let url = endpoint_url(&self.endpoint, &[("q", q.as_str()), ("format", "json")])?;

        let body = self.transport.get_json(&url).await?;
        let results: Vec<NominatimResult> = serde_json::from_value(body)
            .map_err(|e| FinderError::MalformedResponse(format!("geocoder: {}", e)))?;

        let candidates: Vec<Coordinate> = results
            .iter()
            .filter_map(|r| {
                let parsed = Coordinate::parse(&r.lat, &r.lon);
                if parsed.is_none() {
                    warn!(lat = %r.lat, lon = %r.lon, "skipping geocoder candidate with unparsable coordinates");
                }
                parsed
            })
            .collect();

        debug!(query = %q, candidates = candidates.len(), "geocoded");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::stub::StubTransport;
    use serde_json::json;

    const ENDPOINT: &str = "https://geo.test/search";

    #[test]
    fn test_query_string_joins_values() {
        let id = Identifier::new().with("city", "Portland").with("state", "OR");
        assert_eq!(GeoCoder::query_string(&id), "Portland, OR");
    }

    #[tokio::test]
    async fn test_candidates_keep_upstream_order() {
        let stub = Arc::new(StubTransport::new().route_json(
            ENDPOINT,
            json!([
                {"lat": "45.5152", "lon": "-122.6784", "display_name": "Portland, Oregon"},
                {"lat": "43.6591", "lon": "-70.2568", "display_name": "Portland, Maine"}
            ]),
        ));
        let geocoder = GeoCoder::new(stub.clone(), ENDPOINT);

        let id = Identifier::new().with("city", "Portland");
        let candidates = geocoder.geocode(&id).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], Coordinate::new(45.5152, -122.6784));
        assert_eq!(candidates[1], Coordinate::new(43.6591, -70.2568));

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], "https://geo.test/search?q=Portland&format=json");
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let stub = Arc::new(StubTransport::new().route_json(ENDPOINT, json!([])));
        let geocoder = GeoCoder::new(stub, ENDPOINT);
        let candidates = geocoder.geocode(&Identifier::new().with("zipcode", "00000")).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_object_response_is_malformed() {
        let stub = Arc::new(StubTransport::new().route_json(ENDPOINT, json!({"error": "rate limited"})));
        let geocoder = GeoCoder::new(stub, ENDPOINT);
        let err = geocoder.geocode(&Identifier::new().with("city", "X")).await.unwrap_err();
        assert!(matches!(err, FinderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_network_failure_propagates() {
        let stub = Arc::new(StubTransport::new().fail(ENDPOINT, FinderError::NetworkFailure("down".into())));
        let geocoder = GeoCoder::new(stub, ENDPOINT);
        let err = geocoder.geocode(&Identifier::new().with("city", "X")).await.unwrap_err();
        assert_eq!(err, FinderError::NetworkFailure("down".into()));
    }
}
