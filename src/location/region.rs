//! Region lookup: coordinates → state + county via the FCC block API.
//!
//! Flow: resolve location → (geocode again if it has no coordinates) →
//! register a callback key → request the JSONP script → dispatch the
//! script's call to the registry → await that key's single delivery.

use super::callbacks::CallbackRegistry;
use super::resolver::LocationResolver;
use super::types::{Coordinate, Identifier, Region};
use crate::config::RegionSettings;
use crate::error::{FinderError, Result};
use crate::transport::{endpoint_url, jsonp, Transport};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Deserialize, Debug, Default)]
struct BlockPayload {
    #[serde(rename = "State", default)]
    state: Option<NamedUnit>,
    #[serde(rename = "County", default)]
    county: Option<NamedUnit>,
}

#[derive(Deserialize, Debug, Default)]
struct NamedUnit {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "FIPS", default)]
    fips: Option<String>,
}

/// Decode a block API payload. Missing parts give an unresolved region.
pub fn region_from_payload(payload: Value) -> Result<Region> {
    if !payload.is_object() {
        return Err(FinderError::MalformedResponse(
            "region payload is not an object".into(),
        ));
    }
    let block: BlockPayload = serde_json::from_value(payload)
        .map_err(|e| FinderError::MalformedResponse(format!("region payload: {}", e)))?;

    let state = block.state.unwrap_or_default();
    let county = block.county.unwrap_or_default();
    Ok(Region {
        state_code: state.code.unwrap_or_default(),
        county_name: county.name.unwrap_or_default(),
        county_fips: county.fips,
    })
}

#[derive(Clone)]
pub struct RegionLookup {
    resolver: LocationResolver,
    transport: Arc<dyn Transport>,
    endpoint: String,
    callbacks: CallbackRegistry,
    settings: RegionSettings,
}

impl RegionLookup {
    pub fn new(
        resolver: LocationResolver,
        transport: Arc<dyn Transport>,
        endpoint: impl Into<String>,
        callbacks: CallbackRegistry,
        settings: RegionSettings,
    ) -> Self {
        Self {
            resolver,
            transport,
            endpoint: endpoint.into(),
            callbacks,
            settings,
        }
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Resolve the region containing whatever `identifier` describes.
    pub async fn resolve_region(&self, identifier: &Identifier) -> Result<Region> {
        let location = self.resolver.resolve(identifier).await?;

        let coordinate = match location.coordinate {
            Some(c) => c,
            None => {
                let candidates = self.resolver.geocoder().geocode(&location.fields).await?;
                *candidates.first().ok_or_else(|| {
                    FinderError::UnresolvedLocation(format!(
                        "no coordinates for '{}'",
                        location.display_line()
                    ))
                })?
            }
        };

        self.lookup_coordinate(coordinate).await
    }

    /// Ask the block API for the region at `coordinate`.
    pub async fn lookup_coordinate(&self, coordinate: Coordinate) -> Result<Region> {
        let pending = self.callbacks.register(&self.settings.callback_prefix);
        let latitude = coordinate.latitude.to_string();
        let longitude = coordinate.longitude.to_string();
        let url = endpoint_url(
            &self.endpoint,
            &[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("showall", "false"),
                ("format", "jsonp"),
                ("callback", pending.key()),
            ],
        )?;

        let script = self.transport.get_text(&url).await?;
        let call = jsonp::parse(&script)?;
        // Only this request's key may be fulfilled from this body.
        if call.callback == pending.key() {
            self.callbacks.fulfill(pending.key(), call.payload);
        } else {
            warn!(
                expected = %pending.key(),
                got = %call.callback,
                "region script addressed another callback; ignoring it"
            );
        }

        let payload = pending.wait(self.settings.callback_timeout()).await?;
        let region = region_from_payload(payload)?;
        debug!(state = %region.state_code, county = %region.county_name, "region resolved");
        Ok(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::geocoder::GeoCoder;
    use crate::transport::stub::StubTransport;
    use serde_json::json;
    use std::time::Duration;

    const GEO: &str = "https://geo.test/search";
    const IP: &str = "https://ip.test/json/";
    const BLOCK: &str = "https://fcc.test/api/block/find";

    fn lookup(stub: Arc<StubTransport>, timeout_secs: u64) -> RegionLookup {
        let resolver = LocationResolver::new(GeoCoder::new(stub.clone(), GEO), stub.clone(), IP);
        let settings = RegionSettings {
            callback_timeout_secs: timeout_secs,
            callback_prefix: "gotCounty".into(),
        };
        RegionLookup::new(resolver, stub, BLOCK, CallbackRegistry::new(), settings)
    }

    /// Stub whose block endpoint answers with JSONP addressed to `callback`.
    struct EchoingBlock {
        inner: StubTransport,
        payload: Value,
        callback_override: Option<String>,
    }

    #[async_trait::async_trait]
    impl Transport for EchoingBlock {
        async fn get_text(&self, url: &url::Url) -> Result<String> {
            if url.as_str().starts_with(BLOCK) {
                let requested = url
                    .query_pairs()
                    .find(|(k, _)| k == "callback")
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_default();
                let name = self.callback_override.clone().unwrap_or(requested);
                return Ok(format!("{}({});", name, self.payload));
            }
            self.inner.get_text(url).await
        }
    }

    fn county_payload() -> Value {
        json!({
            "Block": {"FIPS": "360610076001000"},
            "County": {"FIPS": "36061", "name": "New York"},
            "State": {"FIPS": "36", "code": "NY", "name": "New York"},
            "status": "OK"
        })
    }

    #[test]
    fn test_payload_decoding() {
        let region = region_from_payload(county_payload()).unwrap();
        assert_eq!(region.state_code, "NY");
        assert_eq!(region.county_name, "New York");
        assert_eq!(region.county_fips.as_deref(), Some("36061"));
        assert!(region.is_resolved());

        let empty = region_from_payload(json!({"status": "Error"})).unwrap();
        assert!(!empty.is_resolved());

        assert!(region_from_payload(json!("nope")).is_err());
    }

    #[tokio::test]
    async fn test_region_with_geocoded_coordinates() {
        let inner = StubTransport::new().route_json(GEO, json!([{"lat": "40.7506", "lon": "-73.9972"}]));
        let transport = Arc::new(EchoingBlock { inner, payload: county_payload(), callback_override: None });
        let resolver = LocationResolver::new(GeoCoder::new(transport.clone(), GEO), transport.clone(), IP);
        let regions = RegionLookup::new(resolver, transport, BLOCK, CallbackRegistry::new(), RegionSettings::default());

        let region = regions
            .resolve_region(&Identifier::new().with("zipcode", "10001"))
            .await
            .unwrap();
        assert_eq!(region.state_code, "NY");
        assert_eq!(region.county_name, "New York");
        assert!(regions.callbacks().is_empty());
    }

    #[tokio::test]
    async fn test_ip_location_without_coordinates_geocodes_its_fields() {
        let inner = StubTransport::new()
            .route_json(IP, json!({"city": "Albany", "region_code": "NY"}))
            .route_json(GEO, json!([{"lat": "42.65", "lon": "-73.75"}]));
        let transport = Arc::new(EchoingBlock { inner, payload: county_payload(), callback_override: None });
        let resolver = LocationResolver::new(GeoCoder::new(transport.clone(), GEO), transport.clone(), IP);
        let regions = RegionLookup::new(resolver, transport.clone(), BLOCK, CallbackRegistry::new(), RegionSettings::default());

        let region = regions.resolve_region(&Identifier::new()).await.unwrap();
        assert!(region.is_resolved());
        assert_eq!(transport.inner.requests_to(GEO).len(), 1);
        assert!(transport.inner.requests_to(GEO)[0].contains("Albany"));
    }

    #[tokio::test]
    async fn test_no_candidates_is_unresolved() {
        let stub = Arc::new(StubTransport::new().route_json(GEO, json!([])));
        let err = lookup(stub.clone(), 1)
            .resolve_region(&Identifier::new().with("city", "Atlantis"))
            .await
            .unwrap_err();
        assert!(matches!(err, FinderError::UnresolvedLocation(_)));
        assert!(stub.requests_to(BLOCK).is_empty());
    }

    #[tokio::test]
    async fn test_script_for_other_callback_times_out() {
        let inner = StubTransport::new();
        let transport = Arc::new(EchoingBlock {
            inner,
            payload: county_payload(),
            callback_override: Some("gotCounty".into()),
        });
        let resolver = LocationResolver::new(GeoCoder::new(transport.clone(), GEO), transport.clone(), IP);
        let settings = RegionSettings { callback_timeout_secs: 0, callback_prefix: "gotCounty".into() };
        let regions = RegionLookup::new(resolver, transport, BLOCK, CallbackRegistry::new(), settings);

        let started = std::time::Instant::now();
        let err = regions.lookup_coordinate(Coordinate::new(40.0, -74.0)).await.unwrap_err();
        assert!(matches!(err, FinderError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(regions.callbacks().is_empty());
    }

    #[tokio::test]
    async fn test_script_cannot_fulfil_another_pending_request() {
        let registry = CallbackRegistry::new();
        let other = registry.register("gotCounty");
        let transport = Arc::new(EchoingBlock {
            inner: StubTransport::new(),
            payload: county_payload(),
            callback_override: Some(other.key().to_string()),
        });
        let resolver = LocationResolver::new(GeoCoder::new(transport.clone(), GEO), transport.clone(), IP);
        let settings = RegionSettings { callback_timeout_secs: 0, callback_prefix: "gotCounty".into() };
        let regions = RegionLookup::new(resolver, transport, BLOCK, registry.clone(), settings);

        let err = regions.lookup_coordinate(Coordinate::new(40.0, -74.0)).await.unwrap_err();
        assert!(matches!(err, FinderError::Timeout { .. }));

        // The other request is still waiting and received nothing.
        assert!(registry.is_pending(other.key()));
        let untouched = other.wait(Duration::from_millis(20)).await;
        assert!(matches!(untouched, Err(FinderError::Timeout { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_block_request_parameters() {
        let stub = Arc::new(StubTransport::new().route(BLOCK, "gotCounty({})"));
        let _ = lookup(stub.clone(), 0).lookup_coordinate(Coordinate::new(40.5, -74.25)).await;

        let requests = stub.requests_to(BLOCK);
        assert_eq!(requests.len(), 1);
        let url = url::Url::parse(&requests[0]).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["latitude"], "40.5");
        assert_eq!(params["longitude"], "-74.25");
        assert_eq!(params["showall"], "false");
        assert_eq!(params["format"], "jsonp");
        assert!(params["callback"].starts_with("gotCounty_"));
    }

    #[tokio::test]
    async fn test_malformed_script() {
        let stub = Arc::new(StubTransport::new().route(BLOCK, "<html>busy</html>"));
        let err = lookup(stub, 1).lookup_coordinate(Coordinate::new(1.0, 2.0)).await.unwrap_err();
        assert!(matches!(err, FinderError::MalformedResponse(_)));
    }
}
