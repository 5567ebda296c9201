//! Location resolver: turns a partial identifier into a [`Location`].
//!
//! Empty identifier:     IP geolocation → provider answer taken verbatim
//! Non-empty identifier: geocoder → first candidate (or no coordinates)

use super::geocoder::GeoCoder;
use super::types::{Coordinate, Identifier, Location, LocationSource};
use crate::error::{FinderError, Result};
use crate::transport::{endpoint_url, Transport};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Stateless, so concurrent resolutions never share a half-built location.
#[derive(Clone)]
pub struct LocationResolver {
    geocoder: GeoCoder,
    transport: Arc<dyn Transport>,
    ip_endpoint: String,
}

impl LocationResolver {
    pub fn new(geocoder: GeoCoder, transport: Arc<dyn Transport>, ip_endpoint: impl Into<String>) -> Self {
        Self {
            geocoder,
            transport,
            ip_endpoint: ip_endpoint.into(),
        }
    }

    pub fn geocoder(&self) -> &GeoCoder {
        &self.geocoder
    }

    pub async fn resolve(&self, identifier: &Identifier) -> Result<Location> {
        if identifier.is_empty() {
            self.resolve_auto().await
        } else {
            self.resolve_identifier(identifier).await
        }
    }

    /// Geocode the identifier and keep the first candidate's coordinates.
    ///
    /// The caller's fields are carried over untouched; only the coordinate
    /// is added.
    pub async fn resolve_identifier(&self, identifier: &Identifier) -> Result<Location> {
        let candidates = self.geocoder.geocode(identifier).await?;

        let (coordinate, source) = match candidates.first() {
            Some(c) => (Some(*c), LocationSource::Geocoder),
            None => {
                info!(query = %GeoCoder::query_string(identifier), "no geocoder candidate; coordinates left unset");
                (None, LocationSource::Unresolved)
            }
        };

        Ok(Location {
            fields: identifier.clone(),
            coordinate,
            region_code: identifier.get("region_code").map(str::to_string),
            source,
        })
    }

    /// Auto-detect location via IP.
    pub async fn resolve_auto(&self) -> Result<Location> {
        let url = endpoint_url::<&str, &str>(&self.ip_endpoint, &[])?;
        let body = self.transport.get_json(&url).await?;
        let location = location_from_ip_response(body)?;
        debug!(location = %location.display_line(), "IP geolocation");
        Ok(location)
    }
}

/// Map the IP provider's object onto a location, keeping its fields as-is.
fn location_from_ip_response(body: Value) -> Result<Location> {
    let Value::Object(mut map) = body else {
        return Err(FinderError::MalformedResponse(
            "IP geolocation did not return an object".into(),
        ));
    };

    let latitude = map.remove("latitude").as_ref().and_then(number_like);
    let longitude = map.remove("longitude").as_ref().and_then(number_like);
    let coordinate = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
        _ => None,
    };

    let mut fields = Identifier::from(map);
    if let Some(zip) = fields.get("zip_code").map(str::to_string) {
        fields.insert_missing("zipcode", zip);
    }
    let region_code = fields.get("region_code").map(str::to_string);

    Ok(Location {
        fields,
        coordinate,
        region_code,
        source: LocationSource::IpGeolocation,
    })
}

fn number_like(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::stub::StubTransport;
    use serde_json::json;

    const GEO: &str = "https://geo.test/search";
    const IP: &str = "https://ip.test/json/";

    fn resolver(stub: Arc<StubTransport>) -> LocationResolver {
        LocationResolver::new(GeoCoder::new(stub.clone(), GEO), stub, IP)
    }

    fn ip_answer() -> Value {
        json!({
            "ip": "203.0.113.9",
            "country_code": "US",
            "region_code": "NY",
            "city": "New York",
            "zipcode": "10001",
            "latitude": 40.7484,
            "longitude": -73.9967,
            "metro_code": 501
        })
    }

    #[tokio::test]
    async fn test_empty_identifier_uses_ip_and_never_geocodes() {
        let stub = Arc::new(StubTransport::new().route_json(IP, ip_answer()).route_json(GEO, json!([])));
        let loc = resolver(stub.clone()).resolve(&Identifier::new()).await.unwrap();

        assert_eq!(loc.source, LocationSource::IpGeolocation);
        assert_eq!(loc.coordinate, Some(Coordinate::new(40.7484, -73.9967)));
        assert_eq!(loc.zipcode(), Some("10001"));
        assert_eq!(loc.region_code.as_deref(), Some("NY"));
        assert_eq!(loc.fields.get("metro_code"), Some("501"));
        assert!(loc.fields.get("latitude").is_none());
        assert!(stub.requests_to(GEO).is_empty());
        assert_eq!(stub.requests_to(IP).len(), 1);
    }

    #[tokio::test]
    async fn test_identifier_takes_first_candidate() {
        let stub = Arc::new(StubTransport::new().route_json(
            GEO,
            json!([{"lat": "40.7506", "lon": "-73.9972"}, {"lat": "1.0", "lon": "2.0"}]),
        ));
        let id = Identifier::new().with("zipcode", "10001");
        let loc = resolver(stub.clone()).resolve(&id).await.unwrap();

        assert_eq!(loc.source, LocationSource::Geocoder);
        assert_eq!(loc.coordinate, Some(Coordinate::new(40.7506, -73.9972)));
        assert_eq!(loc.zipcode(), Some("10001"));
        assert!(stub.requests_to(IP).is_empty());
    }

    #[tokio::test]
    async fn test_no_candidate_leaves_coordinates_unset() {
        let stub = Arc::new(StubTransport::new().route_json(GEO, json!([])));
        let id = Identifier::new().with("city", "Nowhere").with("state", "ZZ");
        let loc = resolver(stub).resolve(&id).await.unwrap();

        assert_eq!(loc.coordinate, None);
        assert_eq!(loc.source, LocationSource::Unresolved);
        assert_eq!(loc.fields, id);
    }

    #[tokio::test]
    async fn test_ip_string_coordinates_and_zip_alias() {
        let stub = Arc::new(StubTransport::new().route_json(
            IP,
            json!({"latitude": "30.2672", "longitude": "-97.7431", "zip_code": "78701", "city": "Austin"}),
        ));
        let loc = resolver(stub).resolve_auto().await.unwrap();
        assert_eq!(loc.coordinate, Some(Coordinate::new(30.2672, -97.7431)));
        assert_eq!(loc.zipcode(), Some("78701"));
    }

    #[tokio::test]
    async fn test_ip_non_object_is_malformed() {
        let stub = Arc::new(StubTransport::new().route_json(IP, json!(["nope"])));
        let err = resolver(stub).resolve_auto().await.unwrap_err();
        assert!(matches!(err, FinderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_do_not_interfere() {
        let stub = Arc::new(
            StubTransport::new()
                .route_json(&format!("{}?q=Boston", GEO), json!([{"lat": "42.36", "lon": "-71.06"}]))
                .route_json(&format!("{}?q=Denver", GEO), json!([{"lat": "39.74", "lon": "-104.99"}])),
        );
        let r = resolver(stub);
        let boston = Identifier::new().with("city", "Boston");
        let denver = Identifier::new().with("city", "Denver");
        let (a, b) = tokio::join!(r.resolve(&boston), r.resolve(&denver));

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.city(), Some("Boston"));
        assert_eq!(a.coordinate, Some(Coordinate::new(42.36, -71.06)));
        assert_eq!(b.city(), Some("Denver"));
        assert_eq!(b.coordinate, Some(Coordinate::new(39.74, -104.99)));
    }
}
