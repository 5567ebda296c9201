//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a location was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationSource {
    /// Coordinates came from the geocoding service.
    Geocoder,
    /// The caller gave nothing; the IP geolocation provider answered.
    IpGeolocation,
    /// Geocoding returned no candidate; only the caller's fields are known.
    Unresolved,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geocoder => write!(f, "Geocoder"),
            Self::IpGeolocation => write!(f, "IP"),
            Self::Unresolved => write!(f, "Unresolved"),
        }
    }
}

/// User-supplied partial location: free-form keys (`zipcode`, `city`,
/// `state`, `ip`, ...) mapped to string values.
///
/// Insertion order is preserved because the geocoder query joins the values
/// in the order the caller supplied them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Map<String, serde_json::Value>", into = "serde_json::Map<String, serde_json::Value>")]
pub struct Identifier {
    fields: Vec<(String, String)>,
}

impl Identifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a field, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Insert only when the key is absent.
    pub fn insert_missing(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.get(&key).is_none() {
            self.fields.push((key, value.into()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, v)| v.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Identifier {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut id = Identifier::new();
        for (k, v) in iter {
            id.insert(k, v);
        }
        id
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Identifier {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Number(n) => Some((k, n.to_string())),
                serde_json::Value::Bool(b) => Some((k, b.to_string())),
                _ => None,
            })
            .collect()
    }
}

impl From<Identifier> for serde_json::Map<String, serde_json::Value> {
    fn from(id: Identifier) -> Self {
        id.fields
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect()
    }
}

/// A latitude/longitude pair. Both halves are always present together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Parse from the string pair most geocoders return. NaN and infinities are rejected.
    pub fn parse(lat: &str, lon: &str) -> Option<Self> {
        let latitude = lat.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        let longitude = lon.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        Some(Self { latitude, longitude })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// A resolved location: the caller's identifier fields plus whatever the
/// resolution chain learned. Immutable for the rest of the query cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub fields: Identifier,
    pub coordinate: Option<Coordinate>,
    #[serde(default)]
    pub region_code: Option<String>,
    pub source: LocationSource,
}

impl Location {
    pub fn zipcode(&self) -> Option<&str> {
        self.non_empty("zipcode")
    }

    pub fn city(&self) -> Option<&str> {
        self.non_empty("city")
    }

    /// State code, falling back to the IP provider's region code.
    pub fn state(&self) -> Option<&str> {
        self.non_empty("state")
            .or(self.region_code.as_deref().filter(|s| !s.is_empty()))
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.fields.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn display_line(&self) -> String {
        let place = self.fields.values().collect::<Vec<_>>().join(", ");
        let place = if place.is_empty() { "Unknown".to_string() } else { place };
        match self.coordinate {
            Some(c) => format!("{} ({}) [{}]", place, c, self.source),
            None => format!("{} (no coordinates) [{}]", place, self.source),
        }
    }
}

/// The administrative unit containing a location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub state_code: String,
    pub county_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county_fips: Option<String>,
}

impl Region {
    /// Only a region with both fields filled may be used as a filter.
    pub fn is_resolved(&self) -> bool {
        !self.state_code.trim().is_empty() && !self.county_name.trim().is_empty()
    }
}
