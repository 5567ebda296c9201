//! Hospitals near a location, ranked by distance, with per-provider measures.

use super::measures::Measures;
use super::results::{Ranked, ResultList};
use crate::distance::distance_miles;
use crate::error::{FinderError, Result};
use crate::location::{Coordinate, Identifier, Location, LocationResolver};
use crate::transport::{endpoint_url, Transport};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// The `location` column of a hospital row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordLocation {
    #[serde(default, deserialize_with = "super::lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "super::lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecordLocation {
    pub fn coordinate(&self) -> Option<Coordinate> {
        Some(Coordinate::new(self.latitude?, self.longitude?))
    }
}

/// One row of the hospital dataset. Unknown columns are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalRecord {
    #[serde(default)]
    pub provider_number: String,
    #[serde(default)]
    pub hospital_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub location: Option<RecordLocation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A hospital row annotated for one query cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hospital {
    #[serde(flatten)]
    pub record: HospitalRecord,
    pub current_location: Arc<Location>,
    pub distance_miles: Option<f64>,
    /// `None` until the measures fetch for this provider lands.
    pub measures: Option<Measures>,
}

impl Hospital {
    pub fn new(record: HospitalRecord, current_location: Arc<Location>) -> Self {
        let distance = match (
            current_location.coordinate,
            record.location.as_ref().and_then(RecordLocation::coordinate),
        ) {
            (Some(here), Some(there)) => Some(distance_miles(here, there)),
            _ => None,
        };
        Self {
            record,
            current_location,
            distance_miles: distance,
            measures: None,
        }
    }

    pub fn provider_number(&self) -> &str {
        &self.record.provider_number
    }

    pub fn name(&self) -> &str {
        self.record.hospital_name.as_deref().unwrap_or("(unnamed)")
    }

    /// Distance the way the listing shows it: one decimal, or "?".
    pub fn distance_label(&self) -> String {
        match self.distance_miles {
            Some(d) => format!("{:.1} mi", d),
            None => "? mi".to_string(),
        }
    }
}

impl Ranked for Hospital {
    fn rank_key(&self) -> Option<f64> {
        self.distance_miles
    }
}

impl ResultList<Hospital> {
    /// Attach measures to every record of `provider_number`. Returns false if
    /// no such record is in the list.
    pub fn attach_measures(&mut self, provider_number: &str, measures: &Measures) -> bool {
        let mut attached = false;
        while let Some(h) = self.find_mut(|h| h.provider_number() == provider_number && h.measures.is_none()) {
            h.measures = Some(measures.clone());
            attached = true;
        }
        attached
    }
}

/// How the hospital dataset is filtered for a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HospitalQuery {
    /// First three digits of the zip code.
    ZipPrefix(String),
    StateCity { state: String, city: Option<String> },
    Unfiltered,
}

impl HospitalQuery {
    pub fn for_location(location: &Location) -> Self {
        if let Some(zip) = location.zipcode() {
            return Self::ZipPrefix(zip.trim().chars().take(3).collect());
        }
        match location.state() {
            Some(state) => Self::StateCity {
                state: state.to_string(),
                city: location.city().map(str::to_string),
            },
            None => Self::Unfiltered,
        }
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::ZipPrefix(prefix) => vec![("$where", format!("starts_with(zip_code,'{}')", prefix))],
            Self::StateCity { state, city } => {
                let mut params = vec![("state", state.clone())];
                if let Some(city) = city {
                    params.push(("city", city.clone()));
                }
                params
            }
            Self::Unfiltered => Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct HospitalFetcher {
    resolver: LocationResolver,
    transport: Arc<dyn Transport>,
    hospitals_endpoint: String,
    measures_endpoint: String,
}

impl HospitalFetcher {
    pub fn new(
        resolver: LocationResolver,
        transport: Arc<dyn Transport>,
        hospitals_endpoint: impl Into<String>,
        measures_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            transport,
            hospitals_endpoint: hospitals_endpoint.into(),
            measures_endpoint: measures_endpoint.into(),
        }
    }

    /// Resolve, filter, fetch and rank. Measures are not attached yet.
    pub async fn fetch_hospitals(&self, identifier: &Identifier) -> Result<ResultList<Hospital>> {
        let location = Arc::new(self.resolver.resolve(identifier).await?);
        let query = HospitalQuery::for_location(&location);
        if query == HospitalQuery::Unfiltered {
            warn!(location = %location.display_line(), "no zip or state; querying unfiltered hospital list");
        }

        let url = endpoint_url(&self.hospitals_endpoint, &query.params())?;
        let body = self.transport.get_json(&url).await?;
        let records: Vec<HospitalRecord> = serde_json::from_value(body)
            .map_err(|e| FinderError::MalformedResponse(format!("hospital dataset: {}", e)))?;

        let hospitals: Vec<Hospital> = records
            .into_iter()
            .map(|record| Hospital::new(record, Arc::clone(&location)))
            .collect();

        info!(count = hospitals.len(), filter = ?query, "hospitals fetched");
        Ok(ResultList::from_unsorted(hospitals))
    }

    /// Quality measures for one provider.
    pub async fn fetch_measures(&self, provider_number: &str) -> Result<Measures> {
        let url = endpoint_url(
            &self.measures_endpoint,
            &[
                ("$select", "measure_name,measure_response"),
                ("provider_number", provider_number),
            ],
        )?;
        let body = self.transport.get_json(&url).await?;
        let measures = Measures::from_response(&body);
        debug!(provider = %provider_number, count = measures.len(), "measures fetched");
        Ok(measures)
    }

    /// Fetch the list and wait for every measures lookup (each bounded by
    /// `timeout`). A failed lookup leaves an empty mapping on its record.
    pub async fn fetch_hospitals_with_measures(
        &self,
        identifier: &Identifier,
        timeout: Duration,
    ) -> Result<ResultList<Hospital>> {
        let mut list = self.fetch_hospitals(identifier).await?;

        let mut tasks = JoinSet::new();
        let mut providers: Vec<String> = list.iter().map(|h| h.provider_number().to_string()).collect();
        providers.sort_unstable();
        providers.dedup();
        for provider in providers {
            let fetcher = self.clone();
            tasks.spawn(async move {
                let measures = fetcher.measures_or_empty(&provider, timeout).await;
                (provider, measures)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((provider, measures)) => {
                    list.attach_measures(&provider, &measures);
                }
                Err(e) => warn!(error = %e, "measures task panicked"),
            }
        }
        Ok(list)
    }

    /// Measures, or an empty mapping if the lookup fails or times out.
    pub async fn measures_or_empty(&self, provider_number: &str, timeout: Duration) -> Measures {
        match tokio::time::timeout(timeout, self.fetch_measures(provider_number)).await {
            Ok(Ok(measures)) => measures,
            Ok(Err(e)) => {
                warn!(provider = %provider_number, error = %e, "measures unavailable");
                Measures::default()
            }
            Err(_) => {
                warn!(provider = %provider_number, "measures timed out");
                Measures::default()
            }
        }
    }
}
