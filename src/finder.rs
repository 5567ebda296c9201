//! Wires the resolution chain and both fetchers to one transport.

use crate::config::Config;
use crate::datasets::{HospitalFetcher, PlanFetcher};
use crate::location::{CallbackRegistry, GeoCoder, LocationResolver, RegionLookup};
use crate::transport::{Transport, UreqTransport};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Finder {
    pub resolver: LocationResolver,
    pub regions: RegionLookup,
    pub hospitals: HospitalFetcher,
    pub plans: PlanFetcher,
    pub callbacks: CallbackRegistry,
    call_timeout: Duration,
    http_timeout: Duration,
}

impl Finder {
    /// Production wiring over `ureq`.
    pub fn new(config: &Config) -> Self {
        Self::with_transport(config, Arc::new(UreqTransport::new(&config.http)))
    }

    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let endpoints = &config.endpoints;
        let callbacks = CallbackRegistry::new();

        let geocoder = GeoCoder::new(transport.clone(), endpoints.geocode.clone());
        let resolver = LocationResolver::new(geocoder, transport.clone(), endpoints.ip_geolocation.clone());
        let regions = RegionLookup::new(
            resolver.clone(),
            transport.clone(),
            endpoints.region.clone(),
            callbacks.clone(),
            config.region.clone(),
        );
        let hospitals = HospitalFetcher::new(
            resolver.clone(),
            transport.clone(),
            endpoints.hospitals.clone(),
            endpoints.measures.clone(),
        );
        let plans = PlanFetcher::new(regions.clone(), transport, endpoints.plans.clone());

        // A plan fetch chains geocoding, the region callback and the dataset call.
        let call_timeout = config.http.timeout() * 3 + config.region.callback_timeout();

        Self {
            resolver,
            regions,
            hospitals,
            plans,
            callbacks,
            call_timeout,
            http_timeout: config.http.timeout(),
        }
    }

    /// Upper bound for one suspended pipeline step.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Upper bound for one per-hospital measures lookup.
    pub fn measures_timeout(&self) -> Duration {
        self.http_timeout
    }
}
