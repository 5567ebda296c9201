//! Healthcare plans offered in the county containing a location.

use super::results::{Ranked, ResultList};
use crate::error::{FinderError, Result};
use crate::location::{Identifier, Region, RegionLookup};
use crate::transport::{endpoint_url, Transport};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrochureLink {
    #[serde(default)]
    pub url: String,
}

fn brochure_or_default<'de, D>(deserializer: D) -> std::result::Result<BrochureLink, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BrochureLink>::deserialize(deserializer)?.unwrap_or_default())
}

/// One row of the plan dataset. Unknown columns are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub plan_id_standard_component: Option<String>,
    #[serde(default)]
    pub plan_marketing_name: Option<String>,
    #[serde(default)]
    pub issuer_name: Option<String>,
    #[serde(default)]
    pub metal_level: Option<String>,
    #[serde(default)]
    pub plan_type: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default, deserialize_with = "super::lenient_f64")]
    pub premium_adult_individual_age_30: Option<f64>,
    #[serde(default, deserialize_with = "brochure_or_default")]
    pub plan_brochure_url: BrochureLink,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Plan {
    pub fn name(&self) -> &str {
        self.plan_marketing_name.as_deref().unwrap_or("(unnamed plan)")
    }

    pub fn premium_label(&self) -> String {
        match self.premium_adult_individual_age_30 {
            Some(p) => format!("${:.2}", p),
            None => "n/a".to_string(),
        }
    }
}

impl Ranked for Plan {
    fn rank_key(&self) -> Option<f64> {
        self.premium_adult_individual_age_30
    }
}

/// Filter parameters for a region; empty unless the region is usable.
pub fn plan_query(region: Option<&Region>) -> Vec<(&'static str, String)> {
    match region {
        Some(r) if r.is_resolved() => vec![
            ("state", r.state_code.clone()),
            ("county", r.county_name.clone()),
        ],
        _ => Vec::new(),
    }
}

#[derive(Clone)]
pub struct PlanFetcher {
    regions: RegionLookup,
    transport: Arc<dyn Transport>,
    endpoint: String,
}

impl PlanFetcher {
    pub fn new(regions: RegionLookup, transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            regions,
            transport,
            endpoint: endpoint.into(),
        }
    }

    /// Resolve the county, then fetch its plans ranked by premium.
    ///
    /// When the county can't be determined the unfiltered dataset page is
    /// returned instead.
    pub async fn fetch_plans(&self, identifier: &Identifier) -> Result<ResultList<Plan>> {
        let region = match self.regions.resolve_region(identifier).await {
            Ok(region) => Some(region),
            Err(e) if !e.is_fatal() => {
                warn!(error = %e, "region unresolved; falling back to unfiltered plans");
                None
            }
            Err(e) => return Err(e),
        };
        self.fetch_plans_in(region.as_ref()).await
    }

    /// Fetch plans for an already resolved region (or none).
    pub async fn fetch_plans_in(&self, region: Option<&Region>) -> Result<ResultList<Plan>> {
        let params = plan_query(region);
        if params.is_empty() && region.is_some() {
            warn!(?region, "region incomplete; falling back to unfiltered plans");
        }

        let url = endpoint_url(&self.endpoint, &params)?;
        let body = self.transport.get_json(&url).await?;
        let plans: Vec<Plan> = serde_json::from_value(body)
            .map_err(|e| FinderError::MalformedResponse(format!("plan dataset: {}", e)))?;

        info!(count = plans.len(), filtered = !params.is_empty(), "plans fetched");
        Ok(ResultList::from_unsorted(plans))
    }
}
