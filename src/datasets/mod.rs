//! Dataset fetchers: nearby hospitals and county healthcare plans.

pub mod hospitals;
pub mod measures;
pub mod plans;
pub mod results;

pub use hospitals::{Hospital, HospitalFetcher, HospitalQuery, HospitalRecord};
pub use measures::Measures;
pub use plans::{Plan, PlanFetcher};
pub use results::{Ranked, ResultList};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Open-data portals publish numbers as strings (sometimes with `$` and `,`).
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_number))
}

pub(crate) fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| *c != '$' && *c != ',').collect();
            cleaned.trim().parse().ok()
        }
        _ => None,
    }
}
