//! Structural quality measures reported per hospital.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Measure name → reported status.
///
/// `Some(true)` met, `Some(false)` reported as not met, `None` not reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Measures(pub BTreeMap<String, Option<bool>>);

#[derive(Deserialize)]
struct MeasureRow {
    #[serde(default)]
    measure_name: Option<String>,
    #[serde(default)]
    measure_response: Option<String>,
}

/// Classify one `measure_response` value.
pub fn classify(response: Option<&str>) -> Option<bool> {
    match response {
        Some("Y") | Some("Yes") => Some(true),
        Some("Not Available") => None,
        _ => Some(false),
    }
}

impl Measures {
    /// Build from the measures service answer.
    ///
    /// Anything that isn't an array of rows gives an empty mapping; rows
    /// without a name are skipped.
    pub fn from_response(body: &Value) -> Self {
        let Some(rows) = body.as_array() else {
            return Self::default();
        };
        let map = rows
            .iter()
            .filter_map(|row| serde_json::from_value::<MeasureRow>(row.clone()).ok())
            .filter_map(|row| {
                let name = row.measure_name?;
                Some((name, classify(row.measure_response.as_deref())))
            })
            .collect();
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<Option<bool>> {
        self.0.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<bool>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tri_state_mapping() {
        let body = json!([
            {"measure_name": "M1", "measure_response": "Yes"},
            {"measure_name": "M2", "measure_response": "Not Available"},
            {"measure_name": "M3", "measure_response": "No"}
        ]);
        let measures = Measures::from_response(&body);
        assert_eq!(measures.get("M1"), Some(Some(true)));
        assert_eq!(measures.get("M2"), Some(None));
        assert_eq!(measures.get("M3"), Some(Some(false)));
        assert_eq!(measures.len(), 3);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Some("Y")), Some(true));
        assert_eq!(classify(Some("Yes")), Some(true));
        assert_eq!(classify(Some("yes")), Some(false));
        assert_eq!(classify(Some("Not Available")), None);
        assert_eq!(classify(None), Some(false));
    }

    #[test]
    fn test_absent_data_is_empty() {
        assert!(Measures::from_response(&json!({"error": true})).is_empty());
        assert!(Measures::from_response(&json!([{"measure_response": "Y"}])).is_empty());
        assert!(Measures::from_response(&json!([])).is_empty());
    }

    #[test]
    fn test_serializes_null_for_not_reported() {
        let measures = Measures::from_response(&json!([
            {"measure_name": "M2", "measure_response": "Not Available"}
        ]));
        assert_eq!(serde_json::to_value(&measures).unwrap(), json!({"M2": null}));
    }
}
