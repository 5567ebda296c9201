//! Settings file at ~/.healthfinder/config.toml.
//!
//! Every key is optional; a missing file means all defaults.

use crate::error::{FinderError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoints: Endpoints,
    pub http: HttpSettings,
    pub region: RegionSettings,
    pub server: ServerSettings,
}

/// Base URLs of the upstream services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub geocode: String,
    pub ip_geolocation: String,
    pub region: String,
    pub hospitals: String,
    pub measures: String,
    pub plans: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            geocode: "https://nominatim.openstreetmap.org/search".into(),
            ip_geolocation: "https://freegeoip.net/json/".into(),
            region: "http://data.fcc.gov/api/block/find".into(),
            hospitals: "http://data.medicare.gov/resource/v287-28n3.json".into(),
            measures: "http://data.medicare.gov/resource/easc-zwde.json".into(),
            plans: "https://data.healthcare.gov/resource/b8in-sz6k.json".into(),
        }
    }
}

impl Endpoints {
    /// Point every service at one base URL (mock servers, local mirrors).
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            geocode: format!("{}/search", base),
            ip_geolocation: format!("{}/json/", base),
            region: format!("{}/api/block/find", base),
            hospitals: format!("{}/resource/hospitals.json", base),
            measures: format!("{}/resource/measures.json", base),
            plans: format!("{}/resource/plans.json", base),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("HealthFinder/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 10,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// How long to wait for the region callback before giving up.
    pub callback_timeout_secs: u64,
    /// Prefix of the per-request callback names.
    pub callback_prefix: String,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            callback_timeout_secs: 15,
            callback_prefix: "gotCounty".into(),
        }
    }
}

impl RegionSettings {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from a specific path. Missing file = defaults; bad file = error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .map_err(|e| FinderError::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&data).map_err(|e| match e {
            FinderError::Config(msg) => FinderError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn parse(data: &str) -> Result<Self> {
        toml::from_str(data).map_err(|e| FinderError::Config(e.to_string()))
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".healthfinder")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.region.callback_prefix, "gotCounty");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[http]\ntimeout_secs = 3\n\n[endpoints]\nplans = \"http://localhost:9000/plans.json\"\n",
        )
        .unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.http.timeout_secs, 3);
        assert_eq!(cfg.endpoints.plans, "http://localhost:9000/plans.json");
        assert_eq!(cfg.endpoints.geocode, Endpoints::default().geocode);
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[http\ntimeout_secs = ").unwrap();
        assert!(matches!(Config::load_from(&path), Err(FinderError::Config(_))));
    }

    #[test]
    fn test_rooted_endpoints() {
        let e = Endpoints::rooted_at("http://127.0.0.1:4000/");
        assert_eq!(e.geocode, "http://127.0.0.1:4000/search");
        assert_eq!(e.region, "http://127.0.0.1:4000/api/block/find");
    }
}
