//! Configuration loading and resolution.
//!
//! Every setting resolves in the same order: explicit flag, then
//! environment variable, then the built-in default.

use crate::types::{ServerError, ServerResult};

pub const ENV_REGISTRY: &str = "SIGNPOST_REGISTRY";
pub const ENV_ENDPOINT: &str = "SIGNPOST_ENDPOINT";
pub const ENV_GEOCODER: &str = "SIGNPOST_GEOCODER";
pub const ENV_TIMEOUT_MS: &str = "SIGNPOST_TIMEOUT_MS";
pub const ENV_LA_BOUNDARIES: &str = "SIGNPOST_LA_BOUNDARIES";
pub const ENV_WARD_BOUNDARIES: &str = "SIGNPOST_WARD_BOUNDARIES";

pub const DEFAULT_REGISTRY: &str = "apps/signpost/datasets.json";
pub const DEFAULT_ENDPOINT: &str = "http://gmdatastore.org.uk/sparql.json";
pub const DEFAULT_GEOCODER: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_LA_BOUNDARIES: &str = "https://www.trafforddatalab.io/spatial_data/local_authority/2016/gm_local_authority_full_resolution.geojson";
pub const DEFAULT_WARD_BOUNDARIES: &str =
    "https://www.trafforddatalab.io/spatial_data/ward/2017/gm_ward_full_resolution.geojson";

/// Resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignpostConfig {
    /// Dataset registry, as a file path or an http(s) URL.
    pub registry: String,
    /// SPARQL endpoint for choropleth data.
    pub endpoint: String,
    /// Base URL of a Nominatim-compatible geocoder.
    pub geocoder: String,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Local authority boundaries, shown on start.
    pub la_boundaries: String,
    /// Ward boundaries, joined with choropleth data.
    pub ward_boundaries: String,
}

impl Default for SignpostConfig {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            geocoder: DEFAULT_GEOCODER.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            la_boundaries: DEFAULT_LA_BOUNDARIES.to_string(),
            ward_boundaries: DEFAULT_WARD_BOUNDARIES.to_string(),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub registry: Option<String>,
    pub endpoint: Option<String>,
    pub geocoder: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl SignpostConfig {
    /// Resolve against the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> ServerResult<Self> {
        Self::resolve_with(overrides, |name| std::env::var(name).ok())
    }

    /// Resolve with a custom environment lookup.
    pub fn resolve_with(
        overrides: ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> ServerResult<Self> {
        let setting = |explicit: Option<String>, name: &str, default: &str| {
            explicit
                .or_else(|| env(name).filter(|v| !v.trim().is_empty()))
                .unwrap_or_else(|| default.to_string())
        };

        let timeout_ms = match overrides.timeout_ms {
            Some(ms) => ms,
            None => match env(ENV_TIMEOUT_MS) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    ServerError::InvalidParams(format!("{ENV_TIMEOUT_MS} must be a number of milliseconds, got '{raw}'"))
                })?,
                None => DEFAULT_TIMEOUT_MS,
            },
        };

        let config = Self {
            registry: setting(overrides.registry, ENV_REGISTRY, DEFAULT_REGISTRY),
            endpoint: setting(overrides.endpoint, ENV_ENDPOINT, DEFAULT_ENDPOINT),
            geocoder: setting(overrides.geocoder, ENV_GEOCODER, DEFAULT_GEOCODER),
            timeout_ms,
            la_boundaries: setting(None, ENV_LA_BOUNDARIES, DEFAULT_LA_BOUNDARIES),
            ward_boundaries: setting(None, ENV_WARD_BOUNDARIES, DEFAULT_WARD_BOUNDARIES),
        };

        tracing::debug!("Resolved configuration: {config:?}");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SignpostConfig::resolve_with(ConfigOverrides::default(), env(&[])).unwrap();
        assert_eq!(config, SignpostConfig::default());
    }

    #[test]
    fn test_flag_beats_env_beats_default() {
        let overrides = ConfigOverrides {
            endpoint: Some("http://flag/sparql".into()),
            ..Default::default()
        };
        let config = SignpostConfig::resolve_with(
            overrides,
            env(&[
                (ENV_ENDPOINT, "http://env/sparql"),
                (ENV_REGISTRY, "/srv/datasets.json"),
                (ENV_TIMEOUT_MS, "5000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.endpoint, "http://flag/sparql");
        assert_eq!(config.registry, "/srv/datasets.json");
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.geocoder, DEFAULT_GEOCODER);
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        let err = SignpostConfig::resolve_with(
            ConfigOverrides::default(),
            env(&[(ENV_TIMEOUT_MS, "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, ServerError::InvalidParams(_)));
    }
}
