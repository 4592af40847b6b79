//! Place search against a Nominatim-compatible geocoder, limited to the UK.

use serde::Deserialize;

use signpost::GeocodeResult;

use crate::fetch::Fetcher;
use crate::types::{ServerError, ServerResult};

/// Message shown when a search finds nothing.
pub const NOTHING_FOUND: &str = "Sorry, nothing found.";

const COUNTRY_CODES: &str = "gb";

/// One Nominatim search hit. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct Place {
    display_name: String,
    lat: String,
    lon: String,
    /// `[south, north, west, east]`
    #[serde(default)]
    boundingbox: Vec<String>,
}

impl Place {
    fn into_result(self) -> Option<GeocodeResult> {
        let lat: f64 = self.lat.parse().ok()?;
        let lon: f64 = self.lon.parse().ok()?;

        let (south_west, north_east) = match self.boundingbox.as_slice() {
            [south, north, west, east] => (
                [south.parse().ok()?, west.parse().ok()?],
                [north.parse().ok()?, east.parse().ok()?],
            ),
            _ => ([lat, lon], [lat, lon]),
        };

        Some(GeocodeResult {
            name: self.display_name,
            center: [lat, lon],
            south_west,
            north_east,
        })
    }
}

/// Geocoder client.
#[derive(Clone)]
pub struct Geocoder {
    fetcher: Fetcher,
    base: url::Url,
}

impl Geocoder {
    pub fn new(fetcher: Fetcher, base: &str) -> ServerResult<Self> {
        let mut base = url::Url::parse(base)
            .map_err(|e| ServerError::InvalidParams(format!("Invalid geocoder URL '{base}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { fetcher, base })
    }

    /// URL of a search for `query`.
    pub fn search_url(&self, query: &str) -> ServerResult<url::Url> {
        let mut url = self
            .base
            .join("search")
            .map_err(|e| ServerError::InvalidParams(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("q", query)
            .append_pair("countrycodes", COUNTRY_CODES);
        Ok(url)
    }

    /// All places matching `query`, best match first.
    pub async fn search(&self, query: &str) -> ServerResult<Vec<GeocodeResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServerError::InvalidParams("empty search".to_string()));
        }

        let url = self.search_url(query)?;
        let places: Vec<Place> = serde_json::from_value(self.fetcher.get_json(url.as_str()).await?)?;
        let total = places.len();

        let results: Vec<GeocodeResult> = places.into_iter().filter_map(Place::into_result).collect();
        if results.len() < total {
            tracing::warn!("Skipped {} geocoder results with bad coordinates", total - results.len());
        }
        tracing::debug!("Geocoder found {} places for '{query}'", results.len());
        Ok(results)
    }

    /// The best match for `query`.
    pub async fn locate(&self, query: &str) -> ServerResult<GeocodeResult> {
        self.search(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServerError::NotFound(NOTHING_FOUND.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url() {
        let fetcher = Fetcher::new(1000).unwrap();
        let geocoder = Geocoder::new(fetcher, "https://nominatim.openstreetmap.org").unwrap();
        let url = geocoder.search_url("Stretford Mall").unwrap();
        assert_eq!(
            url.as_str(),
            "https://nominatim.openstreetmap.org/search?format=json&q=Stretford+Mall&countrycodes=gb"
        );
    }

    #[test]
    fn test_place_conversion() {
        let place = Place {
            display_name: "Altrincham, Trafford".into(),
            lat: "53.3838".into(),
            lon: "-2.3547".into(),
            boundingbox: vec!["53.37".into(), "53.39".into(), "-2.37".into(), "-2.34".into()],
        };
        let result = place.into_result().unwrap();
        assert_eq!(result.center, [53.3838, -2.3547]);
        assert_eq!(result.south_west, [53.37, -2.37]);
        assert_eq!(result.north_east, [53.39, -2.34]);

        let bad = Place {
            display_name: "Nowhere".into(),
            lat: "north".into(),
            lon: "0".into(),
            boundingbox: vec![],
        };
        assert!(bad.into_result().is_none());
    }
}
