//! Shared data types and errors for the Signpost core library.

use serde::{Deserialize, Serialize};

/// Logical layer group a feature belongs to.
///
/// Each group maps to one layer (or family of layers) on the rendering
/// client, and decides how a highlighted feature is reset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "group", content = "name", rename_all = "snake_case")]
pub enum LayerGroup {
    /// The dataset chosen from the dataset selector.
    Dataset,
    /// A boundary layer such as local authority outlines.
    Geography(String),
    /// A thematic layer shading regions by value.
    Choropleth(String),
    /// A travel-time isoline set from the reachability service.
    Isoline(String),
}

impl std::fmt::Display for LayerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerGroup::Dataset => write!(f, "dataset"),
            LayerGroup::Geography(name) => write!(f, "geography:{name}"),
            LayerGroup::Choropleth(name) => write!(f, "choropleth:{name}"),
            LayerGroup::Isoline(id) => write!(f, "isoline:{id}"),
        }
    }
}

/// Address of a single feature within a loaded layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureRef {
    pub layer: LayerGroup,
    pub index: usize,
}

impl FeatureRef {
    pub fn new(layer: LayerGroup, index: usize) -> Self {
        Self { layer, index }
    }
}

impl std::fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.layer, self.index)
    }
}

/// A place found by the geocoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub name: String,
    /// `[lat, lng]`
    pub center: [f64; 2],
    /// South-west corner `[lat, lng]`.
    pub south_west: [f64; 2],
    /// North-east corner `[lat, lng]`.
    pub north_east: [f64; 2],
}

/// Errors that can occur in the Signpost core library.
#[derive(thiserror::Error, Debug)]
pub enum SignpostError {
    #[error("Dataset integrity error: row {row} has no binding for key variable '{key}'")]
    MissingKey { key: String, row: usize },

    #[error("Error occurred trying to create a colour scale: {0}")]
    Scale(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("No dataset with point data is loaded")]
    NoDataset,

    #[error("Unknown choropleth layer: {0}")]
    UnknownChoropleth(String),

    #[error("Unknown isoline: {0}")]
    UnknownIsoline(String),

    #[error("Invalid GeoJSON: {0}")]
    InvalidGeoJson(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type SignpostResult<T> = Result<T, SignpostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_group_serialization() {
        let value = serde_json::to_value(LayerGroup::Choropleth("claimantCount".into())).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "group": "choropleth", "name": "claimantCount" })
        );

        let value = serde_json::to_value(LayerGroup::Dataset).unwrap();
        assert_eq!(value, serde_json::json!({ "group": "dataset" }));
    }

    #[test]
    fn test_feature_ref_roundtrip_from_client_json() {
        let parsed: FeatureRef = serde_json::from_value(serde_json::json!({
            "layer": { "group": "geography", "name": "LA" },
            "index": 4
        }))
        .unwrap();
        assert_eq!(parsed, FeatureRef::new(LayerGroup::Geography("LA".into()), 4));
    }

    #[test]
    fn test_missing_key_message_names_row() {
        let err = SignpostError::MissingKey {
            key: "area_code".into(),
            row: 3,
        };
        assert!(err.to_string().contains("row 3"));
        assert!(err.to_string().contains("area_code"));
    }
}
