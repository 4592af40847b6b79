//! Instructions for the rendering client.
//!
//! The map engine itself lives in the browser. Every state change produces a
//! list of commands that the client replays against its map, in order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feature::{MarkerIcon, PathStyle};
use crate::types::{FeatureRef, LayerGroup};

/// Map pane a layer is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pane {
    #[serde(rename = "overlayPane")]
    Overlay,
    #[serde(rename = "pane_data_overlay")]
    DataOverlay,
    #[serde(rename = "pane_geography_overlay")]
    GeographyOverlay,
}

/// How the previously highlighted feature gets its normal look back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "name", rename_all = "snake_case")]
pub enum ResetStrategy {
    /// Swap the marker icon back to the default.
    MarkerIcon,
    /// Restore the dataset layer's own style for the feature.
    DatasetStyle,
    /// Restore the isoline group's style.
    IsolineStyle(String),
    /// Restore the named choropleth's style.
    ChoroplethStyle(String),
    /// Apply the fixed boundary style.
    BoundaryDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MapCommand {
    SetTitle {
        title: String,
    },
    UpdateAbout {
        html: String,
    },
    /// Show the info panel with `html`, or clear and hide it.
    UpdateInfo {
        html: Option<String>,
    },
    /// Show the legend panel with `html`, or clear and hide it.
    UpdateLegend {
        html: Option<String>,
    },
    AddLayer {
        layer: LayerGroup,
        pane: Pane,
        geojson: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        attribution: Option<String>,
        /// Point data goes into a marker cluster group.
        clustered: bool,
    },
    RemoveLayer {
        layer: LayerGroup,
    },
    ShowLayer {
        layer: LayerGroup,
    },
    HideLayer {
        layer: LayerGroup,
    },
    /// Swap the dataset between its clustered and plain variants.
    ShowDatasetVariant {
        clustered: bool,
    },
    AddAttribution {
        text: String,
    },
    RemoveAttribution {
        text: String,
    },
    /// Visibility and state of the "cluster markers" checkbox.
    ClusterToggle {
        visible: bool,
        checked: bool,
    },
    SetStyle {
        feature: FeatureRef,
        style: PathStyle,
    },
    SetIcon {
        feature: FeatureRef,
        icon: MarkerIcon,
    },
    BringToFront {
        feature: FeatureRef,
    },
    ResetFeature {
        feature: FeatureRef,
        #[serde(flatten)]
        strategy: ResetStrategy,
    },
    FitLayerBounds {
        layer: LayerGroup,
    },
    FitBounds {
        south_west: [f64; 2],
        north_east: [f64; 2],
    },
    PlaceGeocoderMarker {
        center: [f64; 2],
        popup: String,
    },
    RemoveGeocoderMarker,
    StartSpinner,
    StopSpinner,
    ShowError {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let cmd = MapCommand::ResetFeature {
            feature: FeatureRef::new(LayerGroup::Choropleth("claimantCount".into()), 2),
            strategy: ResetStrategy::ChoroplethStyle("claimantCount".into()),
        };

        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({
                "command": "reset_feature",
                "feature": {
                    "layer": { "group": "choropleth", "name": "claimantCount" },
                    "index": 2
                },
                "strategy": "choropleth_style",
                "name": "claimantCount"
            })
        );

        assert_eq!(
            serde_json::to_value(MapCommand::StartSpinner).unwrap(),
            json!({ "command": "start_spinner" })
        );
    }

    #[test]
    fn test_pane_names() {
        assert_eq!(
            serde_json::to_value(Pane::DataOverlay).unwrap(),
            json!("pane_data_overlay")
        );
    }
}
