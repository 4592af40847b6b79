//! Map state controller.
//!
//! `MapState` owns everything the map shows: the dataset layer, boundary
//! geographies, choropleths, isolines, the selected feature and the geocoder
//! marker. Every mutation returns the commands the rendering client must run
//! to reflect it.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::command::{MapCommand, Pane, ResetStrategy};
use crate::feature::{self, MarkerIcon, PathStyle, RenderKind};
use crate::registry::{self, DatasetEntry};
use crate::types::{FeatureRef, GeocodeResult, LayerGroup, SignpostError, SignpostResult};

/// Page title when no dataset is shown.
pub const APP_TITLE: &str = "Signpost";

/// About text when no dataset is shown.
pub const APP_ABOUT: &str = "Find services relating to worklessness within Greater Manchester.<br /><br /><img src=\"eu_flag.png\" width=\"50\" alt=\"Flag of the European Union\" style=\"float: left; margin-right: 6px; margin-top: 5px;\"/> Developed for the EU funded <a href=\"http://www.opengovintelligence.eu\" target=\"_blank\">opengovintelligence</a> project.";

/// Attribution for layers drawn from Ordnance Survey boundaries.
pub const OS_ATTRIBUTION: &str =
    "Contains Ordnance Survey data © Crown copyright and database right";

/// A loaded GeoJSON layer and the rendering primitive of each feature.
#[derive(Debug, Clone)]
struct FeatureLayer {
    geojson: Value,
    kinds: Vec<RenderKind>,
}

impl FeatureLayer {
    fn new(mut geojson: Value, style: impl Fn(&Value) -> PathStyle) -> Self {
        let kinds = feature::annotate(&mut geojson, style);
        Self { geojson, kinds }
    }

    fn feature(&self, index: usize) -> Option<&Value> {
        feature::features(&self.geojson).get(index).copied()
    }
}

/// The dataset picked from the selector.
#[derive(Debug, Clone)]
struct DatasetLayer {
    key: String,
    layer: FeatureLayer,
    attribution: Option<String>,
    /// Point data exists, so a cluster group was built.
    has_cluster: bool,
    /// The clustered variant is the one on the map.
    clustered: bool,
}

#[derive(Debug, Clone)]
struct ChoroplethLayer {
    layer: FeatureLayer,
    visible: bool,
}

/// All mutable map state, owned by one controller.
#[derive(Debug, Clone)]
pub struct MapState {
    dataset: Option<DatasetLayer>,
    geographies: BTreeMap<String, FeatureLayer>,
    choropleths: BTreeMap<String, ChoroplethLayer>,
    isolines: BTreeMap<String, FeatureLayer>,
    next_isoline: u64,
    selection: Option<FeatureRef>,
    geocoder_marker: bool,
}

impl Default for MapState {
    fn default() -> Self {
        Self::new()
    }
}

impl MapState {
    pub fn new() -> Self {
        Self {
            dataset: None,
            geographies: BTreeMap::new(),
            choropleths: BTreeMap::new(),
            isolines: BTreeMap::new(),
            next_isoline: 1,
            selection: None,
            geocoder_marker: false,
        }
    }

    /// The currently selected feature.
    pub fn selection(&self) -> Option<&FeatureRef> {
        self.selection.as_ref()
    }

    /// Key of the dataset on the map.
    pub fn dataset_key(&self) -> Option<&str> {
        self.dataset.as_ref().map(|d| d.key.as_str())
    }

    /// Whether the dataset is shown clustered.
    pub fn is_clustered(&self) -> bool {
        self.dataset.as_ref().is_some_and(|d| d.clustered)
    }

    pub fn has_choropleth(&self, name: &str) -> bool {
        self.choropleths.contains_key(name)
    }

    pub fn isoline_ids(&self) -> impl Iterator<Item = &str> {
        self.isolines.keys().map(String::as_str)
    }

    fn layer(&self, group: &LayerGroup) -> Option<&FeatureLayer> {
        match group {
            LayerGroup::Dataset => self.dataset.as_ref().map(|d| &d.layer),
            LayerGroup::Geography(name) => self.geographies.get(name),
            LayerGroup::Choropleth(name) => self.choropleths.get(name).map(|c| &c.layer),
            LayerGroup::Isoline(id) => self.isolines.get(id),
        }
    }

    /// The loaded feature a reference points at.
    pub fn feature(&self, feature_ref: &FeatureRef) -> Option<&Value> {
        self.layer(&feature_ref.layer)?.feature(feature_ref.index)
    }

    /// Rendering primitive of a loaded feature.
    pub fn render_kind(&self, feature_ref: &FeatureRef) -> Option<&RenderKind> {
        self.layer(&feature_ref.layer)?.kinds.get(feature_ref.index)
    }

    /// The layer group that currently owns the feature, or `None` when the
    /// reference no longer points at a loaded feature.
    pub fn owner_of<'a>(&self, feature_ref: &'a FeatureRef) -> Option<&'a LayerGroup> {
        self.render_kind(feature_ref).map(|_| &feature_ref.layer)
    }

    /// How a highlighted feature gets its normal look back.
    ///
    /// Markers always swap their icon back, whichever group they are in.
    /// Other features are restored by their owning group, checked in the order
    /// dataset, isoline, choropleth, with boundaries as the fallback.
    pub fn reset_strategy(&self, feature_ref: &FeatureRef) -> Option<ResetStrategy> {
        let kind = self.render_kind(feature_ref)?;
        if *kind == RenderKind::Marker {
            return Some(ResetStrategy::MarkerIcon);
        }

        Some(match &feature_ref.layer {
            LayerGroup::Dataset => ResetStrategy::DatasetStyle,
            LayerGroup::Isoline(id) => ResetStrategy::IsolineStyle(id.clone()),
            LayerGroup::Choropleth(name) => ResetStrategy::ChoroplethStyle(name.clone()),
            LayerGroup::Geography(_) => ResetStrategy::BoundaryDefault,
        })
    }

    /// Restore the look of the selected feature and empty the slot.
    fn reset_selection(&mut self) -> Vec<MapCommand> {
        let Some(previous) = self.selection.take() else {
            return Vec::new();
        };

        match self.reset_strategy(&previous) {
            Some(strategy) => vec![MapCommand::ResetFeature {
                feature: previous,
                strategy,
            }],
            None => {
                tracing::debug!("Selected feature {previous} is no longer loaded; nothing to reset");
                Vec::new()
            }
        }
    }

    /// Whether the group is currently drawn. Hidden choropleths stay loaded
    /// but cannot be clicked.
    fn is_shown(&self, group: &LayerGroup) -> bool {
        match group {
            LayerGroup::Choropleth(name) => self.choropleths.get(name).is_some_and(|c| c.visible),
            _ => true,
        }
    }

    /// Highlight a feature and show its properties.
    ///
    /// Only features of layers on the map can be selected.
    pub fn select(&mut self, feature_ref: FeatureRef) -> SignpostResult<Vec<MapCommand>> {
        let kind = self
            .render_kind(&feature_ref)
            .filter(|_| self.is_shown(&feature_ref.layer))
            .cloned()
            .ok_or_else(|| SignpostError::FeatureNotFound(feature_ref.to_string()))?;

        let mut commands = self.reset_selection();

        if kind == RenderKind::Marker {
            commands.push(MapCommand::SetIcon {
                feature: feature_ref.clone(),
                icon: MarkerIcon::Selected,
            });
        } else {
            commands.push(MapCommand::SetStyle {
                feature: feature_ref.clone(),
                style: PathStyle::selected(),
            });
            // Isolines stay in their drawing order so every interval remains clickable.
            if !matches!(feature_ref.layer, LayerGroup::Isoline(_)) {
                commands.push(MapCommand::BringToFront {
                    feature: feature_ref.clone(),
                });
            }
        }

        if let Some(html) = self.feature(&feature_ref).and_then(feature::properties_html) {
            commands.push(MapCommand::UpdateInfo { html: Some(html) });
        }

        tracing::debug!("Selected {feature_ref}");
        self.selection = Some(feature_ref);
        Ok(commands)
    }

    /// A click on empty map: drop the selection and hide the info panel.
    pub fn clear_selection(&mut self) -> Vec<MapCommand> {
        let mut commands = self.reset_selection();
        commands.push(MapCommand::UpdateInfo { html: None });
        commands
    }

    /// Forget the selection when it matches `should_clear`, hiding the info
    /// panel. A selection in a layer that stays on the map is reset first.
    fn clear_selection_if(
        &mut self,
        should_clear: impl Fn(Option<&LayerGroup>) -> bool,
    ) -> Vec<MapCommand> {
        let Some(selected) = self.selection.as_ref() else {
            return Vec::new();
        };
        if !should_clear(self.owner_of(selected)) {
            return Vec::new();
        }

        let mut commands = self.reset_selection();
        commands.push(MapCommand::UpdateInfo { html: None });
        commands
    }

    /// Take the current dataset off the map.
    fn remove_dataset(&mut self) -> Vec<MapCommand> {
        let mut commands = Vec::new();

        // A selection inside the old dataset is cleared before the layer
        // goes, so it is never reset against the new one.
        commands.extend(self.clear_selection_if(|owner| {
            !matches!(owner, Some(LayerGroup::Geography(_)) | Some(LayerGroup::Isoline(_)))
        }));

        let Some(old) = self.dataset.take() else {
            return commands;
        };

        commands.push(MapCommand::RemoveLayer {
            layer: LayerGroup::Dataset,
        });
        if let Some(text) = old.attribution {
            commands.push(MapCommand::RemoveAttribution { text });
        }
        commands.push(MapCommand::ClusterToggle {
            visible: false,
            checked: false,
        });
        commands.push(MapCommand::UpdateLegend { html: None });

        tracing::debug!("Removed dataset '{}'", old.key);
        commands
    }

    /// First half of a dataset switch, run before its GeoJSON is fetched.
    ///
    /// Removes the current dataset and updates title and about text for
    /// `entry`, or restores the app defaults when the key was unknown.
    pub fn open_dataset(&mut self, entry: Option<&DatasetEntry>) -> Vec<MapCommand> {
        let had_dataset = self.dataset.is_some();
        let mut commands = if had_dataset {
            self.remove_dataset()
        } else {
            Vec::new()
        };

        match entry {
            Some(entry) => {
                commands.push(MapCommand::SetTitle {
                    title: format!("{APP_TITLE}: {}", entry.title),
                });
                commands.push(MapCommand::UpdateAbout {
                    html: entry.about.clone(),
                });
            }
            None => commands.extend(self.defaults()),
        }
        commands
    }

    /// Second half of a dataset switch: put the fetched GeoJSON on the map.
    pub fn install_dataset(
        &mut self,
        key: &str,
        entry: &DatasetEntry,
        geojson: Value,
        cluster_param: Option<&str>,
    ) -> SignpostResult<Vec<MapCommand>> {
        if !(geojson.is_object() || geojson.is_array()) {
            return Err(SignpostError::InvalidGeoJson(format!(
                "dataset '{key}' is not a GeoJSON object"
            )));
        }

        // A second install without an open in between still replaces cleanly.
        let mut commands = if self.dataset.is_some() {
            self.remove_dataset()
        } else {
            Vec::new()
        };

        let layer = FeatureLayer::new(geojson, feature::overlay_style);
        let attribution = entry.attribution_text();
        let has_cluster = layer.kinds.iter().any(RenderKind::is_point);
        let clustered = has_cluster && registry::cluster_enabled(cluster_param, entry);

        commands.push(MapCommand::AddLayer {
            layer: LayerGroup::Dataset,
            pane: Pane::DataOverlay,
            geojson: layer.geojson.clone(),
            attribution: attribution.clone(),
            clustered,
        });

        if has_cluster {
            // Cluster groups do not carry layer attribution themselves.
            if let Some(text) = &attribution {
                commands.push(MapCommand::AddAttribution { text: text.clone() });
            }
            commands.push(MapCommand::ClusterToggle {
                visible: true,
                checked: clustered,
            });
        }

        if let Some(legend) = entry.legend_html() {
            commands.push(MapCommand::UpdateLegend {
                html: Some(legend.to_string()),
            });
        }

        tracing::info!(
            "Loaded dataset '{key}' ({} features, clustered: {clustered})",
            layer.kinds.len()
        );

        self.dataset = Some(DatasetLayer {
            key: key.to_string(),
            layer,
            attribution,
            has_cluster,
            clustered,
        });
        Ok(commands)
    }

    /// Swap the dataset in one step: `open_dataset` then `install_dataset`.
    pub fn replace_dataset(
        &mut self,
        key: &str,
        entry: &DatasetEntry,
        geojson: Value,
        cluster_param: Option<&str>,
    ) -> SignpostResult<Vec<MapCommand>> {
        let mut commands = self.open_dataset(Some(entry));
        commands.extend(self.install_dataset(key, entry, geojson, cluster_param)?);
        Ok(commands)
    }

    /// An unknown dataset key was requested: clear the dataset and fall back
    /// to the app title and about text.
    pub fn reset_dataset(&mut self) -> Vec<MapCommand> {
        self.open_dataset(None)
    }

    fn defaults(&self) -> Vec<MapCommand> {
        vec![
            MapCommand::SetTitle {
                title: APP_TITLE.to_string(),
            },
            MapCommand::UpdateAbout {
                html: APP_ABOUT.to_string(),
            },
        ]
    }

    /// Show the clustered or the plain variant of the dataset.
    pub fn toggle_clustering(&mut self, enabled: bool) -> SignpostResult<Vec<MapCommand>> {
        let dataset = self
            .dataset
            .as_mut()
            .filter(|d| d.has_cluster)
            .ok_or(SignpostError::NoDataset)?;

        dataset.clustered = enabled;
        tracing::debug!("Clustering for '{}' set to {enabled}", dataset.key);
        Ok(vec![MapCommand::ShowDatasetVariant { clustered: enabled }])
    }

    /// Add a boundary layer and zoom the map to it.
    pub fn add_geography(&mut self, name: &str, geojson: Value) -> Vec<MapCommand> {
        let group = LayerGroup::Geography(name.to_string());
        let mut commands = Vec::new();

        if self.geographies.contains_key(name) {
            commands.extend(self.clear_selection_if(|owner| owner == Some(&group)));
            commands.push(MapCommand::RemoveLayer {
                layer: group.clone(),
            });
        }

        let layer = FeatureLayer::new(geojson, |_| PathStyle::boundary());
        commands.push(MapCommand::AddLayer {
            layer: group.clone(),
            pane: Pane::Overlay,
            geojson: layer.geojson.clone(),
            attribution: Some(OS_ATTRIBUTION.to_string()),
            clustered: false,
        });
        commands.push(MapCommand::FitLayerBounds { layer: group });

        tracing::info!("Loaded geography '{name}' ({} features)", layer.kinds.len());
        self.geographies.insert(name.to_string(), layer);
        commands
    }

    /// Add a styled choropleth layer and show it.
    ///
    /// Each feature must already carry its fill in the `style` member.
    pub fn add_choropleth(&mut self, name: &str, geojson: Value) -> Vec<MapCommand> {
        let group = LayerGroup::Choropleth(name.to_string());
        let mut commands = Vec::new();

        if self.choropleths.contains_key(name) {
            commands.extend(self.clear_selection_if(|owner| owner == Some(&group)));
            commands.push(MapCommand::RemoveLayer {
                layer: group.clone(),
            });
        }

        let layer = FeatureLayer::new(geojson, |f| {
            f.get(feature::STYLE_MEMBER)
                .cloned()
                .and_then(|s| serde_json::from_value(s).ok())
                .unwrap_or_default()
        });
        commands.push(MapCommand::AddLayer {
            layer: group,
            pane: Pane::Overlay,
            geojson: layer.geojson.clone(),
            attribution: Some(OS_ATTRIBUTION.to_string()),
            clustered: false,
        });

        tracing::info!("Loaded choropleth '{name}' ({} features)", layer.kinds.len());
        self.choropleths.insert(
            name.to_string(),
            ChoroplethLayer {
                layer,
                visible: true,
            },
        );
        commands
    }

    /// Put an already loaded choropleth back on the map.
    pub fn show_choropleth(&mut self, name: &str) -> SignpostResult<Vec<MapCommand>> {
        let choropleth = self
            .choropleths
            .get_mut(name)
            .ok_or_else(|| SignpostError::UnknownChoropleth(name.to_string()))?;

        if choropleth.visible {
            return Ok(Vec::new());
        }
        choropleth.visible = true;
        Ok(vec![MapCommand::ShowLayer {
            layer: LayerGroup::Choropleth(name.to_string()),
        }])
    }

    /// Take every visible choropleth off the map. Layers stay loaded.
    pub fn hide_choropleths(&mut self) -> Vec<MapCommand> {
        self.choropleths
            .iter_mut()
            .filter(|(_, c)| c.visible)
            .map(|(name, c)| {
                c.visible = false;
                MapCommand::HideLayer {
                    layer: LayerGroup::Choropleth(name.clone()),
                }
            })
            .collect()
    }

    /// Add an isoline set returned by the reachability service, returning
    /// its new id.
    pub fn add_isoline(&mut self, geojson: Value) -> SignpostResult<(String, Vec<MapCommand>)> {
        if !(geojson.is_object() || geojson.is_array()) {
            return Err(SignpostError::InvalidGeoJson(
                "isoline is not a GeoJSON object".to_string(),
            ));
        }

        let id = format!("isoline-{}", self.next_isoline);
        self.next_isoline += 1;

        let layer = FeatureLayer::new(geojson, feature::overlay_style);
        let commands = vec![MapCommand::AddLayer {
            layer: LayerGroup::Isoline(id.clone()),
            pane: Pane::GeographyOverlay,
            geojson: layer.geojson.clone(),
            attribution: None,
            clustered: false,
        }];

        tracing::debug!("Added {id} ({} features)", layer.kinds.len());
        self.isolines.insert(id.clone(), layer);
        Ok((id, commands))
    }

    /// Remove an isoline set. When the selection is left without a dataset,
    /// geography or isoline owning it, the info panel is cleared.
    pub fn delete_isoline(&mut self, id: &str) -> SignpostResult<Vec<MapCommand>> {
        if self.isolines.remove(id).is_none() {
            return Err(SignpostError::UnknownIsoline(id.to_string()));
        }

        let mut commands = vec![MapCommand::RemoveLayer {
            layer: LayerGroup::Isoline(id.to_string()),
        }];
        commands.extend(self.clear_selection_if(|owner| {
            !matches!(
                owner,
                Some(LayerGroup::Isoline(_))
                    | Some(LayerGroup::Geography(_))
                    | Some(LayerGroup::Dataset)
            )
        }));

        tracing::debug!("Deleted {id}");
        Ok(commands)
    }

    /// Zoom to a geocoder result and mark it, replacing any earlier marker.
    pub fn place_geocode(&mut self, result: &GeocodeResult) -> Vec<MapCommand> {
        let mut commands = vec![MapCommand::FitBounds {
            south_west: result.south_west,
            north_east: result.north_east,
        }];
        if self.geocoder_marker {
            commands.push(MapCommand::RemoveGeocoderMarker);
        }
        commands.push(MapCommand::PlaceGeocoderMarker {
            center: result.center,
            popup: result.name.clone(),
        });
        self.geocoder_marker = true;
        commands
    }
}
