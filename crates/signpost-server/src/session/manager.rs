//! Map session lifecycle: owns the map state and runs the fetch chains that
//! feed it.
//!
//! The map state sits behind its own lock, taken only for the synchronous
//! state changes. Fetches run with the lock released, so selection and other
//! local actions stay responsive while a chain is in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use signpost::choropleth;
use signpost::registry::{self, Chooser};
use signpost::{DatasetRegistry, FeatureRef, MapCommand, MapState, QueryOptions};

use crate::config::SignpostConfig;
use crate::fetch::Fetcher;
use crate::geocode::Geocoder;
use crate::loading::LoadingIndicator;
use crate::session::choropleth::build_choropleth;
use crate::types::ServerResult;

/// Boundary layer shown when the map starts.
pub const LA_GEOGRAPHY: &str = "LA";

/// Drives one map client.
pub struct SignpostSession {
    id: String,
    config: SignpostConfig,
    fetcher: Fetcher,
    geocoder: Geocoder,
    registry: DatasetRegistry,
    state: Mutex<MapState>,
    /// Bumped by every dataset switch; a fetch finishing under an older
    /// value has been superseded.
    dataset_generation: AtomicU64,
    loading: Arc<LoadingIndicator>,
}

impl SignpostSession {
    /// Open a session, loading the dataset registry named in `config`.
    pub async fn open(config: SignpostConfig) -> ServerResult<Self> {
        let fetcher = Fetcher::new(config.timeout_ms)?;
        let registry = fetcher.load_registry(&config.registry).await?;
        Self::with_registry(config, fetcher, registry)
    }

    /// Open a session around an already loaded registry.
    pub fn with_registry(
        config: SignpostConfig,
        fetcher: Fetcher,
        registry: DatasetRegistry,
    ) -> ServerResult<Self> {
        let geocoder = Geocoder::new(fetcher.clone(), &config.geocoder)?;
        let id = uuid::Uuid::new_v4().to_string();

        tracing::info!(
            "Session {id} opened with {} datasets, endpoint {}",
            registry.len(),
            config.endpoint
        );

        Ok(Self {
            id,
            config,
            fetcher,
            geocoder,
            registry,
            state: Mutex::new(MapState::new()),
            dataset_generation: AtomicU64::new(0),
            loading: LoadingIndicator::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SignpostConfig {
        &self.config
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    /// Lock the map state for reading. Do not hold the guard across a fetch.
    pub async fn state(&self) -> MutexGuard<'_, MapState> {
        self.state.lock().await
    }

    /// Shared handle to the loading indicator, readable while a chain runs.
    pub fn loading(&self) -> Arc<LoadingIndicator> {
        Arc::clone(&self.loading)
    }

    /// Contents of the dataset and choropleth selectors.
    pub fn chooser(&self, preselected: Option<&str>) -> Chooser {
        registry::select_options(&self.registry, preselected)
    }

    /// Initial map: local authority boundaries, then the dataset named in
    /// the query string, if any.
    pub async fn start(&self, query: &QueryOptions) -> Vec<MapCommand> {
        let mut commands = Vec::new();

        match self.fetcher.get_json(&self.config.la_boundaries).await {
            Ok(geojson) => {
                let mut state = self.state.lock().await;
                commands.extend(state.add_geography(LA_GEOGRAPHY, geojson));
            }
            Err(e) => {
                tracing::error!("Failed to load local authority boundaries: {e}");
                commands.push(MapCommand::ShowError {
                    message: e.to_string(),
                });
            }
        }

        if let Some(key) = query.dataset.as_deref() {
            commands.extend(self.load_dataset(key, query.cluster()).await);
        }
        commands
    }

    /// Switch to the dataset `key`. An unknown key clears the dataset and
    /// restores the app title.
    ///
    /// Fetch failures leave the old dataset removed and end with a
    /// [`MapCommand::ShowError`]. If another switch starts while this one is
    /// fetching, this one's GeoJSON is discarded.
    pub async fn load_dataset(&self, key: &str, cluster_param: Option<&str>) -> Vec<MapCommand> {
        let entry = self.registry.get(key).cloned();
        let (generation, mut commands) = {
            let mut state = self.state.lock().await;
            let generation = self.dataset_generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, state.open_dataset(entry.as_ref()))
        };

        let Some(entry) = entry else {
            tracing::warn!("Unknown dataset '{key}' requested");
            return commands;
        };

        let _guard = self.loading.start(key);
        let fetched = self.fetcher.get_json(&entry.url).await;

        let mut state = self.state.lock().await;
        if self.dataset_generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Dataset '{key}' superseded before its fetch finished");
            return commands;
        }

        let loaded = match fetched {
            Ok(geojson) => state
                .install_dataset(key, &entry, geojson, cluster_param)
                .map_err(|e| format!("Error attempting to create GeoJSON layer: {e}")),
            Err(e) => Err(e.to_string()),
        };

        match loaded {
            Ok(added) => commands.extend(added),
            Err(message) => {
                tracing::error!("Dataset '{key}' failed to load: {message}");
                commands.push(MapCommand::ShowError { message });
            }
        }
        commands
    }

    pub async fn toggle_clustering(&self, enabled: bool) -> ServerResult<Vec<MapCommand>> {
        Ok(self.state.lock().await.toggle_clustering(enabled)?)
    }

    /// Show the choropleth `name`, building it on first use. An empty name
    /// hides every choropleth.
    pub async fn load_choropleth(&self, name: &str) -> ServerResult<Vec<MapCommand>> {
        {
            let mut state = self.state.lock().await;
            if name.is_empty() {
                return Ok(state.hide_choropleths());
            }
            if state.has_choropleth(name) {
                return Ok(state.show_choropleth(name)?);
            }
        }

        let def = choropleth::find(name)
            .ok_or_else(|| signpost::SignpostError::UnknownChoropleth(name.to_string()))?;

        let _guard = self.loading.start(name);
        let built = build_choropleth(&self.fetcher, &self.config, def).await;

        let mut state = self.state.lock().await;
        let commands = match built {
            // Built twice by overlapping requests: the first one in wins.
            Ok(_) if state.has_choropleth(name) => state.show_choropleth(name)?,
            Ok(layer) => state.add_choropleth(name, layer),
            Err(e) => {
                tracing::error!("Choropleth '{name}' failed to load: {e}");
                vec![MapCommand::ShowError {
                    message: e.to_string(),
                }]
            }
        };
        Ok(commands)
    }

    pub async fn hide_choropleths(&self) -> Vec<MapCommand> {
        self.state.lock().await.hide_choropleths()
    }

    pub async fn select(&self, feature: FeatureRef) -> ServerResult<Vec<MapCommand>> {
        Ok(self.state.lock().await.select(feature)?)
    }

    pub async fn clear_selection(&self) -> Vec<MapCommand> {
        self.state.lock().await.clear_selection()
    }

    /// Add isolines computed by the reachability service.
    pub async fn add_isoline(&self, geojson: Value) -> ServerResult<(String, Vec<MapCommand>)> {
        Ok(self.state.lock().await.add_isoline(geojson)?)
    }

    pub async fn delete_isoline(&self, id: &str) -> ServerResult<Vec<MapCommand>> {
        Ok(self.state.lock().await.delete_isoline(id)?)
    }

    /// Search for a place and mark the best match.
    pub async fn geocode(&self, query: &str) -> ServerResult<Vec<MapCommand>> {
        let place = self.geocoder.locate(query).await?;
        tracing::debug!("Geocoded '{query}' to {}", place.name);
        Ok(self.state.lock().await.place_geocode(&place))
    }
}

impl std::fmt::Debug for SignpostSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignpostSession")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("datasets", &self.registry.len())
            .finish()
    }
}
