//! The choropleth fetch chain: ward boundaries first, then the linked data
//! to shade them with.

use serde_json::Value;

use signpost::choropleth::ChoroplethDef;
use signpost::{to_keyed_dataset, ConvertOptions};

use crate::config::SignpostConfig;
use crate::fetch::Fetcher;
use crate::queries;
use crate::types::{ServerError, ServerResult};

/// Fetch boundaries and data for `def` and build the styled layer.
///
/// The boundary document is cached so later choropleths reuse it.
pub async fn build_choropleth(
    fetcher: &Fetcher,
    config: &SignpostConfig,
    def: &ChoroplethDef,
) -> ServerResult<Value> {
    let query = queries::for_choropleth(def.key)
        .ok_or_else(|| ServerError::NotFound(format!("No query for choropleth '{}'", def.key)))?;

    let boundaries = fetcher.get_json_cached(&config.ward_boundaries).await?;
    let results = fetcher.post_sparql(&config.endpoint, query).await?;

    let data = to_keyed_dataset(&results, def.code_property, &ConvertOptions::default())?;
    let scale = def.scale(&data)?;
    let layer = def.build(boundaries, &data, &scale)?;

    tracing::info!(
        "Built choropleth '{}' from {} data rows, breaks {:?}",
        def.key,
        data.len(),
        scale.limits()
    );
    Ok(layer)
}
