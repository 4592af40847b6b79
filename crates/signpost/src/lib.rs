//! Signpost core library: SPARQL result normalisation, colour scales, GeoJSON feature classification, and map state.

pub mod choropleth;
pub mod command;
pub mod feature;
pub mod registry;
pub mod scale;
pub mod sparql;
pub mod state;
pub mod types;

pub use choropleth::{ChoroplethDef, CLAIMANT_COUNT, CLAIMANT_COUNT_DEF};
pub use command::{MapCommand, Pane, ResetStrategy};
pub use feature::{classify, PathStyle, RenderKind};
pub use registry::{DatasetEntry, DatasetRegistry, QueryOptions};
pub use scale::{ColorScale, ScaleOptions};
pub use sparql::{to_keyed_dataset, ConvertOptions, KeyedDataset, SparqlResults, TypedValue, ValueType};
pub use state::MapState;
pub use types::*;
