//! Dataset registry: the metadata document listing every dataset the map
//! can display.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::choropleth;
use crate::types::{SignpostError, SignpostResult};

/// Metadata for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub title: String,
    #[serde(default)]
    pub about: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    pub url: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,
}

impl DatasetEntry {
    pub fn is_hidden(&self) -> bool {
        self.hidden == Some(true)
    }

    /// Attribution text as shown on the map.
    pub fn attribution_text(&self) -> Option<String> {
        self.attribution
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(|a| format!("Data source: {a}"))
    }

    /// Legend HTML, when the entry has a non-empty one.
    pub fn legend_html(&self) -> Option<&str> {
        self.legend.as_deref().filter(|l| !l.is_empty())
    }
}

/// All datasets, keyed by dataset key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetRegistry {
    entries: BTreeMap<String, DatasetEntry>,
}

impl DatasetRegistry {
    /// Parse the registry document.
    pub fn from_json(json: &str) -> SignpostResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SignpostError::Registry(format!("Failed to parse dataset registry: {e}")))
    }

    pub fn from_value(value: serde_json::Value) -> SignpostResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| SignpostError::Registry(format!("Failed to parse dataset registry: {e}")))
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: DatasetEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&DatasetEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Datasets offered in the selector: hidden entries dropped, sorted by
    /// theme then title, ignoring case.
    pub fn selectable(&self) -> Vec<(&str, &DatasetEntry)> {
        let mut list: Vec<(&str, &DatasetEntry)> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.is_hidden())
            .map(|(k, e)| (k.as_str(), e))
            .collect();

        list.sort_by(|(_, a), (_, b)| {
            a.theme
                .to_lowercase()
                .cmp(&b.theme.to_lowercase())
                .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        });
        list
    }
}

/// Whether a point dataset should start clustered.
///
/// `cluster=true` in the query string forces clustering on and
/// `cluster=false` forces it off; otherwise the dataset's own flag decides.
pub fn cluster_enabled(cluster_param: Option<&str>, entry: &DatasetEntry) -> bool {
    match cluster_param {
        Some("true") => true,
        Some("false") => false,
        _ => entry.cluster == Some(true),
    }
}

/// One option of a select control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub selected: bool,
}

/// The two select controls of the filter panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chooser {
    pub choropleths: Vec<SelectOption>,
    pub datasets: Vec<SelectOption>,
}

/// Build the selector contents. `preselected` is the dataset named in the
/// query string, if any.
pub fn select_options(registry: &DatasetRegistry, preselected: Option<&str>) -> Chooser {
    let mut choropleth_options = vec![SelectOption {
        value: String::new(),
        label: "Select a data layer to display...".to_string(),
        selected: true,
    }];
    choropleth_options.extend(choropleth::options().into_iter().map(|(value, label)| {
        SelectOption {
            value: value.to_string(),
            label: label.to_string(),
            selected: false,
        }
    }));

    let mut dataset_options = vec![SelectOption {
        value: String::new(),
        label: "Select a service to display...".to_string(),
        selected: preselected.is_none(),
    }];
    dataset_options.extend(registry.selectable().into_iter().map(|(key, entry)| SelectOption {
        value: key.to_string(),
        label: entry.title.clone(),
        selected: preselected == Some(key),
    }));

    Chooser {
        choropleths: choropleth_options,
        datasets: dataset_options,
    }
}

/// Options read from the page query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Dataset to open on start.
    pub dataset: Option<String>,
    /// Clustering override, `true` or `false`.
    pub cluster: Option<String>,
}

impl QueryOptions {
    /// Parse a query string, with or without its leading `?`. The first
    /// occurrence of a parameter wins.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut options = Self::default();

        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match name.as_ref() {
                "dataset" => &mut options.dataset,
                "cluster" => &mut options.cluster,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        options
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"{
        "jobcentres": {
            "title": "Jobcentres",
            "about": "Jobcentre Plus offices",
            "attribution": "DWP",
            "url": "https://example.org/jobcentres.geojson",
            "theme": "Employment",
            "cluster": true
        },
        "advice": {
            "title": "advice services",
            "about": "",
            "url": "https://example.org/advice.geojson",
            "theme": "employment"
        },
        "libraries": {
            "title": "Libraries",
            "about": "Public libraries",
            "url": "https://example.org/libraries.geojson",
            "theme": "Community",
            "legend": "<i>Library</i>"
        },
        "internal": {
            "title": "Internal",
            "about": "",
            "url": "https://example.org/internal.geojson",
            "theme": "Admin",
            "hidden": true
        }
    }"#;

    #[test]
    fn test_selectable_sorted_and_hidden_dropped() {
        let registry = DatasetRegistry::from_json(REGISTRY).unwrap();
        let keys: Vec<&str> = registry.selectable().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["libraries", "advice", "jobcentres"]);
        assert!(registry.contains("internal"));
    }

    #[test]
    fn test_cluster_decision_table() {
        let registry = DatasetRegistry::from_json(REGISTRY).unwrap();
        let clustered = registry.get("jobcentres").unwrap();
        let plain = registry.get("advice").unwrap();

        assert!(cluster_enabled(None, clustered));
        assert!(!cluster_enabled(Some("false"), clustered));
        assert!(cluster_enabled(Some("yes"), clustered));
        assert!(!cluster_enabled(None, plain));
        assert!(cluster_enabled(Some("true"), plain));
    }

    #[test]
    fn test_entry_helpers() {
        let registry = DatasetRegistry::from_json(REGISTRY).unwrap();
        let jobcentres = registry.get("jobcentres").unwrap();
        assert_eq!(jobcentres.attribution_text().as_deref(), Some("Data source: DWP"));
        assert!(jobcentres.legend_html().is_none());
        assert_eq!(
            registry.get("libraries").unwrap().legend_html(),
            Some("<i>Library</i>")
        );
    }

    #[test]
    fn test_chooser_marks_preselected() {
        let registry = DatasetRegistry::from_json(REGISTRY).unwrap();
        let c = select_options(&registry, Some("advice"));

        assert_eq!(c.choropleths.len(), 2);
        assert_eq!(c.datasets.len(), 4);
        assert!(!c.datasets[0].selected);
        let selected: Vec<&str> = c
            .datasets
            .iter()
            .filter(|o| o.selected)
            .map(|o| o.value.as_str())
            .collect();
        assert_eq!(selected, vec!["advice"]);
    }

    #[test]
    fn test_query_options() {
        let q = QueryOptions::parse("?dataset=jobcentres&cluster=false&dataset=other");
        assert_eq!(q.dataset.as_deref(), Some("jobcentres"));
        assert_eq!(q.cluster(), Some("false"));

        let q = QueryOptions::parse("dataset=job%20centres");
        assert_eq!(q.dataset.as_deref(), Some("job centres"));
        assert!(q.cluster().is_none());

        assert_eq!(QueryOptions::parse(""), QueryOptions::default());
    }

    #[test]
    fn test_invalid_registry_is_registry_error() {
        let err = DatasetRegistry::from_json(r#"{ "x": { "title": 1 } }"#).unwrap_err();
        assert!(matches!(err, SignpostError::Registry(_)));
    }
}
