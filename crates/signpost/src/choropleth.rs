//! Choropleth layers: join a keyed dataset onto boundary GeoJSON and shade
//! each region through a colour scale.

use serde_json::{Map, Value};

use crate::feature::{self, PathStyle};
use crate::scale::{ColorScale, Palette, ScaleOptions};
use crate::sparql::KeyedDataset;
use crate::types::{SignpostError, SignpostResult};

/// Layer key of the claimant count choropleth.
pub const CLAIMANT_COUNT: &str = "claimantCount";

/// Describes how a dataset is joined onto boundaries and labelled.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoroplethDef {
    /// Layer key, as used by the selector.
    pub key: &'static str,
    /// Human readable label for the selector.
    pub label: &'static str,
    /// Boundary property holding the join code.
    pub code_property: &'static str,
    /// Boundary property holding the region name.
    pub name_property: &'static str,
    /// Dataset field to shade by.
    pub value_field: &'static str,
    /// Property names shown in the info panel: code, name, value.
    pub labels: [&'static str; 3],
    pub palette: &'static str,
}

/// Percentage of residents claiming out-of-work benefits, by ward.
pub const CLAIMANT_COUNT_DEF: ChoroplethDef = ChoroplethDef {
    key: CLAIMANT_COUNT,
    label: "Claimant count percentage",
    code_property: "area_code",
    name_property: "area_name",
    value_field: "percent",
    labels: ["Ward code", "Ward name", "Claimant count %"],
    palette: "Blues",
};

/// Every choropleth the map offers.
pub const CHOROPLETHS: &[ChoroplethDef] = &[CLAIMANT_COUNT_DEF];

/// Look up a choropleth by key.
pub fn find(key: &str) -> Option<&'static ChoroplethDef> {
    CHOROPLETHS.iter().find(|s| s.key == key)
}

/// `(key, label)` pairs for the selector.
pub fn options() -> Vec<(&'static str, &'static str)> {
    CHOROPLETHS.iter().map(|s| (s.key, s.label)).collect()
}

impl ChoroplethDef {
    /// Build the colour scale for this choropleth from the dataset.
    pub fn scale(&self, data: &KeyedDataset) -> SignpostResult<ColorScale> {
        ColorScale::build(
            ScaleOptions::new(data.numeric_column(self.value_field))
                .palette(Palette::named(self.palette)),
        )
    }

    /// Join `data` onto `boundaries`, replacing each feature's properties
    /// with the labelled code, name and value, and attaching its fill.
    ///
    /// Regions missing from the dataset keep a `null` value and the no-data
    /// fill.
    pub fn build(
        &self,
        mut boundaries: Value,
        data: &KeyedDataset,
        scale: &ColorScale,
    ) -> SignpostResult<Value> {
        if boundaries.get("features").and_then(Value::as_array).is_none() {
            return Err(SignpostError::InvalidGeoJson(
                "boundary document has no feature array".to_string(),
            ));
        }

        let [code_label, name_label, value_label] = self.labels;
        let mut missing = 0usize;

        for region in feature::features_mut(&mut boundaries) {
            let props = region.get("properties");
            let code = props
                .and_then(|p| p.get(self.code_property))
                .cloned()
                .unwrap_or(Value::Null);
            let name = props
                .and_then(|p| p.get(self.name_property))
                .cloned()
                .unwrap_or(Value::Null);

            let value = code
                .as_str()
                .and_then(|c| data.value(c, self.value_field))
                .cloned();
            if value.is_none() {
                missing += 1;
            }
            let fill = scale.color_hex(value.as_ref().and_then(|v| v.as_f64()));

            let mut new_props = Map::new();
            new_props.insert(code_label.to_string(), code);
            new_props.insert(name_label.to_string(), name);
            new_props.insert(value_label.to_string(), value.map(Value::from).unwrap_or(Value::Null));

            if let Value::Object(members) = region {
                members.insert("properties".to_string(), Value::Object(new_props));
                members.insert(
                    feature::STYLE_MEMBER.to_string(),
                    serde_json::to_value(PathStyle::choropleth(fill))?,
                );
            }
        }

        if missing > 0 {
            tracing::warn!(
                "{missing} regions in choropleth '{}' have no matching data",
                self.key
            );
        }

        Ok(boundaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparql::{Record, TypedValue};
    use serde_json::json;

    fn wards() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Polygon", "coordinates": [] },
                    "properties": { "area_code": "E05000819", "area_name": "Altrincham", "extra": 1 }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Polygon", "coordinates": [] },
                    "properties": { "area_code": "E05000820", "area_name": "Ashton upon Mersey" }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Polygon", "coordinates": [] },
                    "properties": { "area_code": "E05000999", "area_name": "Nowhere" }
                }
            ]
        })
    }

    fn data() -> KeyedDataset {
        let mut d = KeyedDataset::new();
        d.insert(
            "E05000819",
            Record::from([("percent".to_string(), TypedValue::Float(1.2))]),
        );
        d.insert(
            "E05000820",
            Record::from([("percent".to_string(), TypedValue::Float(4.8))]),
        );
        d
    }

    #[test]
    fn test_build_renames_properties_and_shades() {
        let data = data();
        let scale = CLAIMANT_COUNT_DEF.scale(&data).unwrap();
        let layer = CLAIMANT_COUNT_DEF.build(wards(), &data, &scale).unwrap();

        let first = &layer["features"][0];
        assert_eq!(
            first["properties"],
            json!({ "Ward code": "E05000819", "Ward name": "Altrincham", "Claimant count %": 1.2 })
        );
        assert_eq!(first["style"]["fillColor"], json!(scale.color(1.2).to_string()));
        assert_eq!(first["style"]["fillOpacity"], json!(0.5));
        assert_eq!(first["style"]["color"], json!("#212121"));

        let last = &layer["features"][2];
        assert_eq!(last["properties"]["Claimant count %"], Value::Null);
        assert_eq!(last["style"]["fillColor"], json!("#cccccc"));
    }

    #[test]
    fn test_build_rejects_non_collection() {
        let data = data();
        let scale = CLAIMANT_COUNT_DEF.scale(&data).unwrap();
        assert!(CLAIMANT_COUNT_DEF
            .build(json!({ "type": "Feature" }), &data, &scale)
            .is_err());
    }

    #[test]
    fn test_find() {
        assert_eq!(find("claimantCount").map(|s| s.value_field), Some("percent"));
        assert!(find("unemployment").is_none());
        assert_eq!(options(), vec![("claimantCount", "Claimant count percentage")]);
    }
}
