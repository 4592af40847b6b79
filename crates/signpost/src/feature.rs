//! GeoJSON feature classification, styling and property tables.
//!
//! GeoJSON has no circle geometry, so a point is only drawn as a circle when
//! it carries a `featureRadius` property.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Property holding a circle radius in metres.
pub const RADIUS_PROPERTY: &str = "featureRadius";

/// Foreign member carrying the computed path style of a feature.
pub const STYLE_MEMBER: &str = "style";

/// Foreign member carrying the rendering primitive of a feature.
pub const RENDER_MEMBER: &str = "render";

/// Foreign member carrying a circle's radius in metres.
pub const RADIUS_MEMBER: &str = "radius";

/// simplestyle keys that are styling hints rather than data.
const STYLING_KEYS: &[&str] = &[
    "stroke",
    "stroke-width",
    "stroke-opacity",
    "fill",
    "fill-opacity",
    "marker-color",
    "marker-size",
];

/// Rendering primitive chosen for a feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    Marker,
    Circle,
    Polygon,
    Polyline,
    /// Unrecognised or missing geometry type, lowercased.
    Other(Option<String>),
}

impl RenderKind {
    pub fn is_point(&self) -> bool {
        matches!(self, RenderKind::Marker | RenderKind::Circle)
    }
}

/// Decide how a GeoJSON object should be drawn.
pub fn classify(feature: &Value) -> RenderKind {
    let mut kind = feature
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_lowercase);

    if matches!(kind.as_deref(), Some("feature") | Some("featurecollection")) {
        if let Some(geometry_type) = feature.get("geometry").and_then(|g| g.get("type")) {
            kind = geometry_type.as_str().map(str::to_lowercase);
        }
    }

    match kind.as_deref() {
        Some("point") if has_radius(feature) => RenderKind::Circle,
        Some("point") | Some("multipoint") => RenderKind::Marker,
        Some("polygon") | Some("multipolygon") => RenderKind::Polygon,
        Some("linestring") | Some("multilinestring") => RenderKind::Polyline,
        _ => RenderKind::Other(kind),
    }
}

fn has_radius(feature: &Value) -> bool {
    match feature.get("properties").and_then(|p| p.get(RADIUS_PROPERTY)) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Radius of a circle feature, if it has a numeric one.
pub fn radius(feature: &Value) -> Option<f64> {
    number(feature.get("properties")?.get(RADIUS_PROPERTY)?)
}

/// Features of a GeoJSON document: the members of a collection, or the
/// object itself when it is a single feature or geometry.
pub fn features(geojson: &Value) -> Vec<&Value> {
    match geojson {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => match geojson.get("features").and_then(Value::as_array) {
            Some(items) => items.iter().collect(),
            None => vec![geojson],
        },
        _ => Vec::new(),
    }
}

/// Mutable access to the features of a GeoJSON document.
pub fn features_mut(geojson: &mut Value) -> Vec<&mut Value> {
    if geojson.get("features").is_some_and(Value::is_array) {
        return geojson["features"]
            .as_array_mut()
            .map(|items| items.iter_mut().collect())
            .unwrap_or_default();
    }
    if geojson.is_array() {
        return geojson
            .as_array_mut()
            .map(|items| items.iter_mut().collect())
            .unwrap_or_default();
    }
    if geojson.is_object() {
        return vec![geojson];
    }
    Vec::new()
}

/// True when the document holds point data, which can be clustered.
pub fn contains_points(geojson: &Value) -> bool {
    features(geojson).into_iter().any(|f| classify(f).is_point())
}

/// Leaflet path options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f64>,
}

impl PathStyle {
    /// Default style for dataset overlays.
    pub fn overlay() -> Self {
        Self {
            color: Some("#fc6721".to_string()),
            weight: None,
            opacity: Some(0.5),
            fill_color: Some("#fc6721".to_string()),
            fill_opacity: Some(0.2),
        }
    }

    /// Boundary polygons: outline only.
    pub fn boundary() -> Self {
        Self {
            color: Some("#212121".to_string()),
            weight: Some(2.0),
            fill_opacity: Some(0.0),
            ..Default::default()
        }
    }

    /// Highlight for the selected non-marker feature.
    pub fn selected() -> Self {
        Self {
            color: Some("#ffea00".to_string()),
            weight: Some(5.0),
            opacity: Some(1.0),
            ..Default::default()
        }
    }

    /// Choropleth region shaded with `fill`.
    pub fn choropleth(fill: String) -> Self {
        Self {
            color: Some("#212121".to_string()),
            weight: Some(2.0),
            fill_color: Some(fill),
            fill_opacity: Some(0.5),
            ..Default::default()
        }
    }
}

/// Overlay style for a feature, honouring any simplestyle properties it
/// carries.
pub fn overlay_style(feature: &Value) -> PathStyle {
    let mut style = PathStyle::overlay();

    let Some(props) = feature.get("properties").and_then(Value::as_object) else {
        return style;
    };

    if let Some(stroke) = props.get("stroke").and_then(Value::as_str) {
        style.color = Some(stroke.to_string());
    }
    if let Some(width) = props.get("stroke-width").and_then(number) {
        style.weight = Some(width);
    }
    if let Some(opacity) = props.get("stroke-opacity").and_then(number) {
        style.opacity = Some(opacity);
    }
    if let Some(fill) = props.get("fill").and_then(Value::as_str) {
        style.fill_color = Some(fill.to_string());
    }
    if let Some(opacity) = props.get("fill-opacity").and_then(number) {
        style.fill_opacity = Some(opacity);
    }

    style
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Point marker icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerIcon {
    #[serde(rename = "pin-circle-orange-bright")]
    Default,
    #[serde(rename = "pin-circle-yellow-bright")]
    Selected,
}

impl MarkerIcon {
    /// Icon size in pixels, `[width, height]`.
    pub const SIZE: [u32; 2] = [20, 39];
}

/// Attach the computed style, rendering primitive and any circle radius to
/// every feature as foreign members, returning the primitives in feature order.
pub fn annotate<F>(geojson: &mut Value, style: F) -> Vec<RenderKind>
where
    F: Fn(&Value) -> PathStyle,
{
    features_mut(geojson)
        .into_iter()
        .map(|feature| {
            let kind = classify(&*feature);
            let path_style = style(&*feature);
            let circle_radius = match kind {
                RenderKind::Circle => radius(&*feature),
                _ => None,
            };
            if let Value::Object(members) = feature {
                members.insert(
                    STYLE_MEMBER.to_string(),
                    serde_json::to_value(&path_style).unwrap_or(Value::Null),
                );
                members.insert(
                    RENDER_MEMBER.to_string(),
                    serde_json::to_value(&kind).unwrap_or(Value::Null),
                );
                if let Some(r) = circle_radius {
                    members.insert(RADIUS_MEMBER.to_string(), Value::from(r));
                }
            }
            kind
        })
        .collect()
}

/// Property rows to show for a selected feature, styling keys excluded.
pub fn properties_table(feature: &Value) -> Vec<(String, String)> {
    let Some(props) = feature.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    props
        .iter()
        .filter(|(key, _)| !STYLING_KEYS.contains(&key.as_str()))
        .map(|(key, value)| {
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

/// The properties table as HTML for the info panel, or `None` when the
/// feature has nothing to show.
pub fn properties_html(feature: &Value) -> Option<String> {
    let rows = properties_table(feature);
    if rows.is_empty() {
        return None;
    }

    let mut html = String::from("<table class=\"propertiesTable\">");
    for (key, value) in rows {
        html.push_str("<tr><td>");
        html.push_str(&escape_html(&key));
        html.push_str("</td><td>");
        html.push_str(&escape_html(&value));
        html.push_str("</td></tr>");
    }
    html.push_str("</table>");
    Some(html)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(geometry_type: &str, properties: Value) -> Value {
        json!({
            "type": "Feature",
            "geometry": { "type": geometry_type, "coordinates": [] },
            "properties": properties
        })
    }

    #[test]
    fn test_classification_table() {
        let cases = [
            (feature("Point", json!({})), RenderKind::Marker),
            (feature("MultiPoint", json!({})), RenderKind::Marker),
            (feature("Point", json!({ "featureRadius": 250 })), RenderKind::Circle),
            (feature("Point", json!({ "featureRadius": "" })), RenderKind::Marker),
            (feature("Point", json!({ "featureRadius": null })), RenderKind::Marker),
            (feature("Polygon", json!({})), RenderKind::Polygon),
            (feature("MultiPolygon", json!({})), RenderKind::Polygon),
            (feature("LineString", json!({})), RenderKind::Polyline),
            (feature("MultiLineString", json!({})), RenderKind::Polyline),
            (
                feature("GeometryCollection", json!({})),
                RenderKind::Other(Some("geometrycollection".into())),
            ),
            (json!({ "type": "POLYGON", "coordinates": [] }), RenderKind::Polygon),
            (json!({ "type": "Feature" }), RenderKind::Other(Some("feature".into()))),
            (json!({ "type": "Feature", "geometry": { "type": null } }), RenderKind::Other(None)),
            (json!({}), RenderKind::Other(None)),
        ];

        for (input, expected) in cases {
            assert_eq!(classify(&input), expected, "input {input}");
        }
    }

    #[test]
    fn test_radius() {
        assert_eq!(radius(&feature("Point", json!({ "featureRadius": "150" }))), Some(150.0));
        assert_eq!(radius(&feature("Point", json!({}))), None);
    }

    #[test]
    fn test_overlay_style_uses_simplestyle_properties() {
        let styled = overlay_style(&feature(
            "Polygon",
            json!({ "stroke": "#000000", "stroke-width": 3, "fill-opacity": "0.8" }),
        ));
        assert_eq!(styled.color.as_deref(), Some("#000000"));
        assert_eq!(styled.weight, Some(3.0));
        assert_eq!(styled.fill_opacity, Some(0.8));
        assert_eq!(styled.fill_color.as_deref(), Some("#fc6721"));
        assert_eq!(styled.opacity, Some(0.5));

        assert_eq!(overlay_style(&json!({ "type": "Feature" })), PathStyle::overlay());
    }

    #[test]
    fn test_properties_table_excludes_styling_keys() {
        let f = feature(
            "Point",
            json!({
                "name": "Jobcentre Plus",
                "phone": null,
                "visits": 12,
                "marker-color": "#fc6721",
                "stroke": "#000"
            }),
        );

        let rows = properties_table(&f);
        assert_eq!(
            rows,
            vec![
                ("name".to_string(), "Jobcentre Plus".to_string()),
                ("phone".to_string(), String::new()),
                ("visits".to_string(), "12".to_string()),
            ]
        );
    }

    #[test]
    fn test_properties_html_escapes_and_skips_empty() {
        let html = properties_html(&feature("Point", json!({ "name": "A & B <Ltd>" }))).unwrap();
        assert_eq!(
            html,
            "<table class=\"propertiesTable\"><tr><td>name</td><td>A &amp; B &lt;Ltd&gt;</td></tr></table>"
        );

        assert!(properties_html(&feature("Point", json!({ "fill": "#fff" }))).is_none());
        assert!(properties_html(&json!({ "type": "Feature" })).is_none());
    }

    #[test]
    fn test_annotate_and_contains_points() {
        let mut collection = json!({
            "type": "FeatureCollection",
            "features": [
                feature("Polygon", json!({})),
                feature("Point", json!({}))
            ]
        });

        assert!(contains_points(&collection));
        let kinds = annotate(&mut collection, overlay_style);
        assert_eq!(kinds, vec![RenderKind::Polygon, RenderKind::Marker]);
        assert_eq!(collection["features"][1][RENDER_MEMBER], json!("marker"));
        assert_eq!(collection["features"][0][STYLE_MEMBER]["color"], json!("#fc6721"));

        let polygons = json!({ "type": "FeatureCollection", "features": [feature("Polygon", json!({}))] });
        assert!(!contains_points(&polygons));
    }

    #[test]
    fn test_annotate_sets_circle_radius() {
        let mut collection = json!({
            "type": "FeatureCollection",
            "features": [
                feature("Point", json!({ "featureRadius": "250" })),
                feature("Point", json!({}))
            ]
        });

        let kinds = annotate(&mut collection, overlay_style);
        assert_eq!(kinds, vec![RenderKind::Circle, RenderKind::Marker]);
        assert_eq!(collection["features"][0][RADIUS_MEMBER], json!(250.0));
        assert!(collection["features"][1].get(RADIUS_MEMBER).is_none());
    }

    #[test]
    fn test_marker_icon_names() {
        assert_eq!(
            serde_json::to_value(MarkerIcon::Selected).unwrap(),
            json!("pin-circle-yellow-bright")
        );
    }
}
