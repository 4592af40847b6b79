//! SPARQL query results (JSON format) and conversion to keyed datasets.
//!
//! Values in a SPARQL JSON result are always strings, whatever their type in
//! the triple store. The datatype URI carried alongside a literal tells us
//! how to read it back; alternatively a single target type can be forced for
//! every column.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{SignpostError, SignpostResult};

/// XML Schema datatype namespace.
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// A SPARQL 1.1 query results document in JSON format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparqlResults {
    pub head: ResultsHead,
    pub results: ResultsBody,
}

/// Result header listing the projected variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsHead {
    #[serde(default)]
    pub vars: Vec<String>,
}

/// Result rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsBody {
    #[serde(default)]
    pub bindings: Vec<BTreeMap<String, Binding>>,
}

/// One bound value in a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// `uri`, `literal`, `typed-literal` or `bnode`.
    #[serde(rename = "type", default = "default_binding_kind")]
    pub kind: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

fn default_binding_kind() -> String {
    "literal".to_string()
}

impl Binding {
    /// Plain literal with no datatype.
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: default_binding_kind(),
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    /// Literal carrying a datatype URI.
    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            kind: "typed-literal".to_string(),
            value: value.into(),
            datatype: Some(datatype.into()),
            lang: None,
        }
    }
}

impl SparqlResults {
    /// Parse a `application/sparql-results+json` document.
    pub fn from_json(json: &str) -> SignpostResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Number of result rows.
    pub fn len(&self) -> usize {
        self.results.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.bindings.is_empty()
    }
}

/// Target type of a converted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Integer,
    Float,
    Boolean,
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
        };
        f.write_str(name)
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integer" => Ok(ValueType::Integer),
            "float" => Ok(ValueType::Float),
            "boolean" => Ok(ValueType::Boolean),
            "string" => Ok(ValueType::String),
            other => Err(format!(
                "unknown value type '{other}', expected integer, float, boolean or string"
            )),
        }
    }
}

impl ValueType {
    /// Convert a literal to this type.
    pub fn convert(self, literal: &str) -> TypedValue {
        match self {
            ValueType::Integer => parse_leading_integer(literal)
                .map(TypedValue::Integer)
                .unwrap_or(TypedValue::Null),
            ValueType::Float => parse_leading_float(literal)
                .map(TypedValue::Float)
                .unwrap_or(TypedValue::Null),
            ValueType::Boolean => TypedValue::Boolean(literal == "true" || literal == "1"),
            ValueType::String => TypedValue::String(literal.to_string()),
        }
    }
}

/// Known XML Schema datatype local names.
const XSD_TYPE_TABLE: &[(&str, ValueType)] = &[
    ("integer", ValueType::Integer),
    ("int", ValueType::Integer),
    ("long", ValueType::Integer),
    ("short", ValueType::Integer),
    ("byte", ValueType::Integer),
    ("nonNegativeInteger", ValueType::Integer),
    ("nonPositiveInteger", ValueType::Integer),
    ("positiveInteger", ValueType::Integer),
    ("negativeInteger", ValueType::Integer),
    ("unsignedLong", ValueType::Integer),
    ("unsignedInt", ValueType::Integer),
    ("unsignedShort", ValueType::Integer),
    ("unsignedByte", ValueType::Integer),
    ("decimal", ValueType::Float),
    ("float", ValueType::Float),
    ("double", ValueType::Float),
    ("boolean", ValueType::Boolean),
    ("string", ValueType::String),
    ("normalizedString", ValueType::String),
    ("token", ValueType::String),
    ("date", ValueType::String),
    ("dateTime", ValueType::String),
    ("gYear", ValueType::String),
    ("gYearMonth", ValueType::String),
    ("anyURI", ValueType::String),
];

/// Classify a literal's datatype URI.
///
/// XML Schema datatypes are looked up by local name. Any other URI falls
/// back to a first-match, case-sensitive substring test: `integer`, then
/// `float`/`double`/`decimal`, then `boolean`. No datatype means string.
pub fn classify_datatype(datatype: Option<&str>) -> ValueType {
    let Some(uri) = datatype else {
        return ValueType::String;
    };

    if let Some(local) = uri.strip_prefix(XSD) {
        if let Some((_, ty)) = XSD_TYPE_TABLE.iter().find(|(name, _)| *name == local) {
            return *ty;
        }
    }

    classify_by_substring(uri)
}

fn classify_by_substring(uri: &str) -> ValueType {
    if uri.contains("integer") {
        ValueType::Integer
    } else if uri.contains("float") || uri.contains("double") || uri.contains("decimal") {
        ValueType::Float
    } else if uri.contains("boolean") {
        ValueType::Boolean
    } else {
        ValueType::String
    }
}

/// Parse the leading integer of a literal: optional sign then decimal
/// digits, ignoring anything after. `"4.9"` reads as 4.
pub fn parse_leading_integer(literal: &str) -> Option<i64> {
    let s = literal.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse the longest numeric prefix of a literal as a float.
pub fn parse_leading_float(literal: &str) -> Option<f64> {
    let s = literal.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    if s[i..].starts_with("Infinity") {
        let negative = bytes.first() == Some(&b'-');
        return Some(if negative { f64::NEG_INFINITY } else { f64::INFINITY });
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut mantissa_digits = i - int_start;

    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        mantissa_digits += j - frac_start;
        if mantissa_digits > 0 {
            i = j;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }

    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }

    s[..i].parse().ok()
}

/// A literal converted to its concrete type.
///
/// `Null` marks a numeric literal with no parsable number in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl TypedValue {
    /// Numeric view of the value, if it has a finite one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Integer(i) => Some(*i as f64),
            TypedValue::Float(f) if f.is_finite() => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => Ok(()),
            TypedValue::Boolean(b) => write!(f, "{b}"),
            TypedValue::Integer(i) => write!(f, "{i}"),
            TypedValue::Float(v) => write!(f, "{v}"),
            TypedValue::String(s) => f.write_str(s),
        }
    }
}

impl From<TypedValue> for serde_json::Value {
    fn from(value: TypedValue) -> Self {
        match value {
            TypedValue::Null => serde_json::Value::Null,
            TypedValue::Boolean(b) => serde_json::Value::Bool(b),
            TypedValue::Integer(i) => serde_json::Value::from(i),
            TypedValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            TypedValue::String(s) => serde_json::Value::String(s),
        }
    }
}

/// The typed fields of one keyed record.
pub type Record = BTreeMap<String, TypedValue>;

/// Records keyed by the value of one chosen variable, e.g. an area code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyedDataset {
    records: BTreeMap<String, Record>,
}

impl KeyedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, record: Record) {
        self.records.insert(key.into(), record);
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// A single field of a single record.
    pub fn value(&self, key: &str, field: &str) -> Option<&TypedValue> {
        self.records.get(key).and_then(|r| r.get(field))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Values of one field across all records. Records without the field
    /// are skipped.
    pub fn column(&self, field: &str) -> Vec<&TypedValue> {
        self.records.values().filter_map(|r| r.get(field)).collect()
    }

    /// Finite numeric values of one field, for building colour scales.
    pub fn numeric_column(&self, field: &str) -> Vec<f64> {
        self.column(field)
            .into_iter()
            .filter_map(TypedValue::as_f64)
            .collect()
    }
}

/// Options for [`to_keyed_dataset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Convert every value to this type, ignoring datatypes.
    pub force_type: Option<ValueType>,
}

impl ConvertOptions {
    pub fn forced(ty: ValueType) -> Self {
        Self {
            force_type: Some(ty),
        }
    }

    /// Build options from a type name. Unrecognised names leave inference on.
    pub fn with_force_type_name(name: &str) -> Self {
        match name.parse::<ValueType>() {
            Ok(ty) => Self::forced(ty),
            Err(e) => {
                tracing::warn!("Ignoring force type: {e}");
                Self::default()
            }
        }
    }
}

/// Convert SPARQL results into a dataset keyed by the value of `key`.
///
/// Every row must bind `key`; the first row that doesn't fails the whole
/// conversion. Other variables missing from a row are left out of its
/// record. On duplicate keys the last row wins.
pub fn to_keyed_dataset(
    results: &SparqlResults,
    key: &str,
    options: &ConvertOptions,
) -> SignpostResult<KeyedDataset> {
    let data_vars: Vec<&str> = results
        .head
        .vars
        .iter()
        .map(String::as_str)
        .filter(|v| *v != key)
        .collect();

    let mut dataset = KeyedDataset::new();

    for (row, bindings) in results.results.bindings.iter().enumerate() {
        let key_value = bindings.get(key).ok_or_else(|| SignpostError::MissingKey {
            key: key.to_string(),
            row,
        })?;

        let mut record = Record::new();
        for var in &data_vars {
            let Some(binding) = bindings.get(*var) else {
                continue;
            };
            let ty = options
                .force_type
                .unwrap_or_else(|| classify_datatype(binding.datatype.as_deref()));
            record.insert((*var).to_string(), ty.convert(&binding.value));
        }

        dataset.insert(key_value.value.clone(), record);
    }

    tracing::debug!(
        "Converted {} SPARQL rows into {} keyed records on '{key}'",
        results.len(),
        dataset.len()
    );

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xsd(local: &str) -> String {
        format!("{XSD}{local}")
    }

    fn results(vars: &[&str], rows: Vec<Vec<(&str, Binding)>>) -> SparqlResults {
        SparqlResults {
            head: ResultsHead {
                vars: vars.iter().map(|v| v.to_string()).collect(),
            },
            results: ResultsBody {
                bindings: rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|(k, b)| (k.to_string(), b)).collect())
                    .collect(),
            },
        }
    }

    #[test]
    fn test_classification_table() {
        let cases = [
            (Some(xsd("integer")), ValueType::Integer),
            (Some(xsd("int")), ValueType::Integer),
            (Some(xsd("nonNegativeInteger")), ValueType::Integer),
            (Some(xsd("decimal")), ValueType::Float),
            (Some(xsd("double")), ValueType::Float),
            (Some(xsd("float")), ValueType::Float),
            (Some(xsd("boolean")), ValueType::Boolean),
            (Some(xsd("string")), ValueType::String),
            (Some(xsd("dateTime")), ValueType::String),
            (Some("http://example.org/def#someinteger".to_string()), ValueType::Integer),
            (Some("http://example.org/def#myDecimal".to_string()), ValueType::String),
            (Some("http://example.org/def#decimalish".to_string()), ValueType::Float),
            (Some("http://example.org/def#Boolean".to_string()), ValueType::String),
            (None, ValueType::String),
        ];

        for (datatype, expected) in cases {
            assert_eq!(
                classify_datatype(datatype.as_deref()),
                expected,
                "datatype {datatype:?}"
            );
        }
    }

    #[test]
    fn test_xsd_table_widens_substring_rules() {
        // The substring rules alone would leave these as strings.
        for local in ["long", "int", "nonNegativeInteger"] {
            let uri = xsd(local);
            assert_eq!(classify_by_substring(&uri), ValueType::String, "{uri}");
            assert_eq!(classify_datatype(Some(&uri)), ValueType::Integer, "{uri}");
        }
    }

    #[test]
    fn test_integer_checked_before_float_group() {
        let dt = "http://example.org/def#integer-or-double";
        assert_eq!(classify_datatype(Some(dt)), ValueType::Integer);
    }

    #[test]
    fn test_key_set_matches_rows_last_write_wins() {
        let doc = results(
            &["area_code", "count"],
            vec![
                vec![
                    ("area_code", Binding::literal("E05000819")),
                    ("count", Binding::typed("10", xsd("integer"))),
                ],
                vec![
                    ("area_code", Binding::literal("E05000820")),
                    ("count", Binding::typed("11", xsd("integer"))),
                ],
                vec![
                    ("area_code", Binding::literal("E05000819")),
                    ("count", Binding::typed("12", xsd("integer"))),
                ],
            ],
        );

        let dataset = to_keyed_dataset(&doc, "area_code", &ConvertOptions::default()).unwrap();
        let keys: Vec<&str> = dataset.keys().collect();
        assert_eq!(keys, vec!["E05000819", "E05000820"]);
        assert_eq!(
            dataset.value("E05000819", "count"),
            Some(&TypedValue::Integer(12))
        );
        assert!(dataset.get("E05000819").unwrap().get("area_code").is_none());
    }

    #[test]
    fn test_forced_integer_truncates_regardless_of_datatype() {
        let doc = results(
            &["id", "a", "b"],
            vec![
                vec![
                    ("id", Binding::literal("x")),
                    ("a", Binding::typed("3", xsd("string"))),
                    ("b", Binding::literal("3")),
                ],
                vec![
                    ("id", Binding::literal("y")),
                    ("a", Binding::typed("-2", xsd("decimal"))),
                    ("b", Binding::literal("-2")),
                ],
                vec![
                    ("id", Binding::literal("z")),
                    ("a", Binding::typed("4.9", xsd("boolean"))),
                    ("b", Binding::literal("4.9")),
                ],
            ],
        );

        let dataset =
            to_keyed_dataset(&doc, "id", &ConvertOptions::forced(ValueType::Integer)).unwrap();
        for column in ["a", "b"] {
            let values: Vec<&TypedValue> = ["x", "y", "z"]
                .iter()
                .map(|k| dataset.value(k, column).unwrap())
                .collect();
            assert_eq!(
                values,
                vec![
                    &TypedValue::Integer(3),
                    &TypedValue::Integer(-2),
                    &TypedValue::Integer(4)
                ]
            );
        }
    }

    #[test]
    fn test_boolean_conversion() {
        let dt = xsd("boolean");
        let ty = classify_datatype(Some(&dt));
        assert_eq!(ty.convert("1"), TypedValue::Boolean(true));
        assert_eq!(ty.convert("true"), TypedValue::Boolean(true));
        assert_eq!(ty.convert("0"), TypedValue::Boolean(false));
        assert_eq!(ty.convert("false"), TypedValue::Boolean(false));
        assert_eq!(ty.convert("TRUE"), TypedValue::Boolean(false));
    }

    #[test]
    fn test_decimal_converts_to_float() {
        let dt = xsd("decimal");
        assert_eq!(
            classify_datatype(Some(&dt)).convert("12.5"),
            TypedValue::Float(12.5)
        );
    }

    #[test]
    fn test_missing_datatype_keeps_literal_string() {
        let doc = results(
            &["id", "name"],
            vec![vec![
                ("id", Binding::literal("1")),
                ("name", Binding::literal("  Altrincham  ")),
            ]],
        );
        let dataset = to_keyed_dataset(&doc, "id", &ConvertOptions::default()).unwrap();
        assert_eq!(
            dataset.value("1", "name"),
            Some(&TypedValue::String("  Altrincham  ".to_string()))
        );
    }

    #[test]
    fn test_claimant_count_document() {
        let json = r#"{
            "head": { "vars": ["area_code", "percent"] },
            "results": { "bindings": [
                {
                    "area_code": { "type": "literal", "value": "E08000009" },
                    "percent": {
                        "type": "typed-literal",
                        "datatype": "http://www.w3.org/2001/XMLSchema#decimal",
                        "value": "3.2"
                    }
                }
            ] }
        }"#;

        let doc = SparqlResults::from_json(json).unwrap();
        let dataset = to_keyed_dataset(&doc, "area_code", &ConvertOptions::default()).unwrap();

        assert_eq!(
            serde_json::to_value(&dataset).unwrap(),
            serde_json::json!({ "E08000009": { "percent": 3.2 } })
        );
    }

    #[test]
    fn test_missing_key_is_integrity_error() {
        let doc = results(
            &["area_code", "percent"],
            vec![
                vec![("area_code", Binding::literal("E1")), ("percent", Binding::literal("1"))],
                vec![("percent", Binding::literal("2"))],
            ],
        );

        match to_keyed_dataset(&doc, "area_code", &ConvertOptions::default()) {
            Err(SignpostError::MissingKey { key, row }) => {
                assert_eq!(key, "area_code");
                assert_eq!(row, 1);
            }
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn test_unbound_optional_variable_is_omitted() {
        let doc = results(
            &["id", "label", "count"],
            vec![vec![
                ("id", Binding::literal("a")),
                ("count", Binding::typed("5", xsd("integer"))),
            ]],
        );
        let dataset = to_keyed_dataset(&doc, "id", &ConvertOptions::default()).unwrap();
        let record = dataset.get("a").unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("count"), Some(&TypedValue::Integer(5)));
    }

    #[test]
    fn test_force_type_name_parsing() {
        assert_eq!(
            ConvertOptions::with_force_type_name("FLOAT").force_type,
            Some(ValueType::Float)
        );
        assert_eq!(ConvertOptions::with_force_type_name("date").force_type, None);
    }

    #[test]
    fn test_leading_number_parsing() {
        assert_eq!(parse_leading_integer("42"), Some(42));
        assert_eq!(parse_leading_integer(" -7px"), Some(-7));
        assert_eq!(parse_leading_integer("+3"), Some(3));
        assert_eq!(parse_leading_integer("abc"), None);
        assert_eq!(parse_leading_integer("-"), None);

        assert_eq!(parse_leading_float("12.5"), Some(12.5));
        assert_eq!(parse_leading_float("12.5abc"), Some(12.5));
        assert_eq!(parse_leading_float(".5"), Some(0.5));
        assert_eq!(parse_leading_float("5."), Some(5.0));
        assert_eq!(parse_leading_float("1e3"), Some(1000.0));
        assert_eq!(parse_leading_float("1e"), Some(1.0));
        assert_eq!(parse_leading_float("-Infinity"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_leading_float("n/a"), None);
        assert_eq!(parse_leading_float("."), None);
    }

    #[test]
    fn test_unparsable_number_is_null() {
        assert_eq!(ValueType::Integer.convert("n/a"), TypedValue::Null);
        assert_eq!(ValueType::Float.convert(""), TypedValue::Null);
        assert_eq!(serde_json::to_value(TypedValue::Null).unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_numeric_column_skips_missing_and_non_numeric() {
        let mut dataset = KeyedDataset::new();
        dataset.insert("a", Record::from([("v".to_string(), TypedValue::Float(1.5))]));
        dataset.insert("b", Record::from([("v".to_string(), TypedValue::Integer(2))]));
        dataset.insert("c", Record::from([("v".to_string(), TypedValue::Null)]));
        dataset.insert("d", Record::from([("w".to_string(), TypedValue::Integer(9))]));
        dataset.insert(
            "e",
            Record::from([("v".to_string(), TypedValue::String("3".into()))]),
        );

        assert_eq!(dataset.numeric_column("v"), vec![1.5, 2.0]);
        assert_eq!(dataset.column("v").len(), 4);
    }
}
