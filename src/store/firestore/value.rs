//! Firestore REST typed values.
//!
//! Firestore's JSON API wraps every value in a one-key object naming its
//! type (`{"stringValue": "x"}`, `{"integerValue": "42"}`, ...). [`FsValue`]
//! models that encoding directly, and the conversions below map it to and
//! from plain [`serde_json::Value`]s.
//!
//! Integers travel as decimal strings. JSON numbers that fit in an `i64`
//! become `integerValue`; everything else numeric becomes `doubleValue`.
//! Timestamps, bytes and references decode to strings, geo points to
//! `{latitude, longitude}` objects; none of them is ever written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FsValue {
    NullValue(Option<String>),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    StringValue(String),
    TimestampValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(LatLng),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<FsValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: BTreeMap<String, FsValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl From<&Value> for FsValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => FsValue::NullValue(None),
            Value::Bool(b) => FsValue::BooleanValue(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FsValue::IntegerValue(i.to_string()),
                None => FsValue::DoubleValue(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FsValue::StringValue(s.clone()),
            Value::Array(items) => FsValue::ArrayValue(ArrayValue {
                values: items.iter().map(FsValue::from).collect(),
            }),
            Value::Object(map) => FsValue::MapValue(MapValue { fields: encode_fields(map) }),
        }
    }
}

impl From<FsValue> for Value {
    fn from(value: FsValue) -> Self {
        match value {
            FsValue::NullValue(_) => Value::Null,
            FsValue::BooleanValue(b) => Value::Bool(b),
            FsValue::IntegerValue(s) => match s.parse::<i64>() {
                Ok(i) => Value::Number(i.into()),
                Err(_) => Value::String(s),
            },
            FsValue::DoubleValue(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            FsValue::StringValue(s)
            | FsValue::TimestampValue(s)
            | FsValue::BytesValue(s)
            | FsValue::ReferenceValue(s) => Value::String(s),
            FsValue::GeoPointValue(LatLng { latitude, longitude }) => {
                let mut point = Map::new();
                point.insert("latitude".into(), Number::from_f64(latitude).map_or(Value::Null, Value::Number));
                point.insert("longitude".into(), Number::from_f64(longitude).map_or(Value::Null, Value::Number));
                Value::Object(point)
            }
            FsValue::ArrayValue(array) => {
                Value::Array(array.values.into_iter().map(Value::from).collect())
            }
            FsValue::MapValue(map) => Value::Object(decode_fields(map.fields)),
        }
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> BTreeMap<String, FsValue> {
    map.iter().map(|(k, v)| (k.clone(), FsValue::from(v))).collect()
}

pub fn decode_fields(fields: BTreeMap<String, FsValue>) -> Map<String, Value> {
    fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}
