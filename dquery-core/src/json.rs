//! Plain JSON rendering of typed values, for logs and diagnostics.
//!
//! Numbers become JSON integers when integral and floats otherwise, sets
//! become arrays, binary becomes base64 and map keys come out sorted.

use crate::{DataTable, Error, Record, Result, Value};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Number};

pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::N(n) => number_to_json(n),
        Value::S(s) => serde_json::Value::String(s.clone()),
        Value::B(b) => serde_json::Value::String(STANDARD.encode(b)),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Null => serde_json::Value::Null,
        Value::L(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::M(m) => serde_json::Value::Object(
            m.iter().map(|(k, v)| (k.clone(), to_json(v))).collect(),
        ),
        Value::SS(items) => serde_json::Value::Array(
            items.iter().cloned().map(serde_json::Value::String).collect(),
        ),
        Value::NS(items) => {
            serde_json::Value::Array(items.iter().map(|n| number_to_json(n)).collect())
        }
        Value::BS(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|b| serde_json::Value::String(STANDARD.encode(b)))
                .collect(),
        ),
    }
}

fn number_to_json(n: &str) -> serde_json::Value {
    if let Ok(i) = n.parse::<i64>() {
        return serde_json::Value::Number(i.into());
    }
    match n.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) => serde_json::Value::Number(number),
        None => serde_json::Value::String(n.to_string()),
    }
}

/// Inverse of [`to_json`] for plain JSON: numbers become `N`, arrays `L`,
/// objects `M`.
pub fn from_json(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::N(n.to_string()),
        serde_json::Value::String(s) => Value::S(s.clone()),
        serde_json::Value::Array(items) => Value::L(items.iter().map(from_json).collect()),
        serde_json::Value::Object(m) => {
            Value::M(m.iter().map(|(k, v)| (k.clone(), from_json(v))).collect())
        }
    }
}

pub fn record_to_json(record: &Record) -> serde_json::Value {
    let map: Map<String, serde_json::Value> =
        record.iter().map(|(k, v)| (k.to_string(), to_json(v))).collect();
    serde_json::Value::Object(map)
}

pub fn record_from_json(value: &serde_json::Value) -> Result<Record> {
    match value {
        serde_json::Value::Object(m) => Ok(m.iter().map(|(k, v)| (k.clone(), from_json(v))).collect()),
        other => Err(Error::InvalidArgument(format!(
            "Expected a JSON object for a record, got {}",
            other
        ))),
    }
}

/// Compact JSON string of a record with sorted keys.
pub fn dumps(record: &Record) -> Result<String> {
    Ok(serde_json::to_string(&record_to_json(record))?)
}

pub fn dumps_value(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(&to_json(value))?)
}

/// JSON array of the table's resolved records.
pub fn dumps_table(table: &DataTable) -> Result<String> {
    let records: Vec<serde_json::Value> = table.get_records()?.map(|r| record_to_json(&r)).collect();
    Ok(serde_json::to_string(&records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn test_numbers_become_int_or_float() {
        assert_eq!(to_json(&Value::from(3)), serde_json::json!(3));
        assert_eq!(to_json(&Value::from(2.5)), serde_json::json!(2.5));
        assert_eq!(to_json(&Value::N("1e400".into())), serde_json::json!("1e400"));
    }

    #[test]
    fn test_sets_become_arrays() {
        assert_eq!(to_json(&Value::string_set(["a", "b"])), serde_json::json!(["a", "b"]));
        assert_eq!(to_json(&Value::number_set([1, 2])), serde_json::json!([1, 2]));
        assert_eq!(to_json(&Value::binary(vec![1u8, 2])), serde_json::json!("AQI="));
    }

    #[test]
    fn test_dumps_sorts_keys() {
        let r = record! { "b" => 1, "a" => "x" };
        assert_eq!(dumps(&r).unwrap(), r#"{"a":"x","b":1}"#);
    }

    #[test]
    fn test_record_from_json() {
        let r = record_from_json(&serde_json::json!({"a": 1, "b": [true, null]})).unwrap();
        assert_eq!(r.get("a"), Some(&Value::from(1)));
        assert_eq!(r.get("b"), Some(&Value::list([Value::Bool(true), Value::Null])));
        assert!(record_from_json(&serde_json::json!([1])).is_err());
    }

    #[test]
    fn test_dumps_table_resolves_not_set() {
        let mut table = DataTable::new();
        table.add_records([record! { "a" => 1 }, record! { "b" => 2 }]).unwrap();
        assert_eq!(
            dumps_table(&table).unwrap(),
            r#"[{"a":1,"b":null},{"a":null,"b":2}]"#
        );
    }
}
