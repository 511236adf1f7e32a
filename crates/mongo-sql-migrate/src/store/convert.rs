//! BSON to plain JSON conversion shared by the document sources.
//!
//! Materializers work on plain JSON: object ids become their hex string,
//! dates become RFC 3339 text with millisecond precision, and every numeric
//! type becomes a JSON number.

use bson::Bson;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

use crate::core::Document;
use crate::error::{MigrateError, Result};

/// Plain JSON of a BSON value.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(n) => Value::from(n),
        Bson::Int64(n) => Value::from(n),
        Bson::Double(f) => float(f, || f.to_string()),
        Bson::Decimal128(d) => {
            let text = d.to_string();
            match text.parse::<f64>() {
                Ok(f) => float(f, || text),
                Err(_) => Value::String(text),
            }
        }
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis())
            .map_or(Value::Null, |ts| {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(
            doc.into_iter()
                .map(|(key, value)| (key, bson_to_json(value)))
                .collect(),
        ),
        other => other.into_relaxed_extjson(),
    }
}

fn float(f: f64, fallback: impl FnOnce() -> String) -> Value {
    Number::from_f64(f).map_or_else(|| Value::String(fallback()), Value::Number)
}

/// Plain JSON of a MongoDB extended JSON value, canonical or relaxed.
pub fn extended_json_to_plain(value: Value) -> Result<Value> {
    let bson = Bson::try_from(value)
        .map_err(|e| MigrateError::Source(format!("invalid extended JSON: {}", e)))?;
    Ok(bson_to_json(bson))
}

/// Source document of a BSON document read from the store.
pub fn document_from_bson(doc: bson::Document) -> Result<Document> {
    Document::from_value(bson_to_json(Bson::Document(doc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use serde_json::json;

    #[test]
    fn test_extended_json_to_plain() {
        let raw = json!({
            "_id": {"$oid": "5f1d7a8e9c0b1a2d3e4f5a6b"},
            "createdAt": {"$date": "2021-03-01T10:00:00.000Z"},
            "legacy": {"$date": {"$numberLong": "0"}},
            "views": {"$numberLong": "42"},
            "score": {"$numberDouble": "1.5"},
            "tags": [
                {"$oid": "5f1d7a8e9c0b1a2d3e4f5a01"},
                {"$oid": "5f1d7a8e9c0b1a2d3e4f5a02"}
            ],
            "settings": {"a": 1}
        });
        let plain = extended_json_to_plain(raw).unwrap();
        assert_eq!(plain["_id"], json!("5f1d7a8e9c0b1a2d3e4f5a6b"));
        assert_eq!(plain["createdAt"], json!("2021-03-01T10:00:00.000Z"));
        assert_eq!(plain["legacy"], json!("1970-01-01T00:00:00.000Z"));
        assert_eq!(plain["views"], json!(42));
        assert_eq!(plain["score"], json!(1.5));
        assert_eq!(
            plain["tags"],
            json!(["5f1d7a8e9c0b1a2d3e4f5a01", "5f1d7a8e9c0b1a2d3e4f5a02"])
        );
        assert_eq!(plain["settings"], json!({"a": 1}));
    }

    #[test]
    fn test_malformed_object_id_is_source_error() {
        let err = extended_json_to_plain(json!({"_id": {"$oid": "short"}})).unwrap_err();
        assert!(matches!(err, MigrateError::Source(_)));
    }

    #[test]
    fn test_document_from_bson() {
        let oid = ObjectId::parse_str("5f1d7a8e9c0b1a2d3e4f5a6b").unwrap();
        let doc = document_from_bson(doc! {
            "_id": oid,
            "title": "Dune",
            "author": ObjectId::parse_str("5f1d7a8e9c0b1a2d3e4f5a01").unwrap(),
            "pages": 412_i32,
            "publishedAt": bson::DateTime::from_millis(1_614_592_800_000),
            "draft": bson::Bson::Null,
        })
        .unwrap();

        assert_eq!(doc.key, "5f1d7a8e9c0b1a2d3e4f5a6b");
        assert_eq!(doc.get("author"), Some(&json!("5f1d7a8e9c0b1a2d3e4f5a01")));
        assert_eq!(doc.get("pages"), Some(&json!(412)));
        assert_eq!(doc.get("publishedAt"), Some(&json!("2021-03-01T10:00:00.000Z")));
        assert_eq!(doc.get("draft"), Some(&Value::Null));
    }
}
