//! Phase 1: one flat row per document.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info};

use super::ModelStats;
use crate::config::MigrationConfig;
use crate::core::{Document, Row, SourceStore, SqlValue, TargetStore};
use crate::error::{MigrateError, Result};
use crate::model::{ModelDefinition, ScalarType, Synthetic, TimestampOption};
use crate::translate::{AdminUserIds, IdentifierTranslator};

/// Target columns of the two timestamp fields.
const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

/// Convert a JSON field value to the SQL value for a scalar attribute type.
pub fn scalar_value(ty: &ScalarType, value: &Value) -> SqlValue {
    match (ty, value) {
        (_, Value::Null) => SqlValue::Null,
        (ScalarType::Json, v) => SqlValue::Json(v.to_string()),
        (_, Value::Bool(b)) => SqlValue::Bool(*b),
        (_, Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::I64(i),
            None => n.as_f64().map_or_else(|| SqlValue::Text(n.to_string()), SqlValue::F64),
        },
        (ScalarType::DateTime | ScalarType::Timestamp, Value::String(s)) => {
            parse_timestamp(s).map_or_else(|| SqlValue::Text(s.clone()), SqlValue::Timestamp)
        }
        (_, Value::String(s)) => SqlValue::Text(s.clone()),
        (_, v @ (Value::Array(_) | Value::Object(_))) => SqlValue::Json(v.to_string()),
    }
}

/// Timestamp field values: RFC 3339 text, naive date-time text, or epoch
/// milliseconds.
fn timestamp_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::String(s) => {
            parse_timestamp(s).map_or_else(|| SqlValue::Text(s.clone()), SqlValue::Timestamp)
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map_or_else(|| SqlValue::Text(n.to_string()), SqlValue::Timestamp),
        other => SqlValue::Text(other.to_string()),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    None
}

/// Audit-user value: a source admin key remapped to its target id.
fn audit_user_value(
    value: &Value,
    admins: &AdminUserIds,
    context: impl Into<String>,
) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::String(key) => Ok(admins
            .remap(key, context)?
            .map_or(SqlValue::Null, SqlValue::I64)),
        Value::Object(obj) => match obj.get("_id").or_else(|| obj.get("ref")) {
            Some(inner) => audit_user_value(inner, admins, context),
            None => Err(MigrateError::Source(format!(
                "unsupported audit-user value: {}",
                value
            ))),
        },
        Value::Number(n) if n.is_i64() => Ok(n.as_i64().map_or(SqlValue::Null, SqlValue::I64)),
        other => Err(MigrateError::Source(format!(
            "unsupported audit-user value: {}",
            other
        ))),
    }
}

/// Build the row of one document.
///
/// `id` goes first, then the timestamp columns, then scalar attributes in
/// name order. Non-scalar attributes are left to the link pass.
pub fn build_row(
    model: &ModelDefinition,
    doc: &Document,
    id: i64,
    admins: &AdminUserIds,
    config: &MigrationConfig,
) -> Result<Row> {
    let mut row = Row::new().with("id", id);

    if let TimestampOption::Fields { created, updated } = &model.timestamps {
        for (field, column) in [(created, CREATED_AT), (updated, UPDATED_AT)] {
            if let Some(value) = doc.get(field) {
                row.set(column, timestamp_value(value));
            }
        }
    }

    let empty_as_null = config.empty_string_fields(&model.uid);

    for (name, attribute) in &model.attributes {
        let Some(ty) = attribute.scalar_type() else {
            continue;
        };

        let value = match (attribute.synthetic, doc.get(name)) {
            (Some(Synthetic::ExternalId), None | Some(Value::Null)) => {
                SqlValue::Text(doc.key.clone())
            }
            (Some(Synthetic::SoftDelete), Some(Value::Null)) => SqlValue::Bool(false),
            (Some(Synthetic::AuditUser), Some(value)) => {
                audit_user_value(value, admins, format!("{}.{}", model.uid, name))?
            }
            (_, Some(value)) => scalar_value(ty, value),
            (_, None) => match &attribute.default {
                Some(default) => scalar_value(ty, default),
                None if attribute.required => {
                    return Err(MigrateError::MissingRequired {
                        model: model.uid.clone(),
                        attribute: name.clone(),
                        document: doc.key.clone(),
                    })
                }
                None => continue,
            },
        };

        let value = match value {
            SqlValue::Text(s) if s.is_empty() && empty_as_null.contains(name) => SqlValue::Null,
            other => other,
        };
        row.set(name.as_str(), value);
    }

    Ok(row)
}

/// Materialize every document of one model: assign ids and insert rows.
///
/// Ids of the administrative model are also recorded in `admins` for the
/// audit-user remap of later models.
pub async fn materialize_rows(
    model: &ModelDefinition,
    is_admin: bool,
    source: &dyn SourceStore,
    target: &dyn TargetStore,
    translator: &mut IdentifierTranslator,
    admins: &mut AdminUserIds,
    config: &MigrationConfig,
) -> Result<ModelStats> {
    let table = &model.collection_name;
    let total = source.count_documents(table).await?;
    info!("Materializing rows of {} ({} documents)", model.uid, total);

    let mut stats = ModelStats::default();
    let mut rx = source.scan(table);
    while let Some(doc) = rx.recv().await {
        let doc = doc?;
        stats.documents += 1;

        let id = translator.assign(table, &doc.key).map_err(|e| {
            error!("Duplicate document in {}:\n{}", table, doc.to_json_pretty());
            e
        })?;

        let row = build_row(model, &doc, id, admins, config).map_err(|e| {
            error!("Cannot build row for {}:\n{}", model.uid, doc.to_json_pretty());
            e
        })?;

        if let Err(e) = target.insert_row(table, &row).await {
            error!("Insert into {} failed for row:\n{}", table, row.to_json_pretty());
            return Err(e);
        }
        stats.rows += 1;

        if is_admin {
            admins.record(&doc.key, id);
        }
    }

    debug!("Inserted {}/{} rows into {}", stats.rows, total, table);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn model(raw: Value) -> ModelDefinition {
        ModelDefinition::parse(&raw).unwrap()
    }

    fn doc(raw: Value) -> Document {
        Document::from_value(raw).unwrap()
    }

    fn article() -> ModelDefinition {
        model(json!({
            "uid": "application::article.article",
            "collectionName": "articles",
            "attributes": {
                "title": {"type": "string", "required": true},
                "status": {"type": "string", "default": "draft", "required": true},
                "settings": {"type": "json", "default": {"layout": "wide"}},
                "views": {"type": "integer"},
                "publishedAt": {"type": "datetime"},
                "author": {"model": "user", "plugin": "users-permissions"}
            }
        }))
    }

    #[test]
    fn test_default_backfill() {
        let row = build_row(
            &article(),
            &doc(json!({"_id": "a1", "title": "Hello"})),
            1,
            &AdminUserIds::new(),
            &MigrationConfig::default(),
        )
        .unwrap();

        assert_eq!(row.get("status"), Some(&SqlValue::Text("draft".into())));
        assert_eq!(row.get("settings"), Some(&SqlValue::Json(r#"{"layout":"wide"}"#.into())));
        assert!(row.get("views").is_none());
        assert!(row.get("author").is_none());
        assert_eq!(row.columns()[0], "id");
    }

    #[test]
    fn test_json_round_trip() {
        let row = build_row(
            &article(),
            &doc(json!({"_id": "a1", "title": "x", "settings": {"a": 1}})),
            1,
            &AdminUserIds::new(),
            &MigrationConfig::default(),
        )
        .unwrap();

        let encoded = row.get("settings").and_then(SqlValue::as_str).unwrap();
        let decoded: Value = serde_json::from_str(encoded).unwrap();
        assert_eq!(decoded, json!({"a": 1}));
    }

    #[test]
    fn test_missing_required_is_error() {
        let err = build_row(
            &article(),
            &doc(json!({"_id": "a9"})),
            1,
            &AdminUserIds::new(),
            &MigrationConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::MissingRequired { ref attribute, .. } if attribute == "title"));
        assert!(err.is_data_integrity());
    }

    #[test]
    fn test_present_null_is_kept_as_null() {
        let row = build_row(
            &article(),
            &doc(json!({"_id": "a1", "title": "x", "status": null})),
            1,
            &AdminUserIds::new(),
            &MigrationConfig::default(),
        )
        .unwrap();
        assert_eq!(row.get("status"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_timestamps_and_datetimes() {
        let row = build_row(
            &article(),
            &doc(json!({
                "_id": "a1",
                "title": "x",
                "createdAt": "2021-03-01T10:00:00Z",
                "publishedAt": "2021-03-02T08:30:00.000Z"
            })),
            1,
            &AdminUserIds::new(),
            &MigrationConfig::default(),
        )
        .unwrap();

        assert_eq!(
            row.get("created_at"),
            Some(&SqlValue::Timestamp(Utc.with_ymd_and_hms(2021, 3, 1, 10, 0, 0).unwrap()))
        );
        assert!(row.get("updated_at").is_none());
        assert!(matches!(row.get("publishedAt"), Some(SqlValue::Timestamp(_))));
    }

    #[test]
    fn test_custom_and_disabled_timestamps() {
        let custom = model(json!({
            "uid": "application::event.event",
            "collectionName": "events",
            "options": {"timestamps": ["created", "modified"]},
            "attributes": {}
        }));
        let row = build_row(
            &custom,
            &doc(json!({"_id": "e1", "created": 1614592800000i64, "modified": "yesterday"})),
            1,
            &AdminUserIds::new(),
            &MigrationConfig::default(),
        )
        .unwrap();
        assert!(matches!(row.get("created_at"), Some(SqlValue::Timestamp(_))));
        assert_eq!(row.get("updated_at"), Some(&SqlValue::Text("yesterday".into())));

        let disabled = model(json!({
            "uid": "application::log.log",
            "collectionName": "logs",
            "options": {"timestamps": false},
            "attributes": {}
        }));
        let row = build_row(
            &disabled,
            &doc(json!({"_id": "l1", "createdAt": "2021-03-01T10:00:00Z"})),
            1,
            &AdminUserIds::new(),
            &MigrationConfig::default(),
        )
        .unwrap();
        assert_eq!(row.columns(), ["id"]);
    }

    #[test]
    fn test_synthetic_fields() {
        let mut config = MigrationConfig::default();
        config.soft_delete_models.insert("application::article.article".into());
        config.audit_user_models.insert("application::article.article".into());
        let mut article = article();
        crate::model::registry::apply_fixups(&mut article, &config);

        let mut admins = AdminUserIds::new();
        admins.record("adm1", 4);

        let row = build_row(
            &article,
            &doc(json!({"_id": "a1", "title": "x", "created_by": "adm1"})),
            1,
            &admins,
            &config,
        )
        .unwrap();
        assert_eq!(row.get("uuid"), Some(&SqlValue::Text("a1".into())));
        assert_eq!(row.get("deleted"), Some(&SqlValue::Bool(false)));
        assert_eq!(row.get("created_by"), Some(&SqlValue::I64(4)));
        assert!(row.get("updated_by").is_none());

        let err = build_row(
            &article,
            &doc(json!({"_id": "a2", "title": "x", "updated_by": "ghost"})),
            2,
            &admins,
            &config,
        )
        .unwrap_err();
        assert!(err.is_data_integrity());
    }

    #[test]
    fn test_null_soft_delete_flag_is_false() {
        let mut config = MigrationConfig::default();
        config.soft_delete_models.insert("application::article.article".into());
        let mut article = article();
        crate::model::registry::apply_fixups(&mut article, &config);

        let row = build_row(
            &article,
            &doc(json!({"_id": "a1", "title": "x", "deleted": null})),
            1,
            &AdminUserIds::new(),
            &config,
        )
        .unwrap();
        assert_eq!(row.get("deleted"), Some(&SqlValue::Bool(false)));

        let row = build_row(
            &article,
            &doc(json!({"_id": "a2", "title": "x", "deleted": true})),
            2,
            &AdminUserIds::new(),
            &config,
        )
        .unwrap();
        assert_eq!(row.get("deleted"), Some(&SqlValue::Bool(true)));
    }

    #[test]
    fn test_audit_user_without_admin_model_is_null() {
        let mut config = MigrationConfig::default();
        config.audit_user_models.insert("application::article.article".into());
        let mut article = article();
        crate::model::registry::apply_fixups(&mut article, &config);

        let row = build_row(
            &article,
            &doc(json!({"_id": "a1", "title": "x", "created_by": "5f00bb"})),
            1,
            &AdminUserIds::without_admin_model(),
            &config,
        )
        .unwrap();
        assert_eq!(row.get("created_by"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_empty_string_as_null() {
        let mut config = MigrationConfig::default();
        config
            .empty_string_as_null
            .insert("application::article.article".into(), vec!["title".into()]);
        let row = build_row(
            &article(),
            &doc(json!({"_id": "a1", "title": ""})),
            1,
            &AdminUserIds::new(),
            &config,
        )
        .unwrap();
        assert_eq!(row.get("title"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_scalar_values() {
        assert_eq!(scalar_value(&ScalarType::Integer, &json!(3)), SqlValue::I64(3));
        assert_eq!(scalar_value(&ScalarType::Float, &json!(1.5)), SqlValue::F64(1.5));
        assert_eq!(scalar_value(&ScalarType::Boolean, &json!(true)), SqlValue::Bool(true));
        assert_eq!(scalar_value(&ScalarType::Json, &json!(null)), SqlValue::Null);
        assert_eq!(scalar_value(&ScalarType::Json, &json!("s")), SqlValue::Json("\"s\"".into()));
        assert_eq!(
            scalar_value(&ScalarType::Enumeration, &json!(["a"])),
            SqlValue::Json("[\"a\"]".into())
        );
        assert_eq!(
            scalar_value(&ScalarType::Date, &json!("2021-03-01")),
            SqlValue::Text("2021-03-01".into())
        );
    }
}
