//! Parsed model and attribute definitions.
//!
//! A raw definition is the JSON the source CMS serializes into its registry
//! container. Parsing turns the loosely-shaped attribute objects into the
//! [`AttributeKind`] sum type so every later stage matches exhaustively.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{MigrateError, Result};
use crate::naming::pascal_case;

/// Plugin name the CMS gives its administrative namespace.
pub const ADMIN_PLUGIN: &str = "admin";

/// Default timestamp source fields.
pub const DEFAULT_TIMESTAMPS: [&str; 2] = ["createdAt", "updatedAt"];

/// Where a model's uid places it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidKind {
    /// `strapi::<name>`.
    Admin,
    /// `plugins::<plugin>.<name>`.
    Plugin(String),
    /// `application::<api>.<name>`.
    Application(String),
    /// `<category>.<name>` (no namespace separator).
    Component(String),
    /// Any other `<namespace>::<...>` form.
    Other(String),
}

/// Split a uid into its kind and bare model name.
pub fn parse_uid(uid: &str) -> Result<(UidKind, String)> {
    let malformed = || MigrateError::Config(format!("malformed model uid '{}'", uid));

    let Some((namespace, rest)) = uid.split_once("::") else {
        let (category, name) = uid.split_once('.').ok_or_else(malformed)?;
        if category.is_empty() || name.is_empty() {
            return Err(malformed());
        }
        return Ok((UidKind::Component(category.to_string()), name.to_string()));
    };

    if rest.is_empty() {
        return Err(malformed());
    }

    match namespace {
        "strapi" => Ok((UidKind::Admin, rest.to_string())),
        "plugins" | "application" => {
            let (group, name) = rest.split_once('.').ok_or_else(malformed)?;
            let kind = if namespace == "plugins" {
                UidKind::Plugin(group.to_string())
            } else {
                UidKind::Application(group.to_string())
            };
            Ok((kind, name.to_string()))
        }
        other => {
            let name = rest.rsplit('.').next().unwrap_or(rest);
            Ok((UidKind::Other(other.to_string()), name.to_string()))
        }
    }
}

/// Declared scalar type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Text,
    RichText,
    Email,
    Password,
    Uid,
    Enumeration,
    Integer,
    BigInteger,
    Float,
    Decimal,
    Boolean,
    Json,
    Date,
    DateTime,
    Time,
    Timestamp,
    /// A type this tool does not know; copied through unchanged.
    Other(String),
}

impl ScalarType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "string" => ScalarType::String,
            "text" => ScalarType::Text,
            "richtext" => ScalarType::RichText,
            "email" => ScalarType::Email,
            "password" => ScalarType::Password,
            "uid" => ScalarType::Uid,
            "enumeration" => ScalarType::Enumeration,
            "integer" => ScalarType::Integer,
            "biginteger" => ScalarType::BigInteger,
            "float" => ScalarType::Float,
            "decimal" => ScalarType::Decimal,
            "boolean" => ScalarType::Boolean,
            "json" => ScalarType::Json,
            "date" => ScalarType::Date,
            "datetime" => ScalarType::DateTime,
            "time" => ScalarType::Time,
            "timestamp" => ScalarType::Timestamp,
            other => ScalarType::Other(other.to_string()),
        }
    }
}

/// Target of a `model` / `collection` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// A named model.
    Model(String),
    /// `*`: the target type is recorded per instance.
    Any,
}

impl RefTarget {
    fn parse(name: &str) -> Self {
        if name == "*" {
            RefTarget::Any
        } else {
            RefTarget::Model(name.to_string())
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            RefTarget::Model(name) => Some(name),
            RefTarget::Any => None,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, RefTarget::Any)
    }
}

/// Shape shared by singular and plural references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub target: RefTarget,
    /// Inverse attribute on the target model.
    pub via: Option<String>,
    pub plugin: Option<String>,
    pub dominant: bool,
    /// Explicit join table name.
    pub collection_name: Option<String>,
}

/// Attribute shapes. Exactly one holds per attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    Scalar(ScalarType),
    Component { component: String, repeatable: bool },
    DynamicZone { components: Vec<String> },
    /// Singular reference (`model`).
    Model(Reference),
    /// Plural reference (`collection`).
    Collection(Reference),
}

/// Synthetic attributes injected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthetic {
    /// Stable external identifier, filled with the source key when absent.
    ExternalId,
    /// Soft-delete flag.
    SoftDelete,
    /// Reference to an administrative user, remapped through the admin id map.
    AuditUser,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub kind: AttributeKind,
    pub required: bool,
    pub default: Option<Value>,
    pub synthetic: Option<Synthetic>,
}

impl Attribute {
    /// Parse one entry of a raw definition's `attributes` object.
    pub fn parse(name: &str, value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            MigrateError::Config(format!("attribute '{}' is not an object", name))
        })?;
        let str_field = |key: &str| obj.get(key).and_then(Value::as_str);
        let bool_field = |key: &str| obj.get(key).and_then(Value::as_bool).unwrap_or(false);

        let reference = |target: &str| Reference {
            target: RefTarget::parse(target),
            via: str_field("via").map(str::to_string),
            plugin: str_field("plugin").map(str::to_string),
            dominant: bool_field("dominant"),
            collection_name: str_field("collectionName").map(str::to_string),
        };

        let kind = match (str_field("type"), str_field("model"), str_field("collection")) {
            (Some("component"), None, None) => {
                let component = str_field("component").ok_or_else(|| {
                    MigrateError::Config(format!(
                        "component attribute '{}' names no component",
                        name
                    ))
                })?;
                AttributeKind::Component {
                    component: component.to_string(),
                    repeatable: bool_field("repeatable"),
                }
            }
            (Some("dynamiczone"), None, None) => {
                let components = obj
                    .get("components")
                    .and_then(Value::as_array)
                    .map(|list| {
                        list.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                AttributeKind::DynamicZone { components }
            }
            (Some(ty), None, None) => AttributeKind::Scalar(ScalarType::from_name(ty)),
            (None, Some(model), None) => AttributeKind::Model(reference(model)),
            (None, None, Some(collection)) => AttributeKind::Collection(reference(collection)),
            (None, None, None) => {
                return Err(MigrateError::Config(format!(
                    "attribute '{}' has no type, model or collection",
                    name
                )))
            }
            _ => {
                return Err(MigrateError::Config(format!(
                    "attribute '{}' declares more than one of type, model and collection",
                    name
                )))
            }
        };

        Ok(Self {
            kind,
            required: bool_field("required"),
            default: obj.get("default").filter(|v| !v.is_null()).cloned(),
            synthetic: None,
        })
    }

    /// A configuration-injected scalar attribute.
    pub fn synthetic(ty: ScalarType, default: Option<Value>, marker: Synthetic) -> Self {
        Self {
            kind: AttributeKind::Scalar(ty),
            required: false,
            default,
            synthetic: Some(marker),
        }
    }

    pub fn scalar_type(&self) -> Option<&ScalarType> {
        match &self.kind {
            AttributeKind::Scalar(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar_type().is_some()
    }

    /// The reference, for `model` / `collection` attributes.
    pub fn reference(&self) -> Option<&Reference> {
        match &self.kind {
            AttributeKind::Model(r) | AttributeKind::Collection(r) => Some(r),
            _ => None,
        }
    }
}

/// Timestamp columns a model maintains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampOption {
    Disabled,
    /// Source field names copied into `created_at` / `updated_at`.
    Fields { created: String, updated: String },
}

impl Default for TimestampOption {
    fn default() -> Self {
        TimestampOption::Fields {
            created: DEFAULT_TIMESTAMPS[0].to_string(),
            updated: DEFAULT_TIMESTAMPS[1].to_string(),
        }
    }
}

impl TimestampOption {
    /// Parse `options.timestamps`: absent or `true` for the defaults, `false`
    /// for none, or an array of exactly two field names.
    pub fn parse(uid: &str, value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Bool(true)) => Ok(Self::default()),
            Some(Value::Bool(false)) => Ok(TimestampOption::Disabled),
            Some(Value::Array(fields)) => match fields.as_slice() {
                [Value::String(created), Value::String(updated)] => Ok(TimestampOption::Fields {
                    created: created.clone(),
                    updated: updated.clone(),
                }),
                _ => Err(Self::invalid(uid, value)),
            },
            Some(_) => Err(Self::invalid(uid, value)),
        }
    }

    fn invalid(uid: &str, value: Option<&Value>) -> MigrateError {
        MigrateError::Config(format!(
            "model {}: options.timestamps must be true, false or an array of 2 strings, got {}",
            uid,
            value.map(Value::to_string).unwrap_or_default()
        ))
    }
}

/// A parsed model definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    pub uid: String,
    pub uid_kind: UidKind,
    /// Bare model name (`user`, `hero`).
    pub name: String,
    /// Source container and target table.
    pub collection_name: String,
    pub global_type_name: String,
    pub timestamps: TimestampOption,
    pub options: Map<String, Value>,
    pub attributes: BTreeMap<String, Attribute>,
    /// Top-level raw fields not interpreted here (`info`, `kind`, ...).
    pub extra: Map<String, Value>,
}

impl ModelDefinition {
    /// Parse a raw serialized definition.
    pub fn parse(raw: &Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| MigrateError::Config("model definition is not an object".into()))?;

        let uid = obj
            .get("uid")
            .and_then(Value::as_str)
            .ok_or_else(|| MigrateError::Config("model definition has no uid".into()))?
            .to_string();
        let (uid_kind, name) = parse_uid(&uid)?;

        let collection_name = obj
            .get("collectionName")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MigrateError::Config(format!("model {} has no collectionName", uid)))?
            .to_string();

        let explicit_global = obj.get("globalId").and_then(Value::as_str);
        let global_type_name = global_type_name(&uid, &uid_kind, &name, explicit_global);

        let options = obj
            .get("options")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let timestamps = TimestampOption::parse(&uid, options.get("timestamps"))?;

        let mut attributes = BTreeMap::new();
        if let Some(raw_attributes) = obj.get("attributes").and_then(Value::as_object) {
            for (attr_name, attr) in raw_attributes {
                let parsed = Attribute::parse(attr_name, attr)
                    .map_err(|e| MigrateError::Config(format!("model {}: {}", uid, e)))?;
                attributes.insert(attr_name.clone(), parsed);
            }
        }

        let extra = obj
            .iter()
            .filter(|(k, _)| {
                !matches!(
                    k.as_str(),
                    "uid" | "collectionName" | "globalId" | "options" | "attributes"
                )
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            uid,
            uid_kind,
            name,
            collection_name,
            global_type_name,
            timestamps,
            options,
            attributes,
            extra,
        })
    }

    /// Plugin owning this model, if any. The administrative namespace counts
    /// as plugin `admin`.
    pub fn plugin(&self) -> Option<&str> {
        match &self.uid_kind {
            UidKind::Admin => Some(ADMIN_PLUGIN),
            UidKind::Plugin(plugin) => Some(plugin),
            _ => None,
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self.uid_kind, UidKind::Component(_))
    }

    /// Fold a later definition of the same uid into this one.
    ///
    /// Attribute sets are unioned and the later definition wins every
    /// conflict, top-level fields included. Union with later-wins is
    /// associative, so folding a sequence left to right gives the same result
    /// however the fold is grouped.
    pub fn merge(&mut self, later: ModelDefinition) {
        self.collection_name = later.collection_name;
        self.global_type_name = later.global_type_name;
        if later.options.contains_key("timestamps") {
            self.timestamps = later.timestamps;
        }
        self.options.extend(later.options);
        self.attributes.extend(later.attributes);
        self.extra.extend(later.extra);
    }

    /// Top-level field names, used to report divergent definitions.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = ["uid", "collectionName", "globalId", "options", "attributes"]
            .iter()
            .map(|s| s.to_string())
            .chain(self.extra.keys().cloned())
            .collect();
        names.sort();
        names
    }
}

/// Derive a model's global type name.
///
/// Components are always prefixed with `component_` so they cannot collide
/// with content types; other models use an explicit `globalId` when given,
/// else the PascalCase of `<plugin>-<name>`.
pub fn global_type_name(
    uid: &str,
    kind: &UidKind,
    name: &str,
    explicit: Option<&str>,
) -> String {
    let prefix = match kind {
        UidKind::Component(_) => return pascal_case(&format!("component_{}", uid)),
        UidKind::Admin => Some(ADMIN_PLUGIN),
        UidKind::Plugin(plugin) => Some(plugin.as_str()),
        UidKind::Other(namespace) => Some(namespace.as_str()),
        UidKind::Application(_) => None,
    };

    if let Some(explicit) = explicit.filter(|s| !s.is_empty()) {
        return explicit.to_string();
    }

    match prefix {
        Some(prefix) => pascal_case(&format!("{}-{}", prefix, name)),
        None => pascal_case(name),
    }
}
