//! Relation-cardinality classification and the per-attribute link plan.
//!
//! [`classify`] is a pure decision table over an attribute and, when it names
//! one through `via`, its inverse attribute on the target model. The first
//! matching rule wins:
//!
//! 1. component / dynamic zone
//! 2. reference to the file-attachment model (single or multiple)
//! 3. one-way: `model`, no `via`, concrete target
//! 4. one-to-one: `model` + `via`, inverse is a concrete `model`
//! 5. many-to-one: `model` + `via`, inverse is a concrete `collection`
//! 6. one-to-many: `collection` + `via`, inverse is a concrete `model`
//! 7. many-way: `collection`, no `via`, concrete target
//! 8. many-to-many: `collection` + `via`, inverse is a concrete `collection`
//! 9. morph: wildcard target
//! 10. morph inverse: `via` names a wildcard attribute
//!
//! Anything else is a configuration error.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::model::{Attribute, AttributeKind, ModelDefinition, ModelRegistry, Reference};
use crate::naming::{foreign_key, plural, snake_case, singular};

/// Cardinality verdict for one non-scalar attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Component,
    DynamicZone,
    SingleAttachment,
    MultipleAttachment,
    OneWay,
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyWay,
    ManyToMany,
    Morph,
    MorphInverse,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Component => "component",
            Relation::DynamicZone => "dynamic-zone",
            Relation::SingleAttachment => "single-attachment",
            Relation::MultipleAttachment => "multiple-attachment",
            Relation::OneWay => "one-way",
            Relation::OneToOne => "one-to-one",
            Relation::ManyToOne => "many-to-one",
            Relation::OneToMany => "one-to-many",
            Relation::ManyWay => "many-way",
            Relation::ManyToMany => "many-to-many",
            Relation::Morph => "morph",
            Relation::MorphInverse => "morph-inverse",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a reference points at the configured file-attachment model.
pub fn is_attachment(reference: &Reference, config: &MigrationConfig) -> bool {
    reference.target.name() == Some(config.upload_model.as_str())
        && reference.plugin.as_deref() == Some(config.upload_plugin.as_str())
}

/// Classify an attribute given its inverse attribute, if any.
pub fn classify(
    attribute: &Attribute,
    inverse: Option<&Attribute>,
    config: &MigrationConfig,
) -> Result<Relation> {
    let (reference, singular) = match &attribute.kind {
        AttributeKind::Component { .. } => return Ok(Relation::Component),
        AttributeKind::DynamicZone { .. } => return Ok(Relation::DynamicZone),
        AttributeKind::Model(r) => (r, true),
        AttributeKind::Collection(r) => (r, false),
        AttributeKind::Scalar(_) => {
            return Err(MigrateError::Config(
                "scalar attributes have no relation".into(),
            ))
        }
    };

    if is_attachment(reference, config) {
        return Ok(if singular {
            Relation::SingleAttachment
        } else {
            Relation::MultipleAttachment
        });
    }

    let concrete = !reference.target.is_any();
    let via = reference.via.is_some();
    let (inverse_model, inverse_collection, inverse_any) = match inverse.map(|b| &b.kind) {
        Some(AttributeKind::Model(b)) => (!b.target.is_any(), false, b.target.is_any()),
        Some(AttributeKind::Collection(b)) => (false, !b.target.is_any(), b.target.is_any()),
        _ => (false, false, false),
    };

    let relation = if singular && !via && concrete {
        Relation::OneWay
    } else if singular && via && inverse_model {
        Relation::OneToOne
    } else if singular && via && inverse_collection {
        Relation::ManyToOne
    } else if !singular && via && inverse_model {
        Relation::OneToMany
    } else if !singular && !via && concrete {
        Relation::ManyWay
    } else if !singular && via && inverse_collection {
        Relation::ManyToMany
    } else if !concrete {
        Relation::Morph
    } else if via && inverse_any {
        Relation::MorphInverse
    } else {
        return Err(MigrateError::Config(format!(
            "unclassifiable relation shape ({} '{}' via {:?}, inverse {})",
            if singular { "model" } else { "collection" },
            reference.target.name().unwrap_or("*"),
            reference.via,
            if inverse.is_some() {
                "is not a reference"
            } else {
                "missing"
            }
        )));
    };

    Ok(relation)
}

/// A join table and the two foreign-key columns of its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub table: String,
    /// Column holding the writing document's id.
    pub owner_column: String,
    /// Column holding the referenced document's id.
    pub target_column: String,
}

/// Join table of a many-way reference on `owner`.
pub fn many_way_join(owner: &ModelDefinition, attribute: &str, reference: &Reference) -> JoinTable {
    let table = reference
        .collection_name
        .clone()
        .unwrap_or_else(|| format!("{}__{}", owner.collection_name, snake_case(attribute)));

    let owner_column = foreign_key(&owner.collection_name);
    let mut target_column = foreign_key(reference.target.name().unwrap_or_default());
    if target_column == owner_column {
        target_column = format!("related_{}", target_column);
    }

    JoinTable {
        table,
        owner_column,
        target_column,
    }
}

/// Join table shared by the two sides of a many-to-many relation.
///
/// Names are always derived from the dominant side's perspective, so
/// `many_to_many_join(a, b) == many_to_many_join(b, a)`. Exactly one side must
/// be dominant, unless both sides are the same self-referencing attribute.
pub fn many_to_many_join(a: &Reference, b: &Reference) -> Result<JoinTable> {
    let (dominant, other) = if a == b {
        (a, b)
    } else {
        match (a.dominant, b.dominant) {
            (true, false) => (a, b),
            (false, true) => (b, a),
            (true, true) => {
                return Err(MigrateError::Config(format!(
                    "many-to-many {:?}/{:?}: both sides are dominant",
                    a.via, b.via
                )))
            }
            (false, false) => {
                return Err(MigrateError::Config(format!(
                    "many-to-many {:?}/{:?}: no side is dominant",
                    a.via, b.via
                )))
            }
        }
    };

    fn side_name(r: &Reference) -> Result<(&str, &str)> {
        match (r.target.name(), r.via.as_deref()) {
            (Some(collection), Some(via)) => Ok((collection, via)),
            _ => Err(MigrateError::Config(
                "many-to-many side needs a concrete target and via".into(),
            )),
        }
    }
    let (dominant_collection, dominant_via) = side_name(dominant)?;
    let (other_collection, other_via) = side_name(other)?;

    let table = match &dominant.collection_name {
        Some(name) => name.clone(),
        None => {
            // Sort by target collection; on a tie the dominant side goes last
            let mut sides = [
                (other_collection, other_via, false),
                (dominant_collection, dominant_via, true),
            ];
            sides.sort_by(|x, y| x.0.cmp(y.0).then(x.2.cmp(&y.2)));
            sides
                .iter()
                .map(|(collection, via, _)| {
                    snake_case(&format!("{}_{}", plural(collection), plural(via)))
                })
                .collect::<Vec<_>>()
                .join("__")
        }
    };

    let target_column = format!("{}_id", singular(dominant_collection));
    let mut owner_column = format!("{}_id", singular(other_collection));
    if owner_column == target_column {
        owner_column = format!("{}_id", singular(dominant_via));
    }

    Ok(JoinTable {
        table,
        owner_column,
        target_column,
    })
}

/// What the link pass writes for one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Nothing is written from this side.
    Skip,
    /// Update the owning row's column named after the attribute.
    InlineKey,
    /// Ordered component link rows. `component_table` is `None` for dynamic
    /// zones, whose element types are resolved per instance.
    Components {
        table: String,
        owner_column: String,
        component_table: Option<String>,
    },
    /// Rows in the polymorphic attachment table.
    Attachments { table: String, file_column: String },
    /// Rows in a join table.
    Join(JoinTable),
    /// Rows in the owner's polymorphic link table.
    Morph { table: String, owner_column: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlan {
    pub attribute: String,
    pub relation: Relation,
    pub action: LinkAction,
}

/// Link plans of every non-scalar attribute of every model, computed once at
/// startup so configuration errors surface before anything is written.
#[derive(Debug, Clone, Default)]
pub struct RelationPlan {
    by_model: HashMap<String, Vec<LinkPlan>>,
}

impl RelationPlan {
    pub fn build(registry: &ModelRegistry, config: &MigrationConfig) -> Result<Self> {
        let mut by_model = HashMap::new();
        for model in registry.models() {
            let mut links = Vec::new();
            for (name, attribute) in &model.attributes {
                if attribute.is_scalar() {
                    continue;
                }
                let plan = plan_attribute(model, name, attribute, registry, config)
                    .map_err(|e| match e {
                        MigrateError::Config(msg) => {
                            MigrateError::Config(format!("{}.{}: {}", model.uid, name, msg))
                        }
                        other => other,
                    })?;
                debug!(
                    "{}.{} classified as {}",
                    model.uid, name, plan.relation
                );
                links.push(plan);
            }
            by_model.insert(model.uid.clone(), links);
        }
        Ok(Self { by_model })
    }

    /// Link plans of a model, in attribute-name order.
    pub fn links(&self, uid: &str) -> &[LinkPlan] {
        self.by_model.get(uid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, uid: &str, attribute: &str) -> Option<&LinkPlan> {
        self.links(uid).iter().find(|p| p.attribute == attribute)
    }

    /// Count of planned attributes per verdict.
    pub fn summary(&self) -> HashMap<Relation, usize> {
        let mut counts = HashMap::new();
        for plan in self.by_model.values().flatten() {
            *counts.entry(plan.relation).or_insert(0) += 1;
        }
        counts
    }
}

fn plan_attribute(
    model: &ModelDefinition,
    name: &str,
    attribute: &Attribute,
    registry: &ModelRegistry,
    config: &MigrationConfig,
) -> Result<LinkPlan> {
    let mut target = None;
    let mut inverse = None;
    if let Some(reference) = attribute.reference() {
        target = registry.relation_target(reference)?;
        if let (Some(target), Some(via)) = (target, &reference.via) {
            if !is_attachment(reference, config) {
                inverse = Some(target.attributes.get(via).ok_or_else(|| {
                    MigrateError::Config(format!(
                        "inverse attribute '{}' not found on {}",
                        via, target.uid
                    ))
                })?);
            }
        }
    }

    let relation = classify(attribute, inverse, config)?;
    let owner_column = foreign_key(&model.collection_name);

    let action = match (relation, &attribute.kind) {
        (Relation::Component, AttributeKind::Component { component, .. }) => {
            let component_model = registry.get(component).ok_or_else(|| {
                MigrateError::Config(format!("unknown component {}", component))
            })?;
            LinkAction::Components {
                table: format!("{}_components", model.collection_name),
                owner_column,
                component_table: Some(component_model.collection_name.clone()),
            }
        }
        (Relation::DynamicZone, _) => LinkAction::Components {
            table: format!("{}_components", model.collection_name),
            owner_column,
            component_table: None,
        },
        (Relation::SingleAttachment | Relation::MultipleAttachment, _) => {
            let file_model = target.ok_or_else(|| {
                MigrateError::Config("attachment target model not found".into())
            })?;
            LinkAction::Attachments {
                table: config.attachment_table.clone(),
                file_column: foreign_key(&file_model.collection_name),
            }
        }
        (Relation::OneWay | Relation::OneToOne | Relation::ManyToOne, _) => LinkAction::InlineKey,
        (Relation::OneToMany | Relation::MorphInverse, _) => LinkAction::Skip,
        (Relation::ManyWay, AttributeKind::Collection(reference)) => {
            LinkAction::Join(many_way_join(model, name, reference))
        }
        (Relation::ManyToMany, AttributeKind::Collection(reference)) => {
            let other = inverse.and_then(Attribute::reference).ok_or_else(|| {
                MigrateError::Config("many-to-many inverse is not a reference".into())
            })?;
            let join = many_to_many_join(reference, other)?;
            if reference.dominant || reference == other {
                LinkAction::Join(join)
            } else {
                LinkAction::Skip
            }
        }
        (Relation::Morph, _) => {
            let is_file_model = model.name == config.upload_model
                && model.plugin() == Some(config.upload_plugin.as_str());
            if is_file_model {
                LinkAction::Skip
            } else {
                LinkAction::Morph {
                    table: format!("{}_morph", model.collection_name),
                    owner_column,
                }
            }
        }
        (relation, kind) => {
            return Err(MigrateError::Config(format!(
                "verdict {} does not fit attribute shape {:?}",
                relation, kind
            )))
        }
    };

    Ok(LinkPlan {
        attribute: name.to_string(),
        relation,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RefTarget, ScalarType};
    use serde_json::json;

    fn reference(target: &str, via: Option<&str>) -> Reference {
        Reference {
            target: if target == "*" {
                RefTarget::Any
            } else {
                RefTarget::Model(target.into())
            },
            via: via.map(str::to_string),
            plugin: None,
            dominant: false,
            collection_name: None,
        }
    }

    fn model_attr(target: &str, via: Option<&str>) -> Attribute {
        Attribute {
            kind: AttributeKind::Model(reference(target, via)),
            required: false,
            default: None,
            synthetic: None,
        }
    }

    fn collection_attr(target: &str, via: Option<&str>) -> Attribute {
        Attribute {
            kind: AttributeKind::Collection(reference(target, via)),
            required: false,
            default: None,
            synthetic: None,
        }
    }

    fn cfg() -> MigrationConfig {
        MigrationConfig::default()
    }

    #[test]
    fn test_decision_table() {
        let c = cfg();
        let check = |a: Attribute, b: Option<Attribute>, expected: Relation| {
            assert_eq!(classify(&a, b.as_ref(), &c).unwrap(), expected);
        };

        check(model_attr("author", None), None, Relation::OneWay);
        check(
            model_attr("profile", Some("user")),
            Some(model_attr("user", Some("profile"))),
            Relation::OneToOne,
        );
        check(
            model_attr("author", Some("books")),
            Some(collection_attr("book", Some("author"))),
            Relation::ManyToOne,
        );
        check(
            collection_attr("book", Some("author")),
            Some(model_attr("author", Some("books"))),
            Relation::OneToMany,
        );
        check(collection_attr("tag", None), None, Relation::ManyWay);
        check(
            collection_attr("tag", Some("posts")),
            Some(collection_attr("post", Some("tags"))),
            Relation::ManyToMany,
        );
        check(collection_attr("*", None), None, Relation::Morph);
        check(model_attr("*", None), None, Relation::Morph);
        check(
            collection_attr("page", Some("related")),
            Some(collection_attr("*", None)),
            Relation::MorphInverse,
        );
    }

    #[test]
    fn test_components_and_attachments_win_first() {
        let c = cfg();
        let component = Attribute::parse(
            "hero",
            &json!({"type": "component", "component": "default.hero"}),
        )
        .unwrap();
        assert_eq!(classify(&component, None, &c).unwrap(), Relation::Component);

        let mut cover = model_attr("file", Some("related"));
        if let AttributeKind::Model(r) = &mut cover.kind {
            r.plugin = Some("upload".into());
        }
        // The inverse would make it a morph inverse, but attachments match first
        let related = collection_attr("*", None);
        assert_eq!(
            classify(&cover, Some(&related), &c).unwrap(),
            Relation::SingleAttachment
        );

        let mut gallery = collection_attr("file", Some("related"));
        if let AttributeKind::Collection(r) = &mut gallery.kind {
            r.plugin = Some("upload".into());
        }
        assert_eq!(
            classify(&gallery, None, &c).unwrap(),
            Relation::MultipleAttachment
        );
    }

    #[test]
    fn test_unmatched_shape_is_config_error() {
        let c = cfg();
        // via names an attribute that does not exist on the target
        let err = classify(&model_attr("author", Some("books")), None, &c).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));

        let scalar = Attribute::synthetic(ScalarType::String, None, crate::model::Synthetic::ExternalId);
        assert!(classify(&model_attr("author", Some("name")), Some(&scalar), &c).is_err());
    }

    #[test]
    fn test_classify_is_deterministic() {
        let c = cfg();
        let a = collection_attr("tag", Some("posts"));
        let b = collection_attr("post", Some("tags"));
        let first = classify(&a, Some(&b), &c).unwrap();
        for _ in 0..10 {
            assert_eq!(classify(&a, Some(&b), &c).unwrap(), first);
        }
    }

    #[test]
    fn test_many_to_many_join_is_symmetric() {
        let mut tags = reference("tag", Some("posts"));
        tags.dominant = true;
        let posts = reference("post", Some("tags"));

        let ab = many_to_many_join(&tags, &posts).unwrap();
        let ba = many_to_many_join(&posts, &tags).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.table, "posts_tags__tags_posts");
        assert_eq!(ab.owner_column, "post_id");
        assert_eq!(ab.target_column, "tag_id");
    }

    #[test]
    fn test_many_to_many_dominant_collection_name_wins() {
        let mut tags = reference("tag", Some("posts"));
        tags.dominant = true;
        tags.collection_name = Some("post_tag_links".into());
        let posts = reference("post", Some("tags"));
        assert_eq!(many_to_many_join(&posts, &tags).unwrap().table, "post_tag_links");
    }

    #[test]
    fn test_many_to_many_requires_one_dominant_side() {
        let a = reference("tag", Some("posts"));
        let b = reference("post", Some("tags"));
        assert!(many_to_many_join(&a, &b).is_err());

        let mut a = a;
        let mut b = b;
        a.dominant = true;
        b.dominant = true;
        assert!(many_to_many_join(&a, &b).is_err());
    }

    #[test]
    fn test_self_referencing_many_to_many() {
        let mut friends = reference("user", Some("friends"));
        friends.dominant = true;
        let join = many_to_many_join(&friends, &friends).unwrap();
        assert_eq!(join.table, "users_friends__users_friends");
        assert_eq!(join.target_column, "user_id");
        assert_eq!(join.owner_column, "friend_id");
    }

    #[test]
    fn test_many_way_join_disambiguates_columns() {
        let owner = ModelDefinition::parse(&json!({
            "uid": "application::page.page",
            "collectionName": "pages",
            "attributes": {}
        }))
        .unwrap();
        let join = many_way_join(&owner, "relatedPages", &reference("page", None));
        assert_eq!(join.table, "pages__related_pages");
        assert_eq!(join.owner_column, "page_id");
        assert_eq!(join.target_column, "related_page_id");

        let mut explicit = reference("tag", None);
        explicit.collection_name = Some("page_tags".into());
        let join = many_way_join(&owner, "tags", &explicit);
        assert_eq!(join.table, "page_tags");
        assert_eq!(join.target_column, "tag_id");
    }

    fn registry(defs: Vec<serde_json::Value>) -> ModelRegistry {
        ModelRegistry::build(&defs, &cfg()).unwrap()
    }

    #[test]
    fn test_plan_assigns_actions() {
        let registry = registry(vec![
            json!({"uid": "application::post.post", "collectionName": "posts", "attributes": {
                "title": {"type": "string"},
                "tags": {"collection": "tag", "via": "posts", "dominant": true},
                "author": {"model": "author", "via": "posts"},
                "cover": {"model": "file", "via": "related", "plugin": "upload"},
                "blocks": {"type": "dynamiczone", "components": ["default.hero"]}
            }}),
            json!({"uid": "application::tag.tag", "collectionName": "tags", "attributes": {
                "posts": {"collection": "post", "via": "tags"}
            }}),
            json!({"uid": "application::author.author", "collectionName": "authors", "attributes": {
                "posts": {"collection": "post", "via": "author"}
            }}),
            json!({"uid": "plugins::upload.file", "collectionName": "upload_file", "attributes": {
                "related": {"collection": "*", "filter": "field"}
            }}),
            json!({"uid": "default.hero", "collectionName": "components_default_heroes", "attributes": {}}),
        ]);
        let plan = RelationPlan::build(&registry, &cfg()).unwrap();

        let post = |attr: &str| plan.get("application::post.post", attr).unwrap().clone();
        assert_eq!(plan.links("application::post.post").len(), 4);
        assert_eq!(post("author").action, LinkAction::InlineKey);
        assert_eq!(
            post("cover").action,
            LinkAction::Attachments {
                table: "upload_file_morph".into(),
                file_column: "upload_file_id".into()
            }
        );
        assert!(matches!(post("tags").action, LinkAction::Join(_)));
        assert_eq!(
            post("blocks").action,
            LinkAction::Components {
                table: "posts_components".into(),
                owner_column: "post_id".into(),
                component_table: None
            }
        );

        let tag_posts = plan.get("application::tag.tag", "posts").unwrap();
        assert_eq!(tag_posts.relation, Relation::ManyToMany);
        assert_eq!(tag_posts.action, LinkAction::Skip);

        let author_posts = plan.get("application::author.author", "posts").unwrap();
        assert_eq!(author_posts.relation, Relation::OneToMany);
        assert_eq!(author_posts.action, LinkAction::Skip);

        // The file model's own morph links are written by the attachment side
        let related = plan.get("plugins::upload.file", "related").unwrap();
        assert_eq!(related.relation, Relation::Morph);
        assert_eq!(related.action, LinkAction::Skip);
    }

    #[test]
    fn test_plan_reports_missing_inverse() {
        let registry = registry(vec![
            json!({"uid": "application::book.book", "collectionName": "books", "attributes": {
                "author": {"model": "author", "via": "books"}
            }}),
            json!({"uid": "application::author.author", "collectionName": "authors", "attributes": {}}),
        ]);
        let err = RelationPlan::build(&registry, &cfg()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("application::book.book.author"), "{}", msg);
        assert!(msg.contains("inverse attribute 'books'"), "{}", msg);
    }
}
