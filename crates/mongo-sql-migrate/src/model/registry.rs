//! The model registry: merged, ordered, fixed-up model definitions.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::definition::{
    Attribute, AttributeKind, ModelDefinition, RefTarget, Reference, ScalarType, Synthetic,
};
use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};

/// Synthetic attribute names.
pub const EXTERNAL_ID_ATTRIBUTE: &str = "uuid";
pub const SOFT_DELETE_ATTRIBUTE: &str = "deleted";
pub const CREATED_BY_ATTRIBUTE: &str = "created_by";
pub const UPDATED_BY_ATTRIBUTE: &str = "updated_by";

/// Parse every raw definition, in source order.
pub fn load(raw_definitions: &[Value]) -> Result<Vec<ModelDefinition>> {
    raw_definitions.iter().map(ModelDefinition::parse).collect()
}

/// Group definitions by uid, folding later duplicates into the first
/// occurrence. Dropped uids are discarded. Output order is the order in which
/// each uid first appeared.
pub fn merge(models: Vec<ModelDefinition>, config: &MigrationConfig) -> Vec<ModelDefinition> {
    let mut merged: Vec<ModelDefinition> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for model in models {
        if config.is_dropped(&model.uid) {
            info!("Dropping model {}", model.uid);
            continue;
        }

        match positions.get(&model.uid) {
            Some(&idx) => {
                let existing = &mut merged[idx];
                if existing.field_names() != model.field_names() {
                    warn!(
                        "Merging divergent definitions of {}: fields [{}] + [{}]",
                        model.uid,
                        existing.field_names().join(", "),
                        model.field_names().join(", ")
                    );
                }
                let before: Vec<String> = existing.attributes.keys().cloned().collect();
                let after: Vec<String> = model.attributes.keys().cloned().collect();
                if before != after {
                    warn!(
                        "Merging divergent attributes of {}: [{}] + [{}]",
                        model.uid,
                        before.join(", "),
                        after.join(", ")
                    );
                }
                existing.merge(model);
            }
            None => {
                positions.insert(model.uid.clone(), merged.len());
                merged.push(model);
            }
        }
    }

    merged
}

/// Move the administrative model to the front. Relative order of every other
/// model is kept.
pub fn order(mut models: Vec<ModelDefinition>, admin_uid: &str) -> Vec<ModelDefinition> {
    match models.iter().position(|m| m.uid == admin_uid) {
        Some(idx) => {
            let admin = models.remove(idx);
            models.insert(0, admin);
        }
        None => warn!(
            "Administrative model {} not found; audit-user fields cannot be remapped",
            admin_uid
        ),
    }
    models
}

/// Apply the configured field-set corrections to one model.
pub fn apply_fixups(model: &mut ModelDefinition, config: &MigrationConfig) {
    let per_model = config
        .attribute_removals
        .get(&model.uid)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for name in config.deprecated_attributes.iter().chain(per_model) {
        if model.attributes.remove(name).is_some() {
            info!("Removing attribute '{}' from {}", name, model.uid);
        }
    }

    if config.soft_delete_models.contains(&model.uid) {
        debug!("Adding external id and soft-delete flag to {}", model.uid);
        model.attributes.insert(
            EXTERNAL_ID_ATTRIBUTE.to_string(),
            Attribute::synthetic(ScalarType::Uid, None, Synthetic::ExternalId),
        );
        model.attributes.insert(
            SOFT_DELETE_ATTRIBUTE.to_string(),
            Attribute::synthetic(
                ScalarType::Boolean,
                Some(Value::Bool(false)),
                Synthetic::SoftDelete,
            ),
        );
    }

    if config.audit_user_models.contains(&model.uid) {
        debug!("Adding audit-user fields to {}", model.uid);
        for name in [CREATED_BY_ATTRIBUTE, UPDATED_BY_ATTRIBUTE] {
            model.attributes.insert(
                name.to_string(),
                Attribute::synthetic(ScalarType::Integer, None, Synthetic::AuditUser),
            );
        }
    }
}

/// Ordered model list plus lookup maps.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDefinition>,
    by_uid: HashMap<String, usize>,
    by_global_type: HashMap<String, usize>,
    admin_uid: String,
}

impl ModelRegistry {
    /// Build the registry from raw definitions: load, merge, order, fix up,
    /// then validate cross-model references.
    pub fn build(raw_definitions: &[Value], config: &MigrationConfig) -> Result<Self> {
        let loaded = load(raw_definitions)?;
        let loaded_count = loaded.len();
        let mut models = order(merge(loaded, config), &config.admin_model);
        for model in &mut models {
            apply_fixups(model, config);
        }

        let registry = Self::from_models(models, &config.admin_model)?;
        info!(
            "Model registry: {} definitions merged into {} models",
            loaded_count,
            registry.models.len()
        );
        Ok(registry)
    }

    /// Index already-ordered models and validate component references.
    pub fn from_models(models: Vec<ModelDefinition>, admin_uid: &str) -> Result<Self> {
        let mut by_uid = HashMap::new();
        let mut by_global_type = HashMap::new();

        for (idx, model) in models.iter().enumerate() {
            if by_uid.insert(model.uid.clone(), idx).is_some() {
                return Err(MigrateError::Config(format!(
                    "model {} appears twice in the registry",
                    model.uid
                )));
            }
            if let Some(other) = by_global_type.insert(model.global_type_name.clone(), idx) {
                return Err(MigrateError::Config(format!(
                    "models {} and {} share global type name {}",
                    models[other].uid, model.uid, model.global_type_name
                )));
            }
        }

        let registry = Self {
            models,
            by_uid,
            by_global_type,
            admin_uid: admin_uid.to_string(),
        };
        registry.validate_components()?;
        Ok(registry)
    }

    fn validate_components(&self) -> Result<()> {
        for model in &self.models {
            for (name, attribute) in &model.attributes {
                let referenced: Vec<&String> = match &attribute.kind {
                    AttributeKind::Component { component, .. } => vec![component],
                    AttributeKind::DynamicZone { components } => components.iter().collect(),
                    _ => continue,
                };
                for uid in referenced {
                    if self.get(uid).is_none() {
                        return Err(MigrateError::Config(format!(
                            "{}.{} references unknown component {}",
                            model.uid, name, uid
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Models in processing order.
    pub fn models(&self) -> &[ModelDefinition] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<&ModelDefinition> {
        self.by_uid.get(uid).map(|&idx| &self.models[idx])
    }

    pub fn by_global_type(&self, global_type_name: &str) -> Option<&ModelDefinition> {
        self.by_global_type
            .get(global_type_name)
            .map(|&idx| &self.models[idx])
    }

    /// Resolve a global type name, failing if the registry does not know it.
    pub fn require_global_type(&self, global_type_name: &str) -> Result<&ModelDefinition> {
        self.by_global_type(global_type_name).ok_or_else(|| {
            MigrateError::Config(format!(
                "unknown global type name '{}': the model registry is incomplete",
                global_type_name
            ))
        })
    }

    pub fn admin_uid(&self) -> &str {
        &self.admin_uid
    }

    pub fn is_admin(&self, model: &ModelDefinition) -> bool {
        model.uid == self.admin_uid
    }

    /// Find the model a reference points at.
    ///
    /// Returns `None` for wildcard references. A reference carrying a
    /// `plugin` only matches models of that plugin; one without only matches
    /// models outside any plugin.
    pub fn relation_target(&self, reference: &Reference) -> Result<Option<&ModelDefinition>> {
        let name = match &reference.target {
            RefTarget::Any => return Ok(None),
            RefTarget::Model(name) => name,
        };

        let mut candidates = self
            .models
            .iter()
            .filter(|m| !m.is_component())
            .filter(|m| m.name == *name && m.plugin() == reference.plugin.as_deref());

        let target = candidates.next().ok_or_else(|| {
            MigrateError::Config(format!(
                "unknown relation target '{}'{}",
                name,
                reference
                    .plugin
                    .as_ref()
                    .map(|p| format!(" in plugin '{}'", p))
                    .unwrap_or_default()
            ))
        })?;

        if let Some(other) = candidates.next() {
            return Err(MigrateError::Config(format!(
                "ambiguous relation target '{}': matches {} and {}",
                name, target.uid, other.uid
            )));
        }

        Ok(Some(target))
    }
}
