//! Phase 2: foreign keys, join rows and polymorphic links.

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use super::{as_list, reference_key, ModelStats};
use crate::core::{Document, Row, SourceStore, TargetStore};
use crate::error::{MigrateError, Result};
use crate::model::{ModelDefinition, ModelRegistry};
use crate::relation::{LinkAction, LinkPlan};
use crate::translate::{IdentifierTranslator, Sequences};

/// Everything a link write reads, for one model.
struct LinkWriter<'a> {
    model: &'a ModelDefinition,
    registry: &'a ModelRegistry,
    translator: &'a IdentifierTranslator,
    target: &'a dyn TargetStore,
}

impl LinkWriter<'_> {
    fn context(&self, attribute: &str) -> String {
        format!("{}.{}", self.model.uid, attribute)
    }

    fn resolve(&self, value: &Value, attribute: &str) -> Result<Option<i64>> {
        match reference_key(value)? {
            Some(key) => self
                .translator
                .resolve_for(&key, self.context(attribute))
                .map(Some),
            None => Ok(None),
        }
    }

    /// Rows for one attribute of one document. Inline keys come back as an
    /// update of the owning row instead.
    fn rows_for(
        &self,
        plan: &LinkPlan,
        owner_id: i64,
        value: &Value,
        link_ids: &mut Sequences,
    ) -> Result<Vec<Row>> {
        let attribute = plan.attribute.as_str();
        let mut rows = Vec::new();

        match &plan.action {
            LinkAction::Skip | LinkAction::InlineKey => {}

            LinkAction::Components {
                table,
                owner_column,
                component_table,
            } => {
                let mut order = 0i64;
                for element in as_list(value) {
                    let element = element_object(element, attribute)?;
                    let component_type = match component_table {
                        Some(static_table) => static_table.clone(),
                        None => {
                            let kind = element_kind(element, attribute)?;
                            self.registry.require_global_type(kind)?.collection_name.clone()
                        }
                    };
                    let Some(component_id) = self.resolve(element_ref(element)?, attribute)?
                    else {
                        continue;
                    };
                    order += 1;
                    rows.push(
                        Row::new()
                            .with("id", link_ids.next(table))
                            .with("field", attribute)
                            .with("order", order)
                            .with("component_type", component_type)
                            .with("component_id", component_id)
                            .with(owner_column.as_str(), owner_id),
                    );
                }
            }

            LinkAction::Attachments { file_column, .. } => {
                let mut order = 0i64;
                for element in as_list(value) {
                    let Some(file_id) = self.resolve(element, attribute)? else {
                        continue;
                    };
                    order += 1;
                    rows.push(
                        Row::new()
                            .with(file_column.as_str(), file_id)
                            .with("related_id", owner_id)
                            .with("related_type", self.model.collection_name.as_str())
                            .with("field", attribute)
                            .with("order", order),
                    );
                }
            }

            LinkAction::Join(join) => {
                for element in as_list(value) {
                    let Some(target_id) = self.resolve(element, attribute)? else {
                        continue;
                    };
                    rows.push(
                        Row::new()
                            .with(join.owner_column.as_str(), owner_id)
                            .with(join.target_column.as_str(), target_id),
                    );
                }
            }

            LinkAction::Morph { owner_column, .. } => {
                let mut order = 0i64;
                for element in as_list(value) {
                    let element = element_object(element, attribute)?;
                    let related = self
                        .registry
                        .require_global_type(element_kind(element, attribute)?)?;
                    let Some(related_id) = self.resolve(element_ref(element)?, attribute)?
                    else {
                        continue;
                    };
                    let field = element
                        .get("field")
                        .and_then(Value::as_str)
                        .unwrap_or(attribute);
                    order += 1;
                    rows.push(
                        Row::new()
                            .with(owner_column.as_str(), owner_id)
                            .with("related_id", related_id)
                            .with("related_type", related.collection_name.as_str())
                            .with("field", field)
                            .with("order", order),
                    );
                }
            }
        }

        Ok(rows)
    }

    async fn write_document(
        &self,
        plans: &[LinkPlan],
        doc: &Document,
        link_ids: &mut Sequences,
        stats: &mut ModelStats,
    ) -> Result<()> {
        let owner_table = &self.model.collection_name;
        let owner_id = self
            .translator
            .resolve_for(&doc.key, format!("{} document", self.model.uid))?;

        let mut inline = Row::new();
        for plan in plans {
            let Some(value) = doc.present(&plan.attribute) else {
                continue;
            };

            if plan.action == LinkAction::InlineKey {
                if let Some(target_id) = self.resolve(value, &plan.attribute)? {
                    inline.set(plan.attribute.as_str(), target_id);
                }
                continue;
            }

            let rows = self.rows_for(plan, owner_id, value, link_ids)?;
            if rows.is_empty() {
                continue;
            }
            let table = link_table(&plan.action);
            if let Err(e) = self.target.insert_rows(table, &rows).await {
                for row in &rows {
                    error!("Insert into {} failed for row:\n{}", table, row.to_json_pretty());
                }
                return Err(e);
            }
            stats.links += rows.len() as u64;
        }

        if !inline.is_empty() {
            if let Err(e) = self.target.update_by_id(owner_table, owner_id, &inline).await {
                error!(
                    "Update of {} id {} failed with:\n{}",
                    owner_table,
                    owner_id,
                    inline.to_json_pretty()
                );
                return Err(e);
            }
            stats.updates += 1;
        }
        Ok(())
    }
}

fn link_table(action: &LinkAction) -> &str {
    match action {
        LinkAction::Components { table, .. }
        | LinkAction::Attachments { table, .. }
        | LinkAction::Morph { table, .. } => table,
        LinkAction::Join(join) => &join.table,
        LinkAction::Skip | LinkAction::InlineKey => "",
    }
}

fn element_object<'v>(element: &'v Value, attribute: &str) -> Result<&'v Map<String, Value>> {
    element.as_object().ok_or_else(|| {
        MigrateError::Source(format!(
            "{}: expected an embedded reference object, got {}",
            attribute, element
        ))
    })
}

/// Source key of the document an embedded element points at.
fn element_ref(element: &Map<String, Value>) -> Result<&Value> {
    element.get("ref").ok_or_else(|| {
        MigrateError::Source(format!(
            "embedded reference without ref: {}",
            Value::Object(element.clone())
        ))
    })
}

/// Global type name discriminator of a polymorphic element.
fn element_kind<'v>(element: &'v Map<String, Value>, attribute: &str) -> Result<&'v str> {
    element.get("kind").and_then(Value::as_str).ok_or_else(|| {
        MigrateError::Source(format!(
            "{}: polymorphic element without kind: {}",
            attribute,
            Value::Object(element.clone())
        ))
    })
}

/// Write the links of every document of one model.
///
/// Runs only once every model's rows exist, so every referenced key has a
/// target id; an unresolved key is a dangling reference.
pub async fn materialize_links(
    model: &ModelDefinition,
    plans: &[LinkPlan],
    registry: &ModelRegistry,
    source: &dyn SourceStore,
    target: &dyn TargetStore,
    translator: &IdentifierTranslator,
    link_ids: &mut Sequences,
) -> Result<ModelStats> {
    let mut stats = ModelStats::default();
    if plans.iter().all(|p| p.action == LinkAction::Skip) {
        debug!("{} has no links to write", model.uid);
        return Ok(stats);
    }
    info!("Materializing links of {}", model.uid);

    let writer = LinkWriter {
        model,
        registry,
        translator,
        target,
    };

    let mut rx = source.scan(&model.collection_name);
    while let Some(doc) = rx.recv().await {
        let doc = doc?;
        if let Err(e) = writer.write_document(plans, &doc, link_ids, &mut stats).await {
            if !matches!(e, MigrateError::Write { .. }) {
                error!("Cannot link document of {}:\n{}", model.uid, doc.to_json_pretty());
            }
            return Err(e);
        }
    }

    debug!(
        "{}: {} link rows, {} inline updates",
        model.uid, stats.links, stats.updates
    );
    Ok(stats)
}
