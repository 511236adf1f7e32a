//! Migration orchestrator - main workflow coordinator.
//!
//! A run is strictly sequential:
//!
//! 1. load and reconcile the model registry, then plan every relation
//! 2. clear the target and run its session setup
//! 3. row pass over every model (administrative model first)
//! 4. link pass over every model, only once every row exists
//! 5. session teardown
//!
//! Both stores are closed whether or not the run succeeded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::{SourceStore, TargetStore};
use crate::error::Result;
use crate::materialize::{materialize_links, materialize_rows, ModelStats};
use crate::model::ModelRegistry;
use crate::relation::{LinkAction, RelationPlan};
use crate::store::{connect_source, connect_target};
use crate::translate::{AdminUserIds, IdentifierTranslator, Sequences};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Models migrated, in processing order.
    pub models_total: usize,

    /// Total rows inserted into model tables.
    pub rows_inserted: u64,

    /// Total link rows inserted.
    pub links_inserted: u64,

    /// Total inline foreign keys set.
    pub keys_updated: u64,

    /// Per-model counts keyed by uid.
    pub models: BTreeMap<String, ModelStats>,
}

impl MigrationResult {
    /// Serialize the result as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_type: String,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_dialect: String,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// One planned attribute, for the `models` report.
#[derive(Debug, Clone, Serialize)]
pub struct AttributePlan {
    pub attribute: String,
    pub relation: String,
    /// Table the link pass writes, if any.
    pub table: Option<String>,
}

/// One model of the registry, for the `models` report.
#[derive(Debug, Clone, Serialize)]
pub struct ModelPlan {
    pub uid: String,
    pub collection_name: String,
    pub global_type_name: String,
    pub scalar_attributes: usize,
    pub links: Vec<AttributePlan>,
}

impl Orchestrator {
    /// Create a new orchestrator connected to the configured stores.
    pub async fn new(config: Config) -> Result<Self> {
        let source = connect_source(&config).await?;
        let target = match connect_target(&config).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };
        Ok(Self::with_stores(config, source, target))
    }

    /// Create an orchestrator over already opened stores.
    pub fn with_stores(
        config: Config,
        source: Arc<dyn SourceStore>,
        target: Arc<dyn TargetStore>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    /// Load the model registry and classify every relation.
    pub async fn plan(&self) -> Result<(ModelRegistry, RelationPlan)> {
        let raw = self.source.load_model_definitions().await?;
        info!("Loaded {} raw model definitions", raw.len());

        let registry = ModelRegistry::build(&raw, &self.config.migration)?;
        let plan = RelationPlan::build(&registry, &self.config.migration)?;

        let mut summary: Vec<_> = plan.summary().into_iter().collect();
        summary.sort_by_key(|(relation, _)| relation.as_str());
        info!(
            "Registry holds {} models; relations: {}",
            registry.len(),
            summary
                .iter()
                .map(|(relation, count)| format!("{} {}", count, relation))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok((registry, plan))
    }

    /// The ordered registry with each model's link plan.
    pub async fn describe_models(&self) -> Result<Vec<ModelPlan>> {
        let (registry, plan) = self.plan().await?;
        Ok(registry
            .models()
            .iter()
            .map(|model| ModelPlan {
                uid: model.uid.clone(),
                collection_name: model.collection_name.clone(),
                global_type_name: model.global_type_name.clone(),
                scalar_attributes: model.attributes.values().filter(|a| a.is_scalar()).count(),
                links: plan
                    .links(&model.uid)
                    .iter()
                    .map(|link| AttributePlan {
                        attribute: link.attribute.clone(),
                        relation: link.relation.to_string(),
                        table: match &link.action {
                            LinkAction::Skip => None,
                            LinkAction::InlineKey => Some(model.collection_name.clone()),
                            LinkAction::Components { table, .. }
                            | LinkAction::Attachments { table, .. }
                            | LinkAction::Morph { table, .. } => Some(table.clone()),
                            LinkAction::Join(join) => Some(join.table.clone()),
                        },
                    })
                    .collect(),
            })
            .collect())
    }

    /// Ping both stores.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let started = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = started.elapsed().as_millis() as u64;

        Ok(HealthCheckResult {
            source_type: self.source.store_type().to_string(),
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.as_ref().err().map(ToString::to_string),
            target_dialect: self.target.dialect().to_string(),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.as_ref().err().map(ToString::to_string),
            healthy: source.is_ok() && target.is_ok(),
        })
    }

    /// Release both stores.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }

    /// Run the migration.
    pub async fn run(self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting migration run {} ({} -> {})",
            run_id,
            self.source.store_type(),
            self.target.dialect()
        );

        let outcome = self.migrate().await;
        self.close().await;

        let models = match outcome {
            Ok(models) => models,
            Err(e) => {
                error!("Migration run {} failed: {}", run_id, e);
                return Err(e);
            }
        };

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = MigrationResult {
            run_id,
            status: "completed".to_string(),
            duration_seconds: duration,
            started_at,
            completed_at,
            models_total: models.len(),
            rows_inserted: models.values().map(|s| s.rows).sum(),
            links_inserted: models.values().map(|s| s.links).sum(),
            keys_updated: models.values().map(|s| s.updates).sum(),
            models,
        };

        info!(
            "Migration {}: {} models, {} rows, {} links, {} keys in {:.1}s",
            result.status,
            result.models_total,
            result.rows_inserted,
            result.links_inserted,
            result.keys_updated,
            result.duration_seconds
        );
        Ok(result)
    }

    async fn migrate(&self) -> Result<BTreeMap<String, ModelStats>> {
        let migration = &self.config.migration;

        info!("Phase 1: Loading model registry");
        let (registry, plan) = self.plan().await?;

        info!("Phase 2: Preparing target ({})", self.target.dialect());
        self.target.drop_all_tables().await?;
        self.target.before_migration().await?;

        let source = self.source.as_ref();
        let target = self.target.as_ref();
        let mut stats: BTreeMap<String, ModelStats> = BTreeMap::new();

        info!("Phase 3: Materializing rows");
        let mut translator = IdentifierTranslator::new();
        let mut admins = if registry.get(registry.admin_uid()).is_some() {
            AdminUserIds::new()
        } else {
            if !migration.audit_user_models.is_empty() {
                warn!(
                    "Administrative model {} is not in the registry; audit-user fields are written as NULL",
                    registry.admin_uid()
                );
            }
            AdminUserIds::without_admin_model()
        };
        for model in registry.models() {
            let model_stats = materialize_rows(
                model,
                registry.is_admin(model),
                source,
                target,
                &mut translator,
                &mut admins,
                migration,
            )
            .await?;
            stats.insert(model.uid.clone(), model_stats);
        }
        info!("Assigned {} target ids", translator.len());

        info!("Phase 4: Materializing links");
        let mut link_ids = Sequences::new();
        for model in registry.models() {
            let link_stats = materialize_links(
                model,
                plan.links(&model.uid),
                &registry,
                source,
                target,
                &translator,
                &mut link_ids,
            )
            .await?;
            let entry = stats.entry(model.uid.clone()).or_default();
            entry.links = link_stats.links;
            entry.updates = link_stats.updates;
        }

        info!("Phase 5: Finalizing target");
        self.target.after_migration().await?;

        Ok(stats)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("source", &self.source.store_type())
            .field("target", &self.target.dialect())
            .finish()
    }
}

