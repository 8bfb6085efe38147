//! Application state: configuration and the case repository.
//!
//! This module wires the configured document store, the system clock and the
//! bundled dataset into one `CaseRepository` shared by all handlers.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use serde_json::Value;

use crate::clock::SystemClock;
use crate::config::{AppConfig, StoreKind};
use crate::domain::Case;
use crate::editor::{CaseEditor, EditCommand};
use crate::error::{ApiError, StoreError};
use crate::normalize::{to_canonical, NormalizeContext};
use crate::repository::{CaseRepository, Collections};
use crate::seeds::StaticDataset;
use crate::store::{DocumentStore, MemoryStore, RestStore};

pub struct AppState {
    pub repo: CaseRepository,
    pub config: AppConfig,
}

impl AppState {
    /// Build state from config: pick the store adapter and the seed order.
    #[instrument(level = "info", skip_all)]
    pub fn from_config(config: AppConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn DocumentStore> = match config.store.kind {
            StoreKind::Memory => {
                info!(target: "casefile_backend", "Using in-memory document store (contents are not persisted)");
                Arc::new(MemoryStore::new())
            }
            StoreKind::Rest => Arc::new(RestStore::from_config(&config.store)?),
        };

        let mut dataset = StaticDataset::bundled();
        if let Some(order) = &config.catalog.seed_order {
            info!(target: "casefile_backend", count = order.len(), "Using configured seed order");
            dataset = dataset.with_seed_order(order.clone());
        }
        info!(target: "casefile_backend", bundled = dataset.len(), "Bundled static dataset ready");

        let collections = Collections {
            cases: config.store.cases_collection.clone(),
            users: config.store.users_collection.clone(),
        };
        let repo = CaseRepository::new(store, Arc::new(SystemClock), dataset, collections);
        Ok(Self { repo, config })
    }

    pub fn with_repository(repo: CaseRepository) -> Self {
        Self { repo, config: AppConfig::default() }
    }

    /// Runs `commands` against `editor` in order, then validates and persists the draft.
    /// Returns the stored case and the ids of entries the commands created.
    #[instrument(level = "info", skip(self, editor, commands), fields(case_id = %editor.draft().id, commands = commands.len()))]
    pub async fn apply_and_save(
        &self,
        mut editor: CaseEditor,
        commands: Vec<EditCommand>,
    ) -> Result<(Case, Vec<String>), ApiError> {
        let mut created = Vec::new();
        for cmd in commands {
            if let Some(id) = editor.apply(cmd)?.created {
                created.push(id);
            }
        }
        let saved = editor.save(self.repo.now())?;
        let case = self.repo.save(saved).await?;
        Ok((case, created))
    }

    /// Replaces case `id` with a raw document in any accepted shape.
    /// The path id wins over whatever id the document carries.
    #[instrument(level = "info", skip(self, raw))]
    pub async fn replace_from_document(&self, id: &str, raw: &Value) -> Result<Case, ApiError> {
        if !raw.is_object() {
            return Err(ApiError::BadRequest("case document must be a JSON object".into()));
        }
        let normalized = to_canonical(raw, &NormalizeContext::new(self.repo.now(), 0));
        for repair in &normalized.repairs {
            debug!(target: "editor", case_id = %id, %repair, "Repaired incoming document");
        }
        let mut case = normalized.case;
        case.id = id.to_string();
        let saved = CaseEditor::open(case).save(self.repo.now())?;
        Ok(self.repo.save(saved).await?)
    }
}
