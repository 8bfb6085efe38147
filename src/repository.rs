//! Case repository: owns the catalog snapshot and keeps it in step with the store.
//!
//! One load cycle:
//!   1) list the cases collection
//!   2) if empty, seed it from the bundled dataset (idempotent upserts)
//!   3) normalize every document, sort and reindex by display order
//!   4) recompute completions / average score from user records
//!   5) on any error in 1-4, serve the bundled dataset instead
//!
//! The fallback is held until the next explicit `load()`; nothing retries on its own.
//! Consumers read immutable `Arc<CatalogSnapshot>` values or subscribe to changes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::clock::ClockPort;
use crate::domain::{validate_catalog, Case};
use crate::editor::{CaseEditor, SavedCase};
use crate::error::{RepoError, StoreError};
use crate::export::{build_export, ExportDocument};
use crate::normalize::{to_canonical, to_document, NormalizeContext};
use crate::ordering::{self, Direction};
use crate::seeds::StaticDataset;
use crate::store::DocumentStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
  /// No load has completed yet.
  Unloaded,
  Remote,
  SeedThenRemote,
  StaticFallback,
}

impl LoadMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Unloaded => "unloaded",
      Self::Remote => "remote",
      Self::SeedThenRemote => "seed_then_remote",
      Self::StaticFallback => "static_fallback",
    }
  }

  /// Only a catalog read from the store may be written back to it.
  pub fn accepts_writes(&self) -> bool {
    matches!(self, Self::Remote | Self::SeedThenRemote)
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
  pub mode: LoadMode,
  pub cases: Vec<Case>,
  pub loaded_at: Option<DateTime<Utc>>,
  /// Non-fatal notice for the user (set in fallback mode).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notice: Option<String>,
}

impl CatalogSnapshot {
  fn unloaded() -> Self {
    Self { mode: LoadMode::Unloaded, cases: Vec::new(), loaded_at: None, notice: None }
  }

  pub fn get(&self, id: &str) -> Option<&Case> {
    self.cases.iter().find(|c| c.id == id)
  }

  fn with_cases(&self, cases: Vec<Case>) -> Self {
    Self { mode: self.mode, cases, loaded_at: self.loaded_at, notice: self.notice.clone() }
  }

  fn writable(&self) -> Result<(), RepoError> {
    if self.mode.accepts_writes() {
      Ok(())
    } else {
      Err(RepoError::Degraded(self.mode.as_str()))
    }
  }
}

/// External yes/no collaborator consulted before a case is deleted.
#[async_trait]
pub trait DeletionConfirmer: Send + Sync {
  async fn confirm(&self, case: &Case) -> bool;
}

/// Pre-answered confirmation, e.g. from a request parameter.
#[derive(Clone, Copy, Debug)]
pub struct Confirmation(pub bool);

#[async_trait]
impl DeletionConfirmer for Confirmation {
  async fn confirm(&self, _case: &Case) -> bool {
    self.0
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
  Declined,
  Deleted { reindexed: usize },
}

/// `{ completedCases, totalPoints }` as read from the users collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserRecord {
  pub completed_cases: Vec<String>,
  pub total_points: f64,
}

impl UserRecord {
  /// Lenient read: missing or mistyped fields count as empty / zero.
  pub fn from_document(doc: &Value) -> Self {
    let completed_cases = doc
      .get("completedCases")
      .and_then(Value::as_array)
      .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
      .unwrap_or_default();
    let total_points = doc
      .get("totalPoints")
      .and_then(Value::as_f64)
      .filter(|p| p.is_finite())
      .unwrap_or(0.0);
    Self { completed_cases, total_points }
  }
}

/// `(completions, averageScore)` for one case. Zero matches give `(0, 0.0)`.
pub fn case_statistics(case_id: &str, users: &[UserRecord]) -> (u32, f64) {
  let (count, total) = users
    .iter()
    .filter(|u| u.completed_cases.iter().any(|c| c == case_id))
    .fold((0u32, 0.0f64), |(n, sum), u| (n.saturating_add(1), sum + u.total_points));
  if count == 0 {
    (0, 0.0)
  } else {
    (count, total / f64::from(count))
  }
}

#[derive(Clone, Debug)]
pub struct Collections {
  pub cases: String,
  pub users: String,
}

impl Default for Collections {
  fn default() -> Self {
    Self { cases: "cases".into(), users: "users".into() }
  }
}

pub struct CaseRepository {
  store: Arc<dyn DocumentStore>,
  clock: Arc<dyn ClockPort>,
  dataset: StaticDataset,
  collections: Collections,
  snapshot: watch::Sender<Arc<CatalogSnapshot>>,
  // Serializes mutating operations so snapshot read-modify-publish is atomic.
  writes: Mutex<()>,
}

impl CaseRepository {
  pub fn new(
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn ClockPort>,
    dataset: StaticDataset,
    collections: Collections,
  ) -> Self {
    let (snapshot, _) = watch::channel(Arc::new(CatalogSnapshot::unloaded()));
    Self { store, clock, dataset, collections, snapshot, writes: Mutex::new(()) }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
    self.snapshot.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<Arc<CatalogSnapshot>> {
    self.snapshot.subscribe()
  }

  pub fn get(&self, id: &str) -> Option<Case> {
    self.snapshot().get(id).cloned()
  }

  pub fn editor_for(&self, id: &str) -> Option<CaseEditor> {
    self.get(id).map(CaseEditor::open)
  }

  pub fn new_case_editor(&self) -> CaseEditor {
    CaseEditor::create(&self.snapshot().cases, self.now())
  }

  pub fn export(&self) -> ExportDocument {
    build_export(&self.snapshot().cases, self.now())
  }

  fn publish(&self, snapshot: CatalogSnapshot) -> Arc<CatalogSnapshot> {
    let snapshot = Arc::new(snapshot);
    self.snapshot.send_replace(snapshot.clone());
    snapshot
  }

  /// Runs one load cycle and publishes the result. Never fails: store errors
  /// degrade to the bundled dataset.
  #[instrument(level = "info", skip(self))]
  pub async fn load(&self) -> Arc<CatalogSnapshot> {
    let _guard = self.writes.lock().await;
    let now = self.now();
    let snapshot = match self.load_remote(now).await {
      Ok((mode, cases)) => {
        info!(target: "catalog", ?mode, count = cases.len(), "Catalog loaded from store");
        CatalogSnapshot { mode, cases, loaded_at: Some(now), notice: None }
      }
      Err(e) => {
        warn!(target: "catalog", error = %e, "Store unavailable; serving bundled static dataset");
        CatalogSnapshot {
          mode: LoadMode::StaticFallback,
          cases: self.static_fallback(now),
          loaded_at: Some(now),
          notice: Some(format!("Showing bundled cases; the case store could not be reached ({e}).")),
        }
      }
    };
    self.publish(snapshot)
  }

  async fn load_remote(&self, now: DateTime<Utc>) -> Result<(LoadMode, Vec<Case>), StoreError> {
    let mut docs = self.store.list(&self.collections.cases).await?;
    let mode = if docs.is_empty() {
      self.seed(now).await?;
      docs = self.store.list(&self.collections.cases).await?;
      LoadMode::SeedThenRemote
    } else {
      LoadMode::Remote
    };

    let mut cases = self.normalize_all(&docs, now);
    ordering::sort_by_order(&mut cases);
    let moved = ordering::reindex(&mut cases);
    if moved > 0 {
      warn!(target: "catalog", moved, "Stored display orders were not contiguous; reindexed in memory");
    }
    for violation in validate_catalog(&cases) {
      warn!(target: "catalog", %violation, "Catalog invariant violated");
    }

    self.enrich(&mut cases).await?;
    Ok((mode, cases))
  }

  fn normalize_all(&self, docs: &[Value], now: DateTime<Utc>) -> Vec<Case> {
    docs
      .iter()
      .enumerate()
      .map(|(i, doc)| {
        let out = to_canonical(doc, &NormalizeContext::new(now, i));
        for repair in &out.repairs {
          debug!(target: "catalog", case_id = %out.case.id, %repair, "Normalizer repair");
        }
        if !out.repairs.is_empty() {
          warn!(target: "catalog", case_id = %out.case.id, repairs = out.repairs.len(), "Stored case needed repairs");
        }
        out.case
      })
      .collect()
  }

  /// Upserts the bundled cases in seed order. Safe to repeat.
  #[instrument(level = "info", skip(self))]
  pub async fn seed(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let mut seeded = 0usize;
    for id in self.dataset.seed_order() {
      let Some(doc) = self.dataset.get(id) else {
        debug!(target: "catalog", %id, "Seed id not in bundled dataset; skipped");
        continue;
      };
      let mut case = to_canonical(doc, &NormalizeContext::new(now, seeded)).case;
      case.display_order = u32::try_from(seeded + 1).unwrap_or(u32::MAX);
      case.created_at = now;
      case.updated_at = now;
      self.store.upsert(&self.collections.cases, &case.id, to_document(&case)).await?;
      seeded += 1;
    }
    info!(target: "catalog", seeded, "Seeded case collection from bundled dataset");
    Ok(seeded)
  }

  async fn enrich(&self, cases: &mut [Case]) -> Result<(), StoreError> {
    let users: Vec<UserRecord> = self
      .store
      .list(&self.collections.users)
      .await?
      .iter()
      .map(UserRecord::from_document)
      .collect();
    for case in cases.iter_mut() {
      let (completions, average_score) = case_statistics(&case.id, &users);
      case.completions = completions;
      case.average_score = average_score;
    }
    debug!(target: "catalog", users = users.len(), "Recomputed case statistics");
    Ok(())
  }

  fn static_fallback(&self, now: DateTime<Utc>) -> Vec<Case> {
    let mut cases = self.dataset.cases(now);
    for c in &mut cases {
      c.is_active = true;
      c.completions = 0;
      c.average_score = 0.0;
      c.created_at = now;
      c.updated_at = now;
    }
    cases
  }

  /// Persists a validated case (create or replace) and publishes the new catalog.
  #[instrument(level = "info", skip(self, saved), fields(case_id = %saved.case.id))]
  pub async fn save(&self, saved: SavedCase) -> Result<Case, RepoError> {
    let _guard = self.writes.lock().await;
    let SavedCase { case: edited, document, .. } = saved;
    let current = self.snapshot();
    current.writable()?;
    let mut cases = current.cases.clone();

    let mut case = edited.clone();
    match cases.iter().position(|c| c.id == case.id) {
      Some(idx) => {
        // Statistics, catalog position and creation stamp belong to the catalog, not the editor.
        case.completions = cases[idx].completions;
        case.average_score = cases[idx].average_score;
        case.display_order = cases[idx].display_order;
        case.created_at = cases[idx].created_at;
        cases[idx] = case.clone();
      }
      None => {
        case.display_order = ordering::append(&mut cases, case.clone());
      }
    }
    let document = if case == edited { document } else { to_document(&case) };

    self.store.upsert(&self.collections.cases, &case.id, document).await?;
    info!(target: "catalog", case_id = %case.id, display_order = case.display_order, "Case saved");
    self.publish(current.with_cases(cases));
    Ok(case)
  }

  /// Deletes a case after an affirmative confirmation and closes the gap it leaves.
  #[instrument(level = "info", skip(self, confirmer))]
  pub async fn delete(&self, id: &str, confirmer: &dyn DeletionConfirmer) -> Result<DeleteOutcome, RepoError> {
    let _guard = self.writes.lock().await;
    let current = self.snapshot();
    current.writable()?;
    let case = current.get(id).ok_or_else(|| RepoError::NotFound(id.to_string()))?;
    if !confirmer.confirm(case).await {
      info!(target: "catalog", case_id = %id, "Deletion declined");
      return Ok(DeleteOutcome::Declined);
    }

    self.store.delete(&self.collections.cases, id).await?;
    let mut cases = current.cases.clone();
    ordering::remove(&mut cases, id);
    let reindexed = self.reindex_and_persist(&mut cases).await?;
    info!(target: "catalog", case_id = %id, reindexed, "Case deleted");
    self.publish(current.with_cases(cases));
    Ok(DeleteOutcome::Deleted { reindexed })
  }

  /// Moves a case one slot in the catalog. Boundary moves and unknown ids are no-ops.
  #[instrument(level = "info", skip(self))]
  pub async fn move_case(&self, id: &str, direction: Direction) -> Result<bool, RepoError> {
    let _guard = self.writes.lock().await;
    let current = self.snapshot();
    current.writable()?;
    let mut cases = current.cases.clone();
    if !ordering::move_item(&mut cases, id, direction) {
      return Ok(false);
    }
    for case in &cases {
      if current.get(&case.id).map(|c| c.display_order) != Some(case.display_order) {
        self.store.upsert(&self.collections.cases, &case.id, to_document(case)).await?;
      }
    }
    self.publish(current.with_cases(cases));
    Ok(true)
  }

  /// Renumbers `cases` and upserts every entry whose display order changed.
  async fn reindex_and_persist(&self, cases: &mut [Case]) -> Result<usize, StoreError> {
    let before: Vec<u32> = cases.iter().map(|c| c.display_order).collect();
    ordering::reindex(cases);
    let mut changed = 0;
    for (case, old) in cases.iter().zip(before) {
      if case.display_order != old {
        self.store.upsert(&self.collections.cases, &case.id, to_document(case)).await?;
        changed += 1;
      }
    }
    Ok(changed)
  }
}
