//! Document store port and its adapters.
//!
//! The engine only needs three primitives per collection: list everything,
//! upsert by id (create-or-replace), delete by id. `MemoryStore` backs tests
//! and offline runs; `RestStore` talks to a JSON document API over HTTP.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::StoreConfig;
use crate::error::StoreError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
  /// Every document of `collection`, in store order.
  async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError>;
  /// Create-or-replace the document keyed by `id`.
  async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;
  /// Remove the document keyed by `id`. Deleting a missing id is not an error.
  async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

/// In-process store: one ordered map per collection.
#[derive(Default)]
pub struct MemoryStore {
  collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Pre-populates `collection`; documents without a string `id` get their position as key.
  pub fn with_documents(mut self, collection: &str, docs: Vec<Value>) -> Self {
    let entries = self.collections.get_mut().entry(collection.to_string()).or_default();
    for (i, doc) in docs.into_iter().enumerate() {
      let key = doc.get("id").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| format!("{i:06}"));
      entries.insert(key, doc);
    }
    self
  }

  pub async fn len(&self, collection: &str) -> usize {
    self.collections.read().await.get(collection).map_or(0, BTreeMap::len)
  }

  pub async fn get(&self, collection: &str, id: &str) -> Option<Value> {
    self.collections.read().await.get(collection).and_then(|c| c.get(id).cloned())
  }
}

#[async_trait]
impl DocumentStore for MemoryStore {
  async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
    let guard = self.collections.read().await;
    Ok(guard.get(collection).map(|c| c.values().cloned().collect()).unwrap_or_default())
  }

  async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
    let mut guard = self.collections.write().await;
    guard.entry(collection.to_string()).or_default().insert(id.to_string(), doc);
    Ok(())
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
    let mut guard = self.collections.write().await;
    if let Some(c) = guard.get_mut(collection) {
      c.remove(id);
    }
    Ok(())
  }
}

/// HTTP client for a JSON document API:
///   GET    {base}/{collection}       -> `[doc, ...]` or `{"documents": [doc, ...]}`
///   PUT    {base}/{collection}/{id}  <- doc
///   DELETE {base}/{collection}/{id}
#[derive(Clone)]
pub struct RestStore {
  client: reqwest::Client,
  pub base_url: String,
  token: Option<String>,
}

impl RestStore {
  pub fn from_config(cfg: &StoreConfig) -> Result<Self, StoreError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()
      .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let token = std::env::var(&cfg.token_env).ok().filter(|t| !t.is_empty());
    info!(target: "store", base_url = %cfg.base_url, auth = token.is_some(), "REST document store configured");
    Ok(Self { client, base_url: cfg.base_url.trim_end_matches('/').to_string(), token })
  }

  fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
    let mut req = self
      .client
      .request(method, format!("{}/{}", self.base_url, path))
      .header(USER_AGENT, "casefile-backend/0.1")
      .header(CONTENT_TYPE, "application/json");
    if let Some(token) = &self.token {
      req = req.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    req
  }

  async fn check(res: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if res.status().is_success() {
      return Ok(res);
    }
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    Err(StoreError::Status { status, body })
  }
}

/// Accepts either a bare array or an envelope with a `documents` array.
fn documents_from_body(body: Value) -> Result<Vec<Value>, StoreError> {
  match body {
    Value::Array(docs) => Ok(docs),
    Value::Object(mut obj) => match obj.remove("documents") {
      Some(Value::Array(docs)) => Ok(docs),
      _ => Err(StoreError::Decode("expected an array or a `documents` array".into())),
    },
    _ => Err(StoreError::Decode("expected an array or a `documents` array".into())),
  }
}

#[async_trait]
impl DocumentStore for RestStore {
  #[instrument(level = "debug", skip(self))]
  async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
    let res = self
      .request(reqwest::Method::GET, collection)
      .send()
      .await
      .map_err(|e| StoreError::Transport(e.to_string()))?;
    let body: Value = Self::check(res).await?.json().await.map_err(|e| StoreError::Decode(e.to_string()))?;
    let docs = documents_from_body(body)?;
    debug!(target: "store", %collection, count = docs.len(), "Listed documents");
    Ok(docs)
  }

  #[instrument(level = "debug", skip(self, doc))]
  async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
    let res = self
      .request(reqwest::Method::PUT, &format!("{collection}/{id}"))
      .json(&doc)
      .send()
      .await
      .map_err(|e| StoreError::Transport(e.to_string()))?;
    Self::check(res).await?;
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
    let res = self
      .request(reqwest::Method::DELETE, &format!("{collection}/{id}"))
      .send()
      .await
      .map_err(|e| StoreError::Transport(e.to_string()))?;
    if res.status() == StatusCode::NOT_FOUND {
      return Ok(());
    }
    Self::check(res).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn memory_upsert_replaces_by_id() {
    let store = MemoryStore::new();
    store.upsert("cases", "a", json!({ "id": "a", "title": "one" })).await.unwrap();
    store.upsert("cases", "a", json!({ "id": "a", "title": "two" })).await.unwrap();
    assert_eq!(store.len("cases").await, 1);
    assert_eq!(store.get("cases", "a").await.unwrap()["title"], "two");
  }

  #[tokio::test]
  async fn memory_delete_is_idempotent() {
    let store = MemoryStore::new().with_documents("cases", vec![json!({ "id": "a" })]);
    store.delete("cases", "a").await.unwrap();
    store.delete("cases", "a").await.unwrap();
    store.delete("nothing", "a").await.unwrap();
    assert!(store.list("cases").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn memory_collections_are_isolated() {
    let store = MemoryStore::new()
      .with_documents("users", vec![json!({ "completedCases": [] }), json!({ "completedCases": ["a"] })]);
    assert_eq!(store.list("users").await.unwrap().len(), 2);
    assert!(store.list("cases").await.unwrap().is_empty());
  }

  #[test]
  fn rest_list_accepts_both_body_shapes() {
    assert_eq!(documents_from_body(json!([{ "id": "a" }])).unwrap().len(), 1);
    assert_eq!(documents_from_body(json!({ "documents": [{ "id": "a" }, { "id": "b" }] })).unwrap().len(), 2);
    assert!(matches!(documents_from_body(json!({ "rows": [] })), Err(StoreError::Decode(_))));
  }
}
