//! Summary export of the catalog. Story and mission bodies are left out.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Case, Difficulty};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedCase {
  pub id: String,
  pub title: String,
  pub description: String,
  pub difficulty: Difficulty,
  pub is_active: bool,
  pub completions: u32,
  pub average_score: f64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
  pub export_date: DateTime<Utc>,
  pub total_cases: usize,
  pub cases: Vec<ExportedCase>,
}

pub fn build_export(cases: &[Case], now: DateTime<Utc>) -> ExportDocument {
  ExportDocument {
    export_date: now,
    total_cases: cases.len(),
    cases: cases
      .iter()
      .map(|c| ExportedCase {
        id: c.id.clone(),
        title: c.title.clone(),
        description: c.description.clone(),
        difficulty: c.difficulty,
        is_active: c.is_active,
        completions: c.completions,
        average_score: c.average_score,
        created_at: c.created_at,
        updated_at: c.updated_at,
      })
      .collect(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds::StaticDataset;

  #[test]
  fn export_is_a_summary_projection() {
    let now = DateTime::parse_from_rfc3339("2026-05-05T05:05:05Z").unwrap().with_timezone(&Utc);
    let cases = StaticDataset::bundled().cases(now);
    let doc = serde_json::to_value(build_export(&cases, now)).unwrap();

    assert_eq!(doc["totalCases"], 3);
    assert_eq!(doc["exportDate"], "2026-05-05T05:05:05Z");
    let first = doc["cases"][0].as_object().unwrap();
    let mut keys: Vec<_> = first.keys().cloned().collect();
    keys.sort();
    assert_eq!(
      keys,
      vec!["averageScore", "completions", "createdAt", "description", "difficulty", "id", "isActive", "title", "updatedAt"]
    );
  }
}
