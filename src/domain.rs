//! Entity model: cases, cinematic slides, missions and hint steps.
//!
//! A `Case` carries one canonical body. Legacy single-challenge fields live in
//! `legacy`, the nested detective-mission tree lives in `rich`; either or both
//! may be present. All other shapes are derived by `crate::normalize`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MISSION_POINTS: u32 = 250;
pub const DEFAULT_CLUE_POINTS: u32 = 1000;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Difficulty {
  #[default]
  Beginner,
  Intermediate,
  Advanced,
}

impl Difficulty {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "beginner" => Some(Self::Beginner),
      "intermediate" => Some(Self::Intermediate),
      "advanced" => Some(Self::Advanced),
      _ => None,
    }
  }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MissionType {
  #[default]
  CodeFix,
  Investigation,
  Analysis,
  Evidence,
  Story,
}

impl MissionType {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
      "code-fix" | "codefix" => Some(Self::CodeFix),
      "investigation" => Some(Self::Investigation),
      "analysis" => Some(Self::Analysis),
      "evidence" => Some(Self::Evidence),
      "story" => Some(Self::Story),
      _ => None,
    }
  }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlideType {
  #[default]
  Story,
  Character,
  Location,
  Evidence,
  Choice,
}

impl SlideType {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "story" => Some(Self::Story),
      "character" => Some(Self::Character),
      "location" => Some(Self::Location),
      "evidence" => Some(Self::Evidence),
      "choice" => Some(Self::Choice),
      _ => None,
    }
  }
}

/// One rung of a hint chain.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HintStep {
  pub id: String,
  #[serde(default)] pub condition: String,
  #[serde(default)] pub hint: String,
  #[serde(default)] pub points: u32,
}

impl HintStep {
  pub fn new(id: impl Into<String>) -> Self {
    Self { id: id.into(), ..Default::default() }
  }
}

/// Answer option for story missions and choice slides.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
  pub id: String,
  #[serde(default)] pub text: String,
  #[serde(default)] pub is_correct: bool,
  #[serde(default)] pub feedback: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SlideContent {
  #[serde(default)] pub text: String,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub speaker: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub location: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub background_image: Option<String>,
  #[serde(default)] pub auto_advance: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")] pub duration_ms: Option<u64>,
  #[serde(default)] pub choices: Vec<Choice>,
}

/// One narrative beat shown before or between missions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CinematicSlide {
  pub id: String,
  #[serde(rename = "type", default)] pub kind: SlideType,
  pub order: u32,
  #[serde(default)] pub content: SlideContent,
}

impl CinematicSlide {
  pub fn new(id: impl Into<String>, order: u32) -> Self {
    Self { id: id.into(), kind: SlideType::Story, order, content: SlideContent::default() }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MissionContent {
  #[serde(default)] pub initial_code: String,
  #[serde(default)] pub initial_css: String,
  #[serde(default)] pub target_code: String,
  #[serde(default)] pub target_css: String,
  #[serde(default)] pub choices: Vec<Choice>,
  #[serde(default)] pub hints: Vec<HintStep>,
  pub points: u32,
  #[serde(default)] pub clue_revealed: String,
  #[serde(default)] pub clue_unlock_condition: String,
}

impl Default for MissionContent {
  fn default() -> Self {
    Self {
      initial_code: String::new(),
      initial_css: String::new(),
      target_code: String::new(),
      target_css: String::new(),
      choices: Vec::new(),
      hints: Vec::new(),
      points: DEFAULT_MISSION_POINTS,
      clue_revealed: String::new(),
      clue_unlock_condition: String::new(),
    }
  }
}

/// One coding or investigation step within a case.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
  pub id: String,
  #[serde(default)] pub title: String,
  #[serde(default)] pub description: String,
  #[serde(rename = "type", default)] pub kind: MissionType,
  pub order: u32,
  #[serde(default)] pub content: MissionContent,
}

impl Mission {
  pub fn new(id: impl Into<String>, order: u32) -> Self {
    Self {
      id: id.into(),
      title: "New Mission".into(),
      description: String::new(),
      kind: MissionType::CodeFix,
      order,
      content: MissionContent::default(),
    }
  }
}

/// Flat single-challenge body used by first-generation cases.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBody {
  #[serde(default)] pub initial_html: String,
  #[serde(default)] pub initial_css: String,
  #[serde(default)] pub target_html: String,
  #[serde(default)] pub target_css: String,
  pub hints: Vec<String>,
}

impl Default for LegacyBody {
  fn default() -> Self {
    Self {
      initial_html: String::new(),
      initial_css: String::new(),
      target_html: String::new(),
      target_css: String::new(),
      hints: vec![String::new()],
    }
  }
}

/// Nested detective-mission body.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RichBody {
  #[serde(default)] pub cinematic_slides: Vec<CinematicSlide>,
  #[serde(default)] pub missions: Vec<Mission>,
}

/// A complete learning unit in canonical form.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Case {
  pub id: String,
  pub title: String,
  pub description: String,
  pub difficulty: Difficulty,
  pub duration: String,
  pub clue_points: u32,
  pub is_detective_mission: bool,
  pub story: String,
  pub objective: String,
  pub final_resolution: String,
  pub display_order: u32,
  pub is_active: bool,
  pub completions: u32,
  pub average_score: f64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(rename = "legacyBody", default, skip_serializing_if = "Option::is_none")]
  pub legacy: Option<LegacyBody>,
  #[serde(rename = "richBody", default, skip_serializing_if = "Option::is_none")]
  pub rich: Option<RichBody>,
}

impl Case {
  /// Blank single-challenge case appended at `display_order`.
  pub fn new(id: impl Into<String>, display_order: u32, now: DateTime<Utc>) -> Self {
    Self {
      id: id.into(),
      title: String::new(),
      description: String::new(),
      difficulty: Difficulty::Beginner,
      duration: String::new(),
      clue_points: DEFAULT_CLUE_POINTS,
      is_detective_mission: false,
      story: String::new(),
      objective: String::new(),
      final_resolution: String::new(),
      display_order,
      is_active: true,
      completions: 0,
      average_score: 0.0,
      created_at: now,
      updated_at: now,
      legacy: Some(LegacyBody::default()),
      rich: None,
    }
  }

  /// Blank detective mission with an empty nested body.
  pub fn new_detective(id: impl Into<String>, display_order: u32, now: DateTime<Utc>) -> Self {
    Self {
      is_detective_mission: true,
      legacy: None,
      rich: Some(RichBody::default()),
      ..Self::new(id, display_order, now)
    }
  }

  pub fn missions(&self) -> &[Mission] {
    self.rich.as_ref().map(|r| r.missions.as_slice()).unwrap_or(&[])
  }

  pub fn slides(&self) -> &[CinematicSlide] {
    self.rich.as_ref().map(|r| r.cinematic_slides.as_slice()).unwrap_or(&[])
  }

  pub fn missions_mut(&mut self) -> &mut Vec<Mission> {
    &mut self.rich.get_or_insert_with(RichBody::default).missions
  }

  pub fn slides_mut(&mut self) -> &mut Vec<CinematicSlide> {
    &mut self.rich.get_or_insert_with(RichBody::default).cinematic_slides
  }
}

/// A violated entity invariant, as reported by [`validate`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
  #[error("{collection} entry has a blank id")]
  BlankId { collection: &'static str },
  #[error("{collection} id `{id}` is not unique")]
  DuplicateId { collection: &'static str, id: String },
  #[error("{collection} order is not contiguous from 1")]
  NonContiguousOrder { collection: &'static str },
}

/// True when `orders` is exactly a permutation of `1..=n`.
pub fn orders_contiguous(orders: impl IntoIterator<Item = u32>) -> bool {
  let mut orders: Vec<u32> = orders.into_iter().collect();
  orders.sort_unstable();
  orders.iter().enumerate().all(|(i, o)| *o as usize == i + 1)
}

fn check_ids<'a>(collection: &'static str, ids: impl Iterator<Item = &'a str>, out: &mut Vec<Violation>) {
  let mut seen = std::collections::HashSet::new();
  for id in ids {
    if id.trim().is_empty() {
      out.push(Violation::BlankId { collection });
    } else if !seen.insert(id) {
      out.push(Violation::DuplicateId { collection, id: id.to_string() });
    }
  }
}

/// Every invariant the case violates, in a stable order.
pub fn validate(case: &Case) -> Vec<Violation> {
  let mut out = Vec::new();
  if case.id.trim().is_empty() {
    out.push(Violation::BlankId { collection: "case" });
  }

  check_ids("missions", case.missions().iter().map(|m| m.id.as_str()), &mut out);
  if !orders_contiguous(case.missions().iter().map(|m| m.order)) {
    out.push(Violation::NonContiguousOrder { collection: "missions" });
  }

  check_ids("cinematicSlides", case.slides().iter().map(|s| s.id.as_str()), &mut out);
  if !orders_contiguous(case.slides().iter().map(|s| s.order)) {
    out.push(Violation::NonContiguousOrder { collection: "cinematicSlides" });
  }

  for m in case.missions() {
    check_ids("hints", m.content.hints.iter().map(|h| h.id.as_str()), &mut out);
  }
  out
}

/// Catalog-level invariants: unique case ids and contiguous display order.
pub fn validate_catalog(cases: &[Case]) -> Vec<Violation> {
  let mut out = Vec::new();
  check_ids("cases", cases.iter().map(|c| c.id.as_str()), &mut out);
  if !orders_contiguous(cases.iter().map(|c| c.display_order)) {
    out.push(Violation::NonContiguousOrder { collection: "cases" });
  }
  out
}
