//! Schema normalization.
//!
//! Three shapes of a case exist in the wild:
//!   - loosely-typed documents (older app versions, hand-edited store entries),
//!   - the canonical [`Case`],
//!   - the flat [`LegacyCase`] projection read by older clients.
//!
//! [`to_canonical`] accepts anything and never fails; every default it had to
//! substitute is reported as a [`Repair`]. [`to_legacy`] is lossy by contract
//! (no counterpart for unlock conditions, choices, auto-advance). [`to_document`]
//! is the stored form: canonical fields plus legacy mirrors, so reading it back
//! loses nothing.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::{
  Case, Choice, CinematicSlide, Difficulty, HintStep, LegacyBody, Mission, MissionContent, MissionType, RichBody,
  SlideContent, SlideType, DEFAULT_CLUE_POINTS, DEFAULT_MISSION_POINTS,
};
use crate::ordering::{self, Ordered};

const LEGACY_KEYS: [&str; 5] = ["initialHtml", "initialCss", "targetHtml", "targetCss", "hints"];

/// Inputs that make synthesized values deterministic for one document.
#[derive(Clone, Copy, Debug)]
pub struct NormalizeContext {
  pub now: DateTime<Utc>,
  /// Position of the document in the batch being normalized.
  pub index: usize,
}

impl NormalizeContext {
  pub fn new(now: DateTime<Utc>, index: usize) -> Self {
    Self { now, index }
  }

  fn stamp(&self) -> i64 {
    self.now.timestamp_millis()
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepairKind {
  /// The entry had no id; one was generated.
  SynthesizedId { id: String },
  /// The field was missing or unreadable; the entity default was used.
  Defaulted,
  /// The enum spelling was not recognised; the default variant was used.
  UnknownVariant { value: String },
  /// A negative number was clamped to zero.
  Clamped { value: i64 },
  /// Incoming order values had gaps or duplicates and were renumbered.
  Reindexed,
  /// An element that is neither a string nor an object was skipped.
  Dropped,
}

/// One substitution applied while normalizing a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Repair {
  pub path: String,
  #[serde(flatten)]
  pub kind: RepairKind,
}

impl Repair {
  fn new(path: impl Into<String>, kind: RepairKind) -> Self {
    Self { path: path.into(), kind }
  }
}

impl fmt::Display for Repair {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      RepairKind::SynthesizedId { id } => write!(f, "{}: synthesized id {}", self.path, id),
      RepairKind::Defaulted => write!(f, "{}: defaulted", self.path),
      RepairKind::UnknownVariant { value } => write!(f, "{}: unknown value {:?}", self.path, value),
      RepairKind::Clamped { value } => write!(f, "{}: clamped {} to 0", self.path, value),
      RepairKind::Reindexed => write!(f, "{}: reindexed", self.path),
      RepairKind::Dropped => write!(f, "{}: dropped", self.path),
    }
  }
}

/// A canonical case together with the defaults applied to produce it.
#[derive(Clone, Debug)]
pub struct Normalized {
  pub case: Case,
  pub repairs: Vec<Repair>,
}

//
// Field probing
//

/// First non-empty string, trying each key in priority order across `sources`.
fn text<'a>(sources: &[&'a Value], keys: &[&str]) -> Option<&'a str> {
  keys.iter().find_map(|k| {
    sources
      .iter()
      .find_map(|s| s.get(*k).and_then(Value::as_str).filter(|v| !v.is_empty()))
  })
}

fn owned_text(sources: &[&Value], keys: &[&str]) -> String {
  text(sources, keys).unwrap_or_default().to_string()
}

fn text_or_number(sources: &[&Value], keys: &[&str]) -> String {
  keys
    .iter()
    .find_map(|k| {
      sources.iter().find_map(|s| match s.get(*k)? {
        Value::String(v) if !v.is_empty() => Some(v.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
      })
    })
    .unwrap_or_default()
}

fn integer(sources: &[&Value], keys: &[&str]) -> Option<i64> {
  keys.iter().find_map(|k| {
    sources.iter().find_map(|s| match s.get(*k)? {
      Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
      Value::String(v) => v.trim().parse().ok(),
      _ => None,
    })
  })
}

fn flag(sources: &[&Value], keys: &[&str]) -> Option<bool> {
  keys.iter().find_map(|k| {
    sources.iter().find_map(|s| match s.get(*k)? {
      Value::Bool(b) => Some(*b),
      Value::String(v) => v.trim().parse().ok(),
      _ => None,
    })
  })
}

/// First non-empty array; an empty array is returned only if nothing better exists.
fn array<'a>(sources: &[&'a Value], keys: &[&str]) -> Option<&'a Vec<Value>> {
  let mut fallback = None;
  for k in keys {
    for s in sources {
      if let Some(Value::Array(list)) = s.get(*k) {
        if !list.is_empty() {
          return Some(list);
        }
        fallback.get_or_insert(list);
      }
    }
  }
  fallback
}

fn non_negative(value: Option<i64>, path: &str, repairs: &mut Vec<Repair>) -> Option<u32> {
  match value? {
    n if n >= 0 => Some(u32::try_from(n).unwrap_or(u32::MAX)),
    n => {
      repairs.push(Repair::new(path, RepairKind::Clamped { value: n }));
      Some(0)
    }
  }
}

fn points_or_default(value: Option<i64>, default: u32, path: &str, repairs: &mut Vec<Repair>) -> u32 {
  non_negative(value, path, repairs).unwrap_or_else(|| {
    repairs.push(Repair::new(path, RepairKind::Defaulted));
    default
  })
}

fn variant<T: Default>(raw: Option<&str>, parse: fn(&str) -> Option<T>, path: &str, repairs: &mut Vec<Repair>) -> T {
  match raw {
    Some(value) => parse(value).unwrap_or_else(|| {
      repairs.push(Repair::new(path, RepairKind::UnknownVariant { value: value.to_string() }));
      T::default()
    }),
    None => {
      repairs.push(Repair::new(path, RepairKind::Defaulted));
      T::default()
    }
  }
}

fn id_or(sources: &[&Value], path: &str, repairs: &mut Vec<Repair>, synthesize: impl FnOnce() -> String) -> String {
  match text(sources, &["id"]) {
    Some(id) => id.to_string(),
    None => {
      let id = synthesize();
      repairs.push(Repair::new(format!("{path}.id"), RepairKind::SynthesizedId { id: id.clone() }));
      id
    }
  }
}

fn position_order(index: usize) -> u32 {
  u32::try_from(index + 1).unwrap_or(u32::MAX)
}

fn incoming_order(sources: &[&Value], index: usize) -> u32 {
  integer(sources, &["order"])
    .filter(|o| *o > 0)
    .and_then(|o| u32::try_from(o).ok())
    .unwrap_or_else(|| position_order(index))
}

/// Accepts RFC 3339 strings, epoch milliseconds, or `{seconds, nanoseconds}` objects.
fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
  match value? {
    Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc)),
    Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
    Value::Object(o) => {
      let secs = o.get("seconds").or_else(|| o.get("_seconds")).and_then(Value::as_i64)?;
      let nanos = o
        .get("nanoseconds")
        .or_else(|| o.get("_nanoseconds"))
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);
      Utc.timestamp_opt(secs, nanos).single()
    }
    _ => None,
  }
}

/// `content` sub-object first, then the entry itself.
fn content_then_root(raw: &Value) -> Vec<&Value> {
  let mut sources = Vec::with_capacity(2);
  if let Some(content) = raw.get("content").filter(|c| c.is_object()) {
    sources.push(content);
  }
  sources.push(raw);
  sources
}

fn settle_order<T: Ordered>(items: &mut [T], path: &str, repairs: &mut Vec<Repair>) {
  ordering::sort_by_order(items);
  if ordering::reindex(items) > 0 {
    repairs.push(Repair::new(path, RepairKind::Reindexed));
  }
}

//
// Entry readers
//

fn read_choices(list: Option<&Vec<Value>>, owner: &str, path: &str, repairs: &mut Vec<Repair>) -> Vec<Choice> {
  let mut out = Vec::new();
  for (i, raw) in list.into_iter().flatten().enumerate() {
    let fallback_id = format!("{owner}-choice-{}", i + 1);
    match raw {
      Value::String(s) => out.push(Choice { id: fallback_id, text: s.clone(), ..Default::default() }),
      Value::Object(_) => {
        let src = [raw];
        out.push(Choice {
          id: text(&src, &["id"]).map(str::to_string).unwrap_or(fallback_id),
          text: owned_text(&src, &["text", "label"]),
          is_correct: flag(&src, &["isCorrect", "correct"]).unwrap_or(false),
          feedback: owned_text(&src, &["feedback"]),
        });
      }
      _ => repairs.push(Repair::new(format!("{path}.choices[{i}]"), RepairKind::Dropped)),
    }
  }
  out
}

fn read_hints(list: Option<&Vec<Value>>, owner: &str, path: &str, repairs: &mut Vec<Repair>) -> Vec<HintStep> {
  let mut out = Vec::new();
  for (i, raw) in list.into_iter().flatten().enumerate() {
    let hint_path = format!("{path}.hints[{i}]");
    let fallback_id = || format!("{owner}-hint-{}", i + 1);
    match raw {
      Value::String(s) => out.push(HintStep { id: fallback_id(), hint: s.clone(), ..Default::default() }),
      Value::Object(_) => {
        let src = [raw];
        let id = id_or(&src, &hint_path, repairs, fallback_id);
        let points = non_negative(integer(&src, &["points"]), &format!("{hint_path}.points"), repairs);
        out.push(HintStep {
          id,
          condition: owned_text(&src, &["condition", "trigger"]),
          hint: owned_text(&src, &["hint", "text"]),
          points: points.unwrap_or(0),
        });
      }
      _ => repairs.push(Repair::new(hint_path, RepairKind::Dropped)),
    }
  }
  out
}

fn read_slide(raw: &Value, index: usize, ctx: &NormalizeContext, repairs: &mut Vec<Repair>) -> CinematicSlide {
  let path = format!("cinematicSlides[{index}]");
  let root = [raw];
  let src = content_then_root(raw);

  let id = id_or(&root, &path, repairs, || format!("slide-{}-{}", ctx.stamp(), index));
  let kind = variant(text(&root, &["type"]), SlideType::parse, &format!("{path}.type"), repairs);
  let choices = read_choices(array(&src, &["choices"]), &id, &path, repairs);

  CinematicSlide {
    kind,
    order: incoming_order(&root, index),
    content: SlideContent {
      text: owned_text(&src, &["text", "dialogue"]),
      speaker: text(&src, &["speaker", "character"]).map(str::to_string),
      location: text(&src, &["location"]).map(str::to_string),
      background_image: text(&src, &["backgroundImage", "background", "image"]).map(str::to_string),
      auto_advance: flag(&src, &["autoAdvance"]).unwrap_or(false),
      duration_ms: integer(&src, &["durationMs", "duration"])
        .filter(|d| *d >= 0)
        .and_then(|d| u64::try_from(d).ok()),
      choices,
    },
    id,
  }
}

fn read_mission(raw: &Value, index: usize, ctx: &NormalizeContext, repairs: &mut Vec<Repair>) -> Mission {
  let path = format!("missions[{index}]");
  let root = [raw];
  let src = content_then_root(raw);

  let id = id_or(&root, &path, repairs, || format!("mission-{}-{}", ctx.stamp(), index));
  let kind = variant(text(&root, &["type"]), MissionType::parse, &format!("{path}.type"), repairs);
  let choices = read_choices(array(&src, &["choices"]), &id, &path, repairs);
  let hints = read_hints(array(&src, &["hints", "aiHints"]), &id, &path, repairs);
  let points = points_or_default(
    integer(&src, &["points"]),
    DEFAULT_MISSION_POINTS,
    &format!("{path}.points"),
    repairs,
  );

  Mission {
    title: owned_text(&root, &["title"]),
    description: owned_text(&root, &["description"]),
    kind,
    order: incoming_order(&root, index),
    content: MissionContent {
      initial_code: owned_text(&src, &["initialCode", "brokenHtml", "initialHtml"]),
      initial_css: owned_text(&src, &["initialCss", "brokenCss"]),
      target_code: owned_text(&src, &["targetCode", "targetHtml"]),
      target_css: owned_text(&src, &["targetCss"]),
      choices,
      hints,
      points,
      clue_revealed: owned_text(&src, &["clueRevealed", "clue"]),
      clue_unlock_condition: owned_text(&src, &["clueUnlockCondition", "unlockCondition"]),
    },
    id,
  }
}

fn read_legacy(raw: &Value) -> LegacyBody {
  let src = [raw];
  let mut hints: Vec<String> = array(&src, &["hints"])
    .into_iter()
    .flatten()
    .filter_map(|h| match h {
      Value::String(s) => Some(s.clone()),
      Value::Object(_) => Some(owned_text(&[h], &["hint", "text"])),
      _ => None,
    })
    .collect();
  if hints.is_empty() {
    hints.push(String::new());
  }
  LegacyBody {
    initial_html: owned_text(&src, &["initialHtml"]),
    initial_css: owned_text(&src, &["initialCss"]),
    target_html: owned_text(&src, &["targetHtml"]),
    target_css: owned_text(&src, &["targetCss"]),
    hints,
  }
}

fn read_rich(raw: &Value, ctx: &NormalizeContext, repairs: &mut Vec<Repair>) -> RichBody {
  let src = [raw];

  let mut cinematic_slides = Vec::new();
  for (i, s) in array(&src, &["cinematicSlides", "slides"]).into_iter().flatten().enumerate() {
    cinematic_slides.push(read_slide(s, i, ctx, repairs));
  }
  settle_order(&mut cinematic_slides, "cinematicSlides", repairs);

  let mut missions = Vec::new();
  for (i, m) in array(&src, &["missions"]).into_iter().flatten().enumerate() {
    missions.push(read_mission(m, i, ctx, repairs));
  }
  settle_order(&mut missions, "missions", repairs);

  RichBody { cinematic_slides, missions }
}

/// Produces a fully populated case from any document. Never fails.
pub fn to_canonical(raw: &Value, ctx: &NormalizeContext) -> Normalized {
  let mut repairs = Vec::new();
  if !raw.is_object() {
    repairs.push(Repair::new("$", RepairKind::Defaulted));
  }
  let root = [raw];

  let id = id_or(&root, "$", &mut repairs, || format!("case-{}-{}", ctx.stamp(), ctx.index));
  let title = text(&root, &["title", "name"]).map(str::to_string).unwrap_or_else(|| {
    repairs.push(Repair::new("title", RepairKind::Defaulted));
    String::new()
  });
  let difficulty = variant(text(&root, &["difficulty"]), Difficulty::parse, "difficulty", &mut repairs);
  let clue_points = points_or_default(integer(&root, &["cluePoints"]), DEFAULT_CLUE_POINTS, "cluePoints", &mut repairs);

  let mut legacy = match raw.get("legacyBody") {
    Some(body @ Value::Object(_)) => Some(read_legacy(body)),
    _ if LEGACY_KEYS.iter().any(|k| raw.get(*k).is_some()) => Some(read_legacy(raw)),
    _ => None,
  };
  let mut rich = match raw.get("richBody") {
    Some(body @ Value::Object(_)) => Some(read_rich(body, ctx, &mut repairs)),
    _ if array(&root, &["missions", "cinematicSlides", "slides"]).is_some() => Some(read_rich(raw, ctx, &mut repairs)),
    _ => None,
  };

  let is_detective_mission = flag(&root, &["isDetectiveMission"])
    .unwrap_or_else(|| rich.as_ref().is_some_and(|r| !r.missions.is_empty()));
  if legacy.is_none() && rich.is_none() {
    if is_detective_mission {
      rich = Some(RichBody::default());
    } else {
      legacy = Some(LegacyBody::default());
    }
  }

  let display_order = integer(&root, &["displayOrder", "order"])
    .filter(|o| *o > 0)
    .and_then(|o| u32::try_from(o).ok())
    .unwrap_or_else(|| {
      repairs.push(Repair::new("displayOrder", RepairKind::Defaulted));
      position_order(ctx.index)
    });
  let completions = non_negative(integer(&root, &["completions"]), "completions", &mut repairs).unwrap_or(0);
  let average_score = raw
    .get("averageScore")
    .and_then(Value::as_f64)
    .filter(|s| s.is_finite() && *s >= 0.0)
    .unwrap_or(0.0);
  let created_at = timestamp(raw.get("createdAt")).unwrap_or_else(|| {
    repairs.push(Repair::new("createdAt", RepairKind::Defaulted));
    ctx.now
  });
  let updated_at = timestamp(raw.get("updatedAt")).unwrap_or_else(|| {
    repairs.push(Repair::new("updatedAt", RepairKind::Defaulted));
    created_at
  });

  let case = Case {
    id,
    title,
    description: owned_text(&root, &["description", "summary"]),
    difficulty,
    duration: text_or_number(&root, &["duration", "estimatedTime"]),
    clue_points,
    is_detective_mission,
    story: owned_text(&root, &["story"]),
    objective: owned_text(&root, &["objective"]),
    final_resolution: owned_text(&root, &["finalResolution"]),
    display_order,
    is_active: flag(&root, &["isActive"]).unwrap_or(true),
    completions,
    average_score,
    created_at,
    updated_at,
    legacy,
    rich,
  };
  Normalized { case, repairs }
}

//
// Legacy projection
//

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LegacySlide {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: SlideType,
  pub order: u32,
  pub dialogue: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub character: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub background: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMission {
  pub id: String,
  pub title: String,
  pub description: String,
  #[serde(rename = "type")]
  pub kind: MissionType,
  pub order: u32,
  pub broken_html: String,
  pub broken_css: String,
  pub target_html: String,
  pub target_css: String,
  pub hints: Vec<HintStep>,
  pub points: u32,
  pub clue_revealed: String,
}

/// Flat case shape consumed by older readers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCase {
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
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub initial_html: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub initial_css: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_html: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_css: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hints: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub cinematic_slides: Vec<LegacySlide>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub missions: Vec<LegacyMission>,
}

/// Flattens a canonical case. Choices, unlock conditions and slide timing are dropped.
pub fn to_legacy(case: &Case) -> LegacyCase {
  let legacy = case.legacy.as_ref();
  LegacyCase {
    id: case.id.clone(),
    title: case.title.clone(),
    description: case.description.clone(),
    difficulty: case.difficulty,
    duration: case.duration.clone(),
    clue_points: case.clue_points,
    is_detective_mission: case.is_detective_mission,
    story: case.story.clone(),
    objective: case.objective.clone(),
    final_resolution: case.final_resolution.clone(),
    display_order: case.display_order,
    is_active: case.is_active,
    completions: case.completions,
    average_score: case.average_score,
    created_at: case.created_at,
    updated_at: case.updated_at,
    initial_html: legacy.map(|l| l.initial_html.clone()),
    initial_css: legacy.map(|l| l.initial_css.clone()),
    target_html: legacy.map(|l| l.target_html.clone()),
    target_css: legacy.map(|l| l.target_css.clone()),
    hints: legacy.map(|l| l.hints.clone()),
    cinematic_slides: case
      .slides()
      .iter()
      .map(|s| LegacySlide {
        id: s.id.clone(),
        kind: s.kind,
        order: s.order,
        dialogue: s.content.text.clone(),
        character: s.content.speaker.clone(),
        location: s.content.location.clone(),
        background: s.content.background_image.clone(),
      })
      .collect(),
    missions: case
      .missions()
      .iter()
      .map(|m| LegacyMission {
        id: m.id.clone(),
        title: m.title.clone(),
        description: m.description.clone(),
        kind: m.kind,
        order: m.order,
        broken_html: m.content.initial_code.clone(),
        broken_css: m.content.initial_css.clone(),
        target_html: m.content.target_code.clone(),
        target_css: m.content.target_css.clone(),
        hints: m.content.hints.clone(),
        points: m.content.points,
        clue_revealed: m.content.clue_revealed.clone(),
      })
      .collect(),
  }
}

fn mirror(obj: &mut Map<String, Value>, from: &str, to: &str) {
  if let Some(v) = obj.get(from).cloned() {
    obj.insert(to.to_string(), v);
  }
}

fn contents_mut<'a>(body: &'a mut Value, key: &str) -> impl Iterator<Item = &'a mut Map<String, Value>> {
  body
    .get_mut(key)
    .and_then(Value::as_array_mut)
    .into_iter()
    .flatten()
    .filter_map(|entry| entry.get_mut("content").and_then(Value::as_object_mut))
}

/// Stored form: the legacy projection overlaid with canonical fields, with
/// legacy spellings mirrored inside every slide and mission content.
pub fn to_document(case: &Case) -> Value {
  let mut doc = serde_json::to_value(to_legacy(case)).unwrap_or_else(|_| json!({}));
  if let (Some(out), Ok(Value::Object(canonical))) = (doc.as_object_mut(), serde_json::to_value(case)) {
    out.extend(canonical);
  }
  if let Some(rich) = doc.get_mut("richBody") {
    for content in contents_mut(rich, "cinematicSlides") {
      mirror(content, "text", "dialogue");
      mirror(content, "speaker", "character");
      mirror(content, "backgroundImage", "background");
    }
    for content in contents_mut(rich, "missions") {
      mirror(content, "initialCode", "brokenHtml");
      mirror(content, "initialCss", "brokenCss");
      mirror(content, "targetCode", "targetHtml");
      mirror(content, "hints", "aiHints");
    }
  }
  doc
}
