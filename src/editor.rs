//! In-memory editing surface for a single case.
//!
//! The editor owns a private draft; nothing reaches the store until `save`
//! succeeds and the caller hands the result to the repository.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{
  validate, Case, Choice, CinematicSlide, Difficulty, HintStep, LegacyBody, Mission, MissionType, SlideType,
};
use crate::error::{EditError, ValidationError};
use crate::normalize::to_document;
use crate::ordering::{self, Direction};

/// Shallow patch of case-level fields. `None` keeps the current value.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CasePatch {
  pub title: Option<String>,
  pub description: Option<String>,
  pub difficulty: Option<Difficulty>,
  pub duration: Option<String>,
  pub clue_points: Option<u32>,
  pub is_detective_mission: Option<bool>,
  pub story: Option<String>,
  pub objective: Option<String>,
  pub final_resolution: Option<String>,
  pub is_active: Option<bool>,
  pub initial_html: Option<String>,
  pub initial_css: Option<String>,
  pub target_html: Option<String>,
  pub target_css: Option<String>,
  pub hints: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissionContentPatch {
  pub initial_code: Option<String>,
  pub initial_css: Option<String>,
  pub target_code: Option<String>,
  pub target_css: Option<String>,
  pub choices: Option<Vec<Choice>>,
  pub hints: Option<Vec<HintStep>>,
  pub points: Option<u32>,
  pub clue_revealed: Option<String>,
  pub clue_unlock_condition: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissionPatch {
  pub title: Option<String>,
  pub description: Option<String>,
  #[serde(rename = "type")]
  pub kind: Option<MissionType>,
  pub content: MissionContentPatch,
}

/// Slide content patch. An empty string clears an optional field.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlideContentPatch {
  pub text: Option<String>,
  pub speaker: Option<String>,
  pub location: Option<String>,
  pub background_image: Option<String>,
  pub auto_advance: Option<bool>,
  pub duration_ms: Option<u64>,
  pub choices: Option<Vec<Choice>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlidePatch {
  #[serde(rename = "type")]
  pub kind: Option<SlideType>,
  pub content: SlideContentPatch,
}

/// Editor operations as data, for the HTTP and WebSocket surfaces.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditCommand {
  UpdateDetails { patch: CasePatch },
  AddMission,
  UpdateMission { id: String, patch: MissionPatch },
  DeleteMission { id: String },
  MoveMission { id: String, direction: Direction },
  AddSlide,
  UpdateSlide { id: String, patch: SlidePatch },
  DeleteSlide { id: String },
  MoveSlide { id: String, direction: Direction },
  AddHint {
    #[serde(rename = "missionId")]
    mission_id: String,
  },
  DeleteHint {
    #[serde(rename = "missionId")]
    mission_id: String,
    #[serde(rename = "hintId")]
    hint_id: String,
  },
}

/// What a single command did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditOutcome {
  /// Id of the entry the command created, if any.
  pub created: Option<String>,
  /// False for no-op moves.
  pub changed: bool,
}

impl EditOutcome {
  fn changed() -> Self {
    Self { created: None, changed: true }
  }
}

/// A validated case ready for persistence, with both projections.
#[derive(Clone, Debug)]
pub struct SavedCase {
  pub case: Case,
  pub document: Value,
}

fn set<T>(slot: &mut T, value: Option<T>) {
  if let Some(v) = value {
    *slot = v;
  }
}

fn set_optional(slot: &mut Option<String>, value: Option<String>) {
  if let Some(v) = value {
    *slot = if v.is_empty() { None } else { Some(v) };
  }
}

pub struct CaseEditor {
  draft: Case,
}

impl CaseEditor {
  pub fn open(case: Case) -> Self {
    Self { draft: case }
  }

  /// Fresh detective mission appended after the last case of `catalog`.
  pub fn create(catalog: &[Case], now: DateTime<Utc>) -> Self {
    let next = catalog.iter().map(|c| c.display_order).max().unwrap_or(0).saturating_add(1);
    let id = format!("case-{}", Uuid::new_v4());
    debug!(target: "editor", %id, display_order = next, "Created draft case");
    Self { draft: Case::new_detective(id, next, now) }
  }

  pub fn draft(&self) -> &Case {
    &self.draft
  }

  pub fn update_details(&mut self, patch: CasePatch) {
    let c = &mut self.draft;
    set(&mut c.title, patch.title);
    set(&mut c.description, patch.description);
    set(&mut c.difficulty, patch.difficulty);
    set(&mut c.duration, patch.duration);
    set(&mut c.clue_points, patch.clue_points);
    set(&mut c.is_detective_mission, patch.is_detective_mission);
    set(&mut c.story, patch.story);
    set(&mut c.objective, patch.objective);
    set(&mut c.final_resolution, patch.final_resolution);
    set(&mut c.is_active, patch.is_active);

    let touches_legacy = patch.initial_html.is_some()
      || patch.initial_css.is_some()
      || patch.target_html.is_some()
      || patch.target_css.is_some()
      || patch.hints.is_some();
    if touches_legacy {
      let body = c.legacy.get_or_insert_with(LegacyBody::default);
      set(&mut body.initial_html, patch.initial_html);
      set(&mut body.initial_css, patch.initial_css);
      set(&mut body.target_html, patch.target_html);
      set(&mut body.target_css, patch.target_css);
      set(&mut body.hints, patch.hints);
      if body.hints.is_empty() {
        body.hints.push(String::new());
      }
    }
    if c.is_detective_mission && c.rich.is_none() {
      c.rich = Some(Default::default());
    }
  }

  //
  // Missions
  //

  pub fn add_mission(&mut self) -> String {
    let id = format!("mission-{}", Uuid::new_v4());
    ordering::append(self.draft.missions_mut(), Mission::new(id.clone(), 0));
    id
  }

  // Lookups never create the rich body; only `add_*` does.
  fn existing_missions(&mut self) -> Option<&mut Vec<Mission>> {
    self.draft.rich.as_mut().map(|r| &mut r.missions)
  }

  fn existing_slides(&mut self) -> Option<&mut Vec<CinematicSlide>> {
    self.draft.rich.as_mut().map(|r| &mut r.cinematic_slides)
  }

  fn mission_mut(&mut self, id: &str) -> Result<&mut Mission, EditError> {
    self
      .existing_missions()
      .and_then(|ms| ms.iter_mut().find(|m| m.id == id))
      .ok_or_else(|| EditError::UnknownMission(id.to_string()))
  }

  pub fn update_mission(&mut self, id: &str, patch: MissionPatch) -> Result<(), EditError> {
    let m = self.mission_mut(id)?;
    set(&mut m.title, patch.title);
    set(&mut m.description, patch.description);
    set(&mut m.kind, patch.kind);
    let (c, p) = (&mut m.content, patch.content);
    set(&mut c.initial_code, p.initial_code);
    set(&mut c.initial_css, p.initial_css);
    set(&mut c.target_code, p.target_code);
    set(&mut c.target_css, p.target_css);
    set(&mut c.choices, p.choices);
    set(&mut c.hints, p.hints);
    set(&mut c.points, p.points);
    set(&mut c.clue_revealed, p.clue_revealed);
    set(&mut c.clue_unlock_condition, p.clue_unlock_condition);
    Ok(())
  }

  pub fn delete_mission(&mut self, id: &str) -> Result<Mission, EditError> {
    self
      .existing_missions()
      .and_then(|ms| ordering::remove_and_reindex(ms, id))
      .ok_or_else(|| EditError::UnknownMission(id.to_string()))
  }

  pub fn move_mission(&mut self, id: &str, direction: Direction) -> bool {
    self.existing_missions().is_some_and(|ms| ordering::move_item(ms, id, direction))
  }

  pub fn add_hint(&mut self, mission_id: &str) -> Result<String, EditError> {
    let m = self.mission_mut(mission_id)?;
    let id = format!("{}-hint-{}", m.id, Uuid::new_v4());
    m.content.hints.push(HintStep::new(id.clone()));
    Ok(id)
  }

  pub fn delete_hint(&mut self, mission_id: &str, hint_id: &str) -> Result<HintStep, EditError> {
    let m = self.mission_mut(mission_id)?;
    let idx = m.content.hints.iter().position(|h| h.id == hint_id).ok_or_else(|| EditError::UnknownHint {
      mission_id: mission_id.to_string(),
      hint_id: hint_id.to_string(),
    })?;
    Ok(m.content.hints.remove(idx))
  }

  //
  // Slides
  //

  pub fn add_slide(&mut self) -> String {
    let id = format!("slide-{}", Uuid::new_v4());
    ordering::append(self.draft.slides_mut(), CinematicSlide::new(id.clone(), 0));
    id
  }

  pub fn update_slide(&mut self, id: &str, patch: SlidePatch) -> Result<(), EditError> {
    let s = self
      .existing_slides()
      .and_then(|ss| ss.iter_mut().find(|s| s.id == id))
      .ok_or_else(|| EditError::UnknownSlide(id.to_string()))?;
    set(&mut s.kind, patch.kind);
    let (c, p) = (&mut s.content, patch.content);
    set(&mut c.text, p.text);
    set_optional(&mut c.speaker, p.speaker);
    set_optional(&mut c.location, p.location);
    set_optional(&mut c.background_image, p.background_image);
    set(&mut c.auto_advance, p.auto_advance);
    if p.duration_ms.is_some() {
      c.duration_ms = p.duration_ms;
    }
    set(&mut c.choices, p.choices);
    Ok(())
  }

  pub fn delete_slide(&mut self, id: &str) -> Result<CinematicSlide, EditError> {
    self
      .existing_slides()
      .and_then(|ss| ordering::remove_and_reindex(ss, id))
      .ok_or_else(|| EditError::UnknownSlide(id.to_string()))
  }

  pub fn move_slide(&mut self, id: &str, direction: Direction) -> bool {
    self.existing_slides().is_some_and(|ss| ordering::move_item(ss, id, direction))
  }

  #[instrument(level = "debug", skip(self), fields(case_id = %self.draft.id))]
  pub fn apply(&mut self, cmd: EditCommand) -> Result<EditOutcome, EditError> {
    let outcome = match cmd {
      EditCommand::UpdateDetails { patch } => {
        self.update_details(patch);
        EditOutcome::changed()
      }
      EditCommand::AddMission => EditOutcome { created: Some(self.add_mission()), changed: true },
      EditCommand::UpdateMission { id, patch } => {
        self.update_mission(&id, patch)?;
        EditOutcome::changed()
      }
      EditCommand::DeleteMission { id } => {
        self.delete_mission(&id)?;
        EditOutcome::changed()
      }
      EditCommand::MoveMission { id, direction } => {
        EditOutcome { created: None, changed: self.move_mission(&id, direction) }
      }
      EditCommand::AddSlide => EditOutcome { created: Some(self.add_slide()), changed: true },
      EditCommand::UpdateSlide { id, patch } => {
        self.update_slide(&id, patch)?;
        EditOutcome::changed()
      }
      EditCommand::DeleteSlide { id } => {
        self.delete_slide(&id)?;
        EditOutcome::changed()
      }
      EditCommand::MoveSlide { id, direction } => EditOutcome { created: None, changed: self.move_slide(&id, direction) },
      EditCommand::AddHint { mission_id } => EditOutcome { created: Some(self.add_hint(&mission_id)?), changed: true },
      EditCommand::DeleteHint { mission_id, hint_id } => {
        self.delete_hint(&mission_id, &hint_id)?;
        EditOutcome::changed()
      }
    };
    Ok(outcome)
  }

  /// First failing rule, if any.
  pub fn validate(&self) -> Result<(), ValidationError> {
    let c = &self.draft;
    if c.title.trim().is_empty() {
      return Err(ValidationError::TitleRequired);
    }
    if c.description.trim().is_empty() {
      return Err(ValidationError::DescriptionRequired);
    }
    if c.is_detective_mission && c.missions().is_empty() {
      return Err(ValidationError::MissionRequired);
    }
    match validate(c).into_iter().next() {
      Some(v) => Err(ValidationError::Invariant(v)),
      None => Ok(()),
    }
  }

  /// Validates, stamps `updatedAt`, and produces both projections.
  #[instrument(level = "info", skip(self), fields(case_id = %self.draft.id))]
  pub fn save(&self, now: DateTime<Utc>) -> Result<SavedCase, ValidationError> {
    if let Err(e) = self.validate() {
      debug!(target: "editor", rule = e.rule(), "Save rejected");
      return Err(e);
    }
    let mut case = self.draft.clone();
    case.updated_at = now;
    Ok(SavedCase { document: to_document(&case), case })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{orders_contiguous, Case, Violation};
  use crate::normalize::to_legacy;
  use serde_json::json;

  fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-04-01T09:30:00Z").unwrap().with_timezone(&Utc)
  }

  fn filled_editor() -> CaseEditor {
    let mut ed = CaseEditor::open(Case::new_detective("c1", 1, now()));
    ed.update_details(CasePatch {
      title: Some("Missing Footer".into()),
      description: Some("The footer vanished.".into()),
      ..Default::default()
    });
    ed
  }

  #[test]
  fn create_appends_after_catalog_max() {
    let catalog = vec![Case::new("a", 1, now()), Case::new("b", 2, now())];
    let ed = CaseEditor::create(&catalog, now());
    assert_eq!(ed.draft().display_order, 3);
    assert!(ed.draft().id.starts_with("case-"));
    assert!(ed.draft().is_detective_mission);

    assert_eq!(CaseEditor::create(&[], now()).draft().display_order, 1);
  }

  #[test]
  fn missions_keep_contiguous_order() {
    let mut ed = filled_editor();
    let a = ed.add_mission();
    let b = ed.add_mission();
    let c = ed.add_mission();
    assert!(ed.move_mission(&c, Direction::Up));
    ed.delete_mission(&a).unwrap();
    let ids: Vec<_> = ed.draft().missions().iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, vec![c, b]);
    assert!(orders_contiguous(ed.draft().missions().iter().map(|m| m.order)));
  }

  #[test]
  fn boundary_mission_moves_leave_draft_unchanged() {
    let mut ed = filled_editor();
    let first = ed.add_mission();
    let last = ed.add_mission();
    let before = ed.draft().clone();
    assert!(!ed.move_mission(&first, Direction::Up));
    assert!(!ed.move_mission(&last, Direction::Down));
    assert_eq!(ed.draft(), &before);
  }

  #[test]
  fn update_mission_merges_content_shallowly() {
    let mut ed = filled_editor();
    let id = ed.add_mission();
    ed.update_mission(&id, MissionPatch {
      content: MissionContentPatch { initial_code: Some("<div>".into()), clue_revealed: Some("ink".into()), ..Default::default() },
      ..Default::default()
    })
    .unwrap();
    ed.update_mission(&id, MissionPatch {
      title: Some("Fix nav".into()),
      content: MissionContentPatch { target_code: Some("<nav>".into()), ..Default::default() },
      ..Default::default()
    })
    .unwrap();
    let m = &ed.draft().missions()[0];
    assert_eq!(m.title, "Fix nav");
    assert_eq!(m.content.initial_code, "<div>");
    assert_eq!(m.content.target_code, "<nav>");
    assert_eq!(m.content.clue_revealed, "ink");
    assert_eq!(m.content.points, 250);
  }

  #[test]
  fn unknown_ids_are_reported() {
    let mut ed = filled_editor();
    assert_eq!(ed.delete_mission("nope"), Err(EditError::UnknownMission("nope".into())));
    assert_eq!(ed.update_slide("nope", SlidePatch::default()), Err(EditError::UnknownSlide("nope".into())));
    assert!(!ed.move_slide("nope", Direction::Down));
  }

  #[test]
  fn unknown_ids_leave_legacy_case_shape_alone() {
    let mut ed = CaseEditor::open(Case::new("legacy", 1, now()));
    assert!(!ed.move_mission("ghost", Direction::Up));
    assert!(!ed.move_slide("ghost", Direction::Down));
    assert!(matches!(ed.delete_mission("ghost"), Err(EditError::UnknownMission(_))));
    assert!(matches!(ed.delete_slide("ghost"), Err(EditError::UnknownSlide(_))));
    assert!(matches!(ed.update_mission("ghost", MissionPatch::default()), Err(EditError::UnknownMission(_))));
    assert!(matches!(ed.add_hint("ghost"), Err(EditError::UnknownMission(_))));
    assert!(ed.draft().rich.is_none());
    assert!(ed.draft().legacy.is_some());
  }

  #[test]
  fn deleting_a_slide_reindexes_survivors() {
    let mut ed = filled_editor();
    let a = ed.add_slide();
    let b = ed.add_slide();
    let c = ed.add_slide();
    ed.delete_slide(&a).unwrap();
    let slides: Vec<_> = ed.draft().slides().iter().map(|s| (s.id.clone(), s.order)).collect();
    assert_eq!(slides, vec![(b, 1), (c, 2)]);
  }

  #[test]
  fn slide_patch_clears_optional_fields_with_empty_string() {
    let mut ed = filled_editor();
    let id = ed.add_slide();
    ed.update_slide(&id, SlidePatch {
      content: SlideContentPatch { text: Some("Rain.".into()), speaker: Some("Chief".into()), ..Default::default() },
      ..Default::default()
    })
    .unwrap();
    ed.update_slide(&id, SlidePatch {
      kind: Some(SlideType::Character),
      content: SlideContentPatch { speaker: Some(String::new()), ..Default::default() },
    })
    .unwrap();
    let s = &ed.draft().slides()[0];
    assert_eq!(s.kind, SlideType::Character);
    assert_eq!(s.content.text, "Rain.");
    assert_eq!(s.content.speaker, None);
  }

  #[test]
  fn hints_can_be_added_and_removed() {
    let mut ed = filled_editor();
    let m = ed.add_mission();
    let h = ed.add_hint(&m).unwrap();
    assert_eq!(ed.draft().missions()[0].content.hints.len(), 1);
    ed.delete_hint(&m, &h).unwrap();
    assert!(ed.draft().missions()[0].content.hints.is_empty());
    assert!(matches!(ed.delete_hint(&m, &h), Err(EditError::UnknownHint { .. })));
  }

  #[test]
  fn save_reports_first_failing_rule() {
    let ed = CaseEditor::open(Case::new_detective("c1", 1, now()));
    assert_eq!(ed.save(now()).unwrap_err(), ValidationError::TitleRequired);

    let mut ed = ed;
    ed.update_details(CasePatch { title: Some("T".into()), ..Default::default() });
    assert_eq!(ed.save(now()).unwrap_err(), ValidationError::DescriptionRequired);

    ed.update_details(CasePatch { description: Some("D".into()), ..Default::default() });
    assert_eq!(ed.save(now()).unwrap_err(), ValidationError::MissionRequired);

    ed.add_mission();
    assert!(ed.save(now()).is_ok());
  }

  #[test]
  fn legacy_case_saves_without_missions() {
    let mut ed = CaseEditor::open(Case::new("legacy", 1, now()));
    ed.update_details(CasePatch {
      title: Some("Close the tag".into()),
      description: Some("Basics".into()),
      initial_html: Some("<p>".into()),
      hints: Some(vec![]),
      ..Default::default()
    });
    let saved = ed.save(now()).unwrap();
    assert_eq!(to_legacy(&saved.case).initial_html.as_deref(), Some("<p>"));
    assert_eq!(saved.case.legacy.as_ref().unwrap().hints, vec![String::new()]);
  }

  #[test]
  fn save_rejects_broken_invariants() {
    let mut case = Case::new_detective("c1", 1, now());
    case.title = "T".into();
    case.description = "D".into();
    case.missions_mut().push(Mission::new("m", 1));
    case.missions_mut().push(Mission::new("m", 2));
    let err = CaseEditor::open(case).save(now()).unwrap_err();
    assert_eq!(err, ValidationError::Invariant(Violation::DuplicateId { collection: "missions", id: "m".into() }));
  }

  #[test]
  fn save_emits_consistent_projections() {
    let mut ed = filled_editor();
    let id = ed.add_mission();
    ed.update_mission(&id, MissionPatch {
      content: MissionContentPatch { initial_code: Some("<b>".into()), ..Default::default() },
      ..Default::default()
    })
    .unwrap();
    let later = now() + chrono::Duration::minutes(5);
    let saved = ed.save(later).unwrap();
    assert_eq!(saved.case.updated_at, later);
    assert_eq!(to_legacy(&saved.case).missions[0].broken_html, "<b>");
    assert_eq!(saved.document["richBody"]["missions"][0]["content"]["initialCode"], "<b>");
    assert_eq!(saved.document["missions"][0]["brokenHtml"], "<b>");
  }

  #[test]
  fn commands_deserialize_and_apply() {
    let mut ed = filled_editor();
    let add: EditCommand = serde_json::from_value(json!({ "op": "add_mission" })).unwrap();
    let created = ed.apply(add).unwrap().created.unwrap();

    let cmds: Vec<EditCommand> = serde_json::from_value(json!([
      { "op": "update_mission", "id": created, "patch": { "title": "Fix nav", "type": "investigation", "content": { "points": 90 } } },
      { "op": "add_slide" },
      { "op": "move_mission", "id": created, "direction": "up" },
      { "op": "add_hint", "missionId": created }
    ]))
    .unwrap();
    let outcomes: Vec<EditOutcome> = cmds.into_iter().map(|c| ed.apply(c).unwrap()).collect();
    assert!(!outcomes[2].changed);

    let m = &ed.draft().missions()[0];
    assert_eq!(m.kind, MissionType::Investigation);
    assert_eq!(m.content.points, 90);
    assert_eq!(m.content.hints.len(), 1);
    assert_eq!(ed.draft().slides().len(), 1);
  }
}
