//! Bundled static dataset: the cases that ship with the binary.
//!
//! Used twice: to seed an empty remote collection, and as the offline catalog
//! when the remote store cannot be read. Entries are written the way authors
//! wrote them over time, so the legacy and nested spellings both appear.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::domain::Case;
use crate::normalize::{to_canonical, NormalizeContext};
use crate::ordering;

/// Hand-ordered ids used when seeding. Ids with no literal below are skipped.
pub const SEED_ORDER: &[&str] = &[
  "html-first-steps",
  "the-broken-navbar",
  "css-grid-heist",
  "the-vanishing-stylesheet",
];

/// Minimal set of built-in cases that guarantee the catalog renders
/// even without a reachable store.
pub fn seed_documents() -> Vec<Value> {
  vec![
    json!({
      "id": "html-first-steps",
      "title": "First Steps: Closing Tags",
      "description": "A paragraph was left open. Close it so the page renders cleanly.",
      "difficulty": "Beginner",
      "duration": "10 min",
      "cluePoints": 500,
      "isDetectiveMission": false,
      "initialHtml": "<p>Welcome to the agency",
      "initialCss": "p { color: #333; }",
      "targetHtml": "<p>Welcome to the agency</p>",
      "targetCss": "p { color: #333; }",
      "hints": ["Every opening tag needs a partner.", "Closing tags start with </"]
    }),
    json!({
      "id": "the-broken-navbar",
      "title": "The Case of the Broken Navbar",
      "description": "Someone sabotaged the agency's navigation overnight. Restore it and find out who.",
      "difficulty": "Intermediate",
      "duration": "25 min",
      "isDetectiveMission": true,
      "story": "The office lights flicker. The menu is gone.",
      "objective": "Rebuild the navigation and identify the saboteur.",
      "finalResolution": "The intern replaced every <nav> with <div> to dodge a style review.",
      "cinematicSlides": [
        { "id": "navbar-intro", "type": "story", "order": 1, "dialogue": "Monday, 7:02 AM. The homepage has no menu." },
        {
          "id": "navbar-janitor",
          "type": "character",
          "order": 2,
          "dialogue": "I only saw the intern leave late.",
          "character": "Night Janitor",
          "background": "office-night.png"
        }
      ],
      "missions": [
        {
          "id": "navbar-semantics",
          "title": "Fix the nav element",
          "description": "The menu lost its semantic wrapper.",
          "type": "code-fix",
          "order": 1,
          "content": {
            "brokenHtml": "<div class=\"menu\"><a href=\"/\">Home</a></div>",
            "targetHtml": "<nav class=\"menu\"><a href=\"/\">Home</a></nav>",
            "aiHints": [
              { "id": "navbar-semantics-h1", "condition": "No change after 2 minutes", "hint": "Which tag is meant for navigation links?", "points": 25 }
            ],
            "points": 300,
            "clueRevealed": "A commit signed at 23:48."
          }
        },
        {
          "id": "navbar-suspect",
          "title": "Name the saboteur",
          "type": "story",
          "order": 2,
          "content": {
            "choices": [
              { "id": "suspect-janitor", "text": "The janitor", "feedback": "He was mopping the lobby." },
              { "id": "suspect-intern", "text": "The intern", "correct": true, "feedback": "The 23:48 commit is theirs." }
            ],
            "clueUnlockCondition": "Complete the nav fix"
          }
        }
      ]
    }),
    json!({
      "id": "the-vanishing-stylesheet",
      "title": "The Vanishing Stylesheet",
      "description": "Styles disappear every time the page loads. Trace the leak.",
      "difficulty": "Advanced",
      "duration": "40 min",
      "cluePoints": 1500,
      "isDetectiveMission": true,
      "story": "A client calls: their storefront looks like 1995.",
      "objective": "Find why the stylesheet never applies.",
      "finalResolution": "A typo in the link's rel attribute hid the stylesheet.",
      "cinematicSlides": [
        {
          "id": "stylesheet-call",
          "type": "story",
          "order": 1,
          "content": { "text": "The phone rings at midnight.", "autoAdvance": true, "durationMs": 4000 }
        },
        {
          "id": "stylesheet-evidence",
          "type": "evidence",
          "order": 2,
          "content": { "text": "Network log: styles.css never requested.", "location": "Server room" }
        }
      ],
      "missions": [
        {
          "id": "stylesheet-inspect",
          "title": "Inspect the head",
          "description": "Read the document head and spot what looks off.",
          "type": "investigation",
          "order": 1,
          "content": {
            "hints": [{ "id": "stylesheet-inspect-h1", "condition": "Opened devtools", "hint": "Check the link attributes.", "points": 0 }],
            "points": 200,
            "clueRevealed": "rel=\"styelsheet\""
          }
        },
        {
          "id": "stylesheet-fix",
          "title": "Repair the link",
          "type": "code-fix",
          "order": 2,
          "content": {
            "initialCode": "<link rel=\"styelsheet\" href=\"styles.css\">",
            "targetCode": "<link rel=\"stylesheet\" href=\"styles.css\">",
            "points": 400,
            "clueUnlockCondition": "Inspect the head first"
          }
        }
      ]
    }),
  ]
}

/// Bundled documents plus the order used to seed them.
#[derive(Clone, Debug)]
pub struct StaticDataset {
  docs: Vec<Value>,
  seed_order: Vec<String>,
}

impl StaticDataset {
  pub fn bundled() -> Self {
    Self::new(seed_documents(), SEED_ORDER.iter().map(|s| s.to_string()).collect())
  }

  pub fn new(docs: Vec<Value>, seed_order: Vec<String>) -> Self {
    Self { docs, seed_order }
  }

  pub fn with_seed_order(mut self, seed_order: Vec<String>) -> Self {
    self.seed_order = seed_order;
    self
  }

  pub fn seed_order(&self) -> &[String] {
    &self.seed_order
  }

  pub fn len(&self) -> usize {
    self.docs.len()
  }

  pub fn get(&self, id: &str) -> Option<&Value> {
    self.docs.iter().find(|d| d.get("id").and_then(Value::as_str) == Some(id))
  }

  /// Canonical cases in dataset order with display orders `1..=n`.
  pub fn cases(&self, now: DateTime<Utc>) -> Vec<Case> {
    let mut cases: Vec<Case> = self
      .docs
      .iter()
      .enumerate()
      .map(|(i, d)| to_canonical(d, &NormalizeContext::new(now, i)).case)
      .collect();
    ordering::reindex(&mut cases);
    cases
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{validate, validate_catalog};

  fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z").unwrap().with_timezone(&Utc)
  }

  #[test]
  fn bundled_cases_are_valid() {
    let cases = StaticDataset::bundled().cases(now());
    assert_eq!(cases.len(), 3);
    assert!(validate_catalog(&cases).is_empty());
    for c in &cases {
      assert!(validate(c).is_empty(), "{} violates {:?}", c.id, validate(c));
      assert!(!c.title.is_empty());
    }
  }

  #[test]
  fn both_shapes_are_represented() {
    let cases = StaticDataset::bundled().cases(now());
    assert!(cases[0].rich.is_none());
    assert!(cases[1].rich.is_some());
    assert_eq!(cases[1].missions()[0].content.initial_code, "<div class=\"menu\"><a href=\"/\">Home</a></div>");
    assert_eq!(cases[1].slides()[1].content.speaker.as_deref(), Some("Night Janitor"));
    assert_eq!(cases[2].slides()[0].content.duration_ms, Some(4000));
  }

  #[test]
  fn seed_order_names_a_missing_case() {
    let dataset = StaticDataset::bundled();
    let missing: Vec<_> = dataset.seed_order().iter().filter(|id| dataset.get(id).is_none()).collect();
    assert_eq!(missing, vec!["css-grid-heist"]);
  }
}
