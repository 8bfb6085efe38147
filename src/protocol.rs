//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and editor frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::Case;
use crate::editor::{CasePatch, EditCommand};
use crate::ordering::Direction;
use crate::repository::CatalogSnapshot;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Explicit reload; the only way out of the static fallback.
    Reload,
    Edit {
        #[serde(rename = "caseId")]
        case_id: String,
        commands: Vec<EditCommand>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    /// Pushed on connect and after every catalog change.
    Catalog {
        catalog: CatalogSnapshot,
    },
    Saved {
        case: Case,
        #[serde(rename = "createdIds")]
        created_ids: Vec<String>,
    },
    Rejected {
        rule: String,
        message: String,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Default, Deserialize)]
pub struct CreateCaseIn {
    #[serde(default)]
    pub details: CasePatch,
    #[serde(default)]
    pub commands: Vec<EditCommand>,
}

#[derive(Debug, Deserialize)]
pub struct EditIn {
    pub commands: Vec<EditCommand>,
}

#[derive(Debug, Serialize)]
pub struct SaveOut {
    pub case: Case,
    /// Ids of missions, slides and hints created by the applied commands.
    #[serde(rename = "createdIds")]
    pub created_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveIn {
    pub direction: Direction,
}

#[derive(Serialize)]
pub struct MoveOut {
    pub moved: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Serialize)]
pub struct DeleteOut {
    pub deleted: bool,
    pub reindexed: usize,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn edit_message_carries_tagged_commands() {
        let raw = json!({
            "type": "edit",
            "caseId": "the-broken-navbar",
            "commands": [{ "op": "move_mission", "id": "navbar-suspect", "direction": "up" }]
        });
        match serde_json::from_value::<ClientWsMessage>(raw).unwrap() {
            ClientWsMessage::Edit { case_id, commands } => {
                assert_eq!(case_id, "the-broken-navbar");
                assert!(matches!(&commands[0], EditCommand::MoveMission { id, direction: Direction::Up } if id == "navbar-suspect"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn server_messages_are_snake_case_tagged() {
        assert_eq!(serde_json::to_value(ServerWsMessage::Pong).unwrap(), json!({ "type": "pong" }));
        let rejected = ServerWsMessage::Rejected { rule: "title_required".into(), message: "title is required".into() };
        assert_eq!(serde_json::to_value(rejected).unwrap()["type"], "rejected");
    }

    #[test]
    fn delete_query_defaults_to_unconfirmed() {
        let q: DeleteQuery = serde_json::from_value(json!({})).unwrap();
        assert!(!q.confirm);
    }
}
