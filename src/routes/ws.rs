//! WebSocket upgrade + message loop. The current catalog is pushed on connect and
//! again whenever the repository publishes a new snapshot. Client messages are
//! parsed as JSON and answered with a single JSON message each.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::error::ApiError;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::repository::CatalogSnapshot;
use crate::routes::http::describe;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "casefile_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn encode(msg: &ServerWsMessage) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

fn catalog_message(state: &AppState) -> ServerWsMessage {
  ServerWsMessage::Catalog { catalog: state.repo.snapshot().as_ref().clone() }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "casefile_backend", "WebSocket connected");
  let mut updates = state.repo.subscribe();
  updates.borrow_and_update();

  if socket.send(Message::Text(encode(&catalog_message(&state)))).await.is_err() {
    return;
  }

  loop {
    let reply = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) => {
            debug!(target: "casefile_backend", "WS received: {:?}", &msg);
            reply_to(msg, &state, &mut updates).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
        Some(Ok(_)) => continue,
      },
      changed = updates.changed() => {
        if changed.is_err() {
          break;
        }
        updates.borrow_and_update();
        catalog_message(&state)
      }
    };

    if let Err(e) = socket.send(Message::Text(encode(&reply))).await {
      error!(target: "casefile_backend", error = %e, "WS send error");
      break;
    }
  }
  info!(target: "casefile_backend", "WebSocket disconnected");
}

/// Answers one client message. A reload reply already carries the new catalog,
/// so the snapshot notification it caused is marked seen.
async fn reply_to(
  msg: ClientWsMessage,
  state: &AppState,
  updates: &mut watch::Receiver<Arc<CatalogSnapshot>>,
) -> ServerWsMessage {
  let reload = matches!(msg, ClientWsMessage::Reload);
  let reply = handle_client_ws(msg, state).await;
  if reload {
    updates.borrow_and_update();
  }
  reply
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Reload => {
      let snapshot = state.repo.load().await;
      info!(target: "catalog", mode = ?snapshot.mode, "WS reload done");
      ServerWsMessage::Catalog { catalog: snapshot.as_ref().clone() }
    }

    ClientWsMessage::Edit { case_id, commands } => {
      let result = match state.repo.editor_for(&case_id) {
        Some(editor) => state.apply_and_save(editor, commands).await,
        None => Err(ApiError::NotFound(case_id.clone())),
      };
      match result {
        Ok((case, created_ids)) => {
          info!(target: "catalog", %case_id, "WS edit saved");
          ServerWsMessage::Saved { case, created_ids }
        }
        Err(ApiError::Store(e)) => ServerWsMessage::Error { message: e.to_string() },
        Err(e) => ServerWsMessage::Rejected { rule: describe(&e).to_string(), message: e.to_string() },
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::FixedClock;
  use crate::editor::EditCommand;
  use crate::repository::{CaseRepository, Collections};
  use crate::seeds::StaticDataset;
  use crate::store::MemoryStore;

  async fn loaded_state() -> AppState {
    let repo = CaseRepository::new(
      Arc::new(MemoryStore::new()),
      Arc::new(FixedClock::at("2026-06-01T10:00:00Z")),
      StaticDataset::bundled(),
      Collections::default(),
    );
    repo.load().await;
    AppState::with_repository(repo)
  }

  #[tokio::test]
  async fn reload_reply_is_not_pushed_again() {
    let state = loaded_state().await;
    let mut updates = state.repo.subscribe();
    updates.borrow_and_update();

    let reply = reply_to(ClientWsMessage::Reload, &state, &mut updates).await;
    assert!(matches!(reply, ServerWsMessage::Catalog { .. }));
    assert!(!updates.has_changed().unwrap());
  }

  #[tokio::test]
  async fn saved_edit_is_followed_by_a_catalog_push() {
    let state = loaded_state().await;
    let mut updates = state.repo.subscribe();
    updates.borrow_and_update();

    let msg = ClientWsMessage::Edit { case_id: "the-broken-navbar".into(), commands: vec![EditCommand::AddSlide] };
    let reply = reply_to(msg, &state, &mut updates).await;
    assert!(matches!(reply, ServerWsMessage::Saved { ref created_ids, .. } if created_ids.len() == 1));
    assert!(updates.has_changed().unwrap());
  }

  #[tokio::test]
  async fn edit_of_unknown_case_is_rejected() {
    let state = loaded_state().await;
    let mut updates = state.repo.subscribe();
    let msg = ClientWsMessage::Edit { case_id: "ghost".into(), commands: Vec::new() };
    let reply = reply_to(msg, &state, &mut updates).await;
    assert!(matches!(reply, ServerWsMessage::Rejected { ref rule, .. } if rule == "unknown_case"));
  }
}
