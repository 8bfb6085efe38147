//! Error taxonomy shared by the store adapters, the editor and the repository.

use thiserror::Error;

use crate::domain::Violation;

/// Failure talking to a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store payload could not be decoded: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// First rule a draft fails on save. Reported one at a time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title is required")]
    TitleRequired,
    #[error("description is required")]
    DescriptionRequired,
    #[error("a detective mission needs at least one mission")]
    MissionRequired,
    #[error("invariant violated: {0}")]
    Invariant(Violation),
}

impl ValidationError {
    /// Stable machine-readable rule name.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::TitleRequired => "title_required",
            Self::DescriptionRequired => "description_required",
            Self::MissionRequired => "mission_required",
            Self::Invariant(_) => "invariant",
        }
    }
}

/// Editor command addressed an entry that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("mission not found: {0}")]
    UnknownMission(String),
    #[error("slide not found: {0}")]
    UnknownSlide(String),
    #[error("hint {hint_id} not found in mission {mission_id}")]
    UnknownHint { mission_id: String, hint_id: String },
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("case not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Writes are refused until a load cycle has read the catalog from the store.
    #[error("catalog is read-only while in {0} mode; reload once the case store is reachable")]
    Degraded(&'static str),
}

/// Failure surfaced to HTTP and WebSocket clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("case not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Unavailable(String),
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Store(e) => Self::Store(e),
            e @ RepoError::Degraded(_) => Self::Unavailable(e.to_string()),
        }
    }
}
