use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review state of a submitted game. `Pending` and `Error` are re-processable;
/// the other three are terminal for the record (a re-submission creates a new
/// record instead of mutating a terminal one).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
    NeedsReview,
    Error,
}

impl ModerationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::NeedsReview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsReview => "needs_review",
            Self::Error => "error",
        }
    }
}

/// Persisted audit entry tracking one moderation pass over a game.
/// Records are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationRecord {
    pub id: Uuid,
    pub game_id: Uuid,
    pub status: ModerationStatus,
    pub details: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationRecord {
    pub fn new(game_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id,
            status: ModerationStatus::Pending,
            details: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The submitted content a moderation pass evaluates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSubmission {
    pub game_id: Uuid,
    pub name: String,
    pub summary: String,
    pub genres: Vec<String>,
    pub developer: String,
    pub publisher: String,
    pub websites: Vec<String>,
    pub logo_url: Option<String>,
    pub screenshot_urls: Vec<String>,
}

/// Outcome of the categorical text/image moderation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextVerdict {
    pub flagged: bool,
    pub categories: Vec<String>,
}

/// Outcome of the vision analysis stage, parsed from the provider's JSON
/// reply.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VisionVerdict {
    pub approved: bool,
    pub reason: String,
    pub gaming_appropriate: bool,
    pub content_relevant: bool,
}

/// One evaluation cycle's findings, consumed immediately by the engine.
/// Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationVerdict {
    /// The categorical stage flagged the content; vision was skipped.
    Flagged { categories: Vec<String> },
    /// The categorical stage passed; carries the vision judgment.
    Clean { vision: VisionVerdict },
}
