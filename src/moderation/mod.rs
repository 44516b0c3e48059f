pub mod client;
pub mod engine;
pub mod verdict;

pub use client::{ModerationProvider, OpenAiModerationClient};
pub use engine::{ModerationEngine, ModerationRunStats};
pub use verdict::{
    GameSubmission, ModerationRecord, ModerationStatus, ModerationVerdict, TextVerdict,
    VisionVerdict,
};
