//! Boundary to the relational store. The core only ever talks to the
//! `PersistenceFacade` trait; the production implementation lives with the
//! serving binary. The in-memory implementation backs development and tests.

use crate::cache::{invalidation_keys, MutatedEntity};
use crate::catalog::types::CatalogGame;
use crate::error::Result;
use crate::moderation::verdict::{GameSubmission, ModerationRecord, ModerationStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait PersistenceFacade: Send + Sync {
    async fn persist_moderation_record(&self, record: &ModerationRecord) -> Result<()>;

    /// Records eligible for (re-)processing: `Pending` plus retryable
    /// `Error` records, oldest first.
    async fn load_pending_moderation_records(&self) -> Result<Vec<ModerationRecord>>;

    /// Submitted content for a game under moderation.
    async fn load_game_content(&self, game_id: Uuid) -> Result<Option<GameSubmission>>;

    async fn upsert_catalog_games(&self, games: &[CatalogGame]) -> Result<()>;

    /// Catalog ids we already track, for the periodic metadata refresh.
    async fn load_catalog_game_ids(&self, limit: usize) -> Result<Vec<u64>>;

    /// Creates a fresh `Pending` record for a (re-)submitted game. Terminal
    /// records are never reopened.
    async fn submit_game_for_moderation(
        &self,
        submission: GameSubmission,
    ) -> Result<ModerationRecord>;

    /// Maps a reported mutation to the cache keys/patterns that must be
    /// purged.
    fn notify_mutation(&self, entity: MutatedEntity, id: &str) -> Vec<String> {
        invalidation_keys(entity, id)
    }
}

/// In-memory facade implementation for development/testing.
#[derive(Default)]
pub struct InMemoryFacade {
    records: Mutex<HashMap<Uuid, ModerationRecord>>,
    submissions: Mutex<HashMap<Uuid, GameSubmission>>,
    catalog: Mutex<HashMap<u64, CatalogGame>>,
}

impl InMemoryFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: Uuid) -> Option<ModerationRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn catalog_len(&self) -> usize {
        self.catalog.lock().unwrap().len()
    }
}

#[async_trait]
impl PersistenceFacade for InMemoryFacade {
    async fn persist_moderation_record(&self, record: &ModerationRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.insert(record.id, record.clone());
        debug!(
            record = %record.id,
            status = record.status.as_str(),
            "persisted moderation record"
        );
        Ok(())
    }

    async fn load_pending_moderation_records(&self) -> Result<Vec<ModerationRecord>> {
        let records = self.records.lock().unwrap();
        let mut pending: Vec<ModerationRecord> = records
            .values()
            .filter(|r| {
                matches!(
                    r.status,
                    ModerationStatus::Pending | ModerationStatus::Error
                )
            })
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }

    async fn load_game_content(&self, game_id: Uuid) -> Result<Option<GameSubmission>> {
        Ok(self.submissions.lock().unwrap().get(&game_id).cloned())
    }

    async fn upsert_catalog_games(&self, games: &[CatalogGame]) -> Result<()> {
        let mut catalog = self.catalog.lock().unwrap();
        for game in games {
            catalog.insert(game.igdb_id, game.clone());
        }
        debug!("upserted {} catalog games", games.len());
        Ok(())
    }

    async fn load_catalog_game_ids(&self, limit: usize) -> Result<Vec<u64>> {
        let catalog = self.catalog.lock().unwrap();
        let mut ids: Vec<u64> = catalog.keys().copied().collect();
        ids.sort_unstable();
        ids.truncate(limit);
        Ok(ids)
    }

    async fn submit_game_for_moderation(
        &self,
        submission: GameSubmission,
    ) -> Result<ModerationRecord> {
        let record = ModerationRecord::new(submission.game_id, Utc::now());
        self.submissions
            .lock()
            .unwrap()
            .insert(submission.game_id, submission);
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }
}
