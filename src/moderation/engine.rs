use crate::cache::{CacheInvalidator, MutatedEntity};
use crate::catalog::token::{Clock, SystemClock};
use crate::error::{Result, SyncError};
use crate::facade::PersistenceFacade;
use crate::moderation::client::ModerationProvider;
use crate::moderation::verdict::{
    GameSubmission, ModerationRecord, ModerationStatus, ModerationVerdict,
};
use crate::observability;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Drives the per-game moderation state machine.
///
/// The categorical moderation stage is authoritative and cheap: any flag is
/// an automatic rejection and short-circuits the pipeline. The vision stage
/// is gaming-context-aware but lower-confidence, so its negative outcome
/// lands in the human review queue instead of auto-rejecting. Stage failures
/// park the record in `Error`, which the next scheduled cycle retries.
pub struct ModerationEngine {
    provider: Arc<dyn ModerationProvider>,
    facade: Arc<dyn PersistenceFacade>,
    invalidator: Arc<CacheInvalidator>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ModerationRunStats {
    pub processed: usize,
    pub approved: usize,
    pub rejected: usize,
    pub needs_review: usize,
    pub errors: usize,
}

fn vision_prompt(game: &GameSubmission) -> String {
    format!(
        "You are reviewing promotional assets for a game listed on a game store.\n\
         Game: {name}\n\
         Genres: {genres}\n\
         Publisher: {publisher}\n\
         Summary: {summary}\n\
         Judge whether the attached logo and screenshots are appropriate for a \
         general gaming storefront. Stylized in-game violence and combat that fit \
         the stated genres are acceptable. Respond with only a JSON object: \
         {{\"approved\": bool, \"reason\": string, \"gaming_appropriate\": bool, \
         \"content_relevant\": bool}}",
        name = game.name,
        genres = game.genres.join(", "),
        publisher = game.publisher,
        summary = game.summary,
    )
}

impl ModerationEngine {
    pub fn new(
        provider: Arc<dyn ModerationProvider>,
        facade: Arc<dyn PersistenceFacade>,
        invalidator: Arc<CacheInvalidator>,
    ) -> Self {
        Self::with_clock(provider, facade, invalidator, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: Arc<dyn ModerationProvider>,
        facade: Arc<dyn PersistenceFacade>,
        invalidator: Arc<CacheInvalidator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            facade,
            invalidator,
            clock,
        }
    }

    /// Evaluates every re-processable record once. Failures on one record
    /// never stop the rest of the batch.
    #[instrument(skip(self))]
    pub async fn process_pending(&self) -> Result<ModerationRunStats> {
        let records = self.facade.load_pending_moderation_records().await?;
        observability::moderation::batch_size(records.len());

        let mut stats = ModerationRunStats::default();
        for mut record in records {
            stats.processed += 1;
            let outcome = self.evaluate(&record).await;
            let (status, details) = match outcome {
                Ok(ModerationVerdict::Flagged { categories }) => (
                    ModerationStatus::Rejected,
                    format!("flagged categories: {}", categories.join(", ")),
                ),
                Ok(ModerationVerdict::Clean { vision }) if vision.approved => {
                    (ModerationStatus::Approved, vision.reason)
                }
                Ok(ModerationVerdict::Clean { vision }) => (
                    ModerationStatus::NeedsReview,
                    format!("vision review requested: {}", vision.reason),
                ),
                Err(e) => (ModerationStatus::Error, format!("moderation failed: {e}")),
            };

            match self.transition(&mut record, status, details).await {
                Ok(()) => match status {
                    ModerationStatus::Approved => stats.approved += 1,
                    ModerationStatus::Rejected => stats.rejected += 1,
                    ModerationStatus::NeedsReview => stats.needs_review += 1,
                    _ => stats.errors += 1,
                },
                Err(e) => {
                    // A persist failure on one record must not starve the
                    // rest of the batch; the record stays re-processable.
                    stats.errors += 1;
                    error!(record = %record.id, "failed to persist moderation transition: {e}");
                }
            }
        }

        info!(
            processed = stats.processed,
            approved = stats.approved,
            rejected = stats.rejected,
            needs_review = stats.needs_review,
            errors = stats.errors,
            "moderation pass complete"
        );
        Ok(stats)
    }

    /// Runs the two moderation stages for one record, in order. A flag from
    /// the categorical stage skips vision entirely.
    async fn evaluate(&self, record: &ModerationRecord) -> Result<ModerationVerdict> {
        let game = self
            .facade
            .load_game_content(record.game_id)
            .await?
            .ok_or_else(|| {
                SyncError::InvalidInput(format!(
                    "no submitted content for game {}",
                    record.game_id
                ))
            })?;

        let mut texts = vec![
            game.name.clone(),
            game.summary.clone(),
            game.developer.clone(),
            game.publisher.clone(),
        ];
        texts.extend(game.websites.iter().cloned());
        texts.retain(|t| !t.trim().is_empty());

        let text_verdict = self
            .provider
            .moderate_content(&texts, game.logo_url.as_deref())
            .await?;
        if text_verdict.flagged {
            return Ok(ModerationVerdict::Flagged {
                categories: text_verdict.categories,
            });
        }

        let mut images: Vec<String> = Vec::new();
        images.extend(game.logo_url.iter().cloned());
        images.extend(game.screenshot_urls.iter().cloned());
        let vision = self
            .provider
            .analyze_images(&vision_prompt(&game), &images)
            .await?;
        Ok(ModerationVerdict::Clean { vision })
    }

    async fn transition(
        &self,
        record: &mut ModerationRecord,
        status: ModerationStatus,
        details: String,
    ) -> Result<()> {
        if record.status.is_terminal() {
            // Terminal records are immutable; a re-submission creates a new
            // record instead.
            warn!(record = %record.id, "refusing transition out of terminal state");
            return Ok(());
        }

        record.status = status;
        record.details = details;
        record.updated_at = self.clock.now().max(record.created_at);
        self.facade.persist_moderation_record(record).await?;
        observability::moderation::outcome(status.as_str());

        if status.is_terminal() {
            let keys = self
                .facade
                .notify_mutation(MutatedEntity::Game, &record.game_id.to_string());
            self.invalidator.purge(&keys).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, InMemoryCache};
    use crate::facade::InMemoryFacade;
    use crate::moderation::verdict::{TextVerdict, VisionVerdict};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Default)]
    struct MockProvider {
        flag_text: bool,
        categories: Vec<String>,
        text_fails: bool,
        vision: Option<VisionVerdict>,
        vision_parse_fails: bool,
        text_calls: AtomicUsize,
        vision_calls: AtomicUsize,
    }

    #[async_trait]
    impl ModerationProvider for MockProvider {
        async fn moderate_content(
            &self,
            _texts: &[String],
            _image_url: Option<&str>,
        ) -> Result<TextVerdict> {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            if self.text_fails {
                return Err(SyncError::ModerationUnavailable("provider down".into()));
            }
            Ok(TextVerdict {
                flagged: self.flag_text,
                categories: self.categories.clone(),
            })
        }

        async fn analyze_images(
            &self,
            _prompt: &str,
            _image_urls: &[String],
        ) -> Result<VisionVerdict> {
            self.vision_calls.fetch_add(1, Ordering::SeqCst);
            if self.vision_parse_fails {
                return Err(SyncError::ModerationParseError("not json".into()));
            }
            self.vision.clone().ok_or_else(|| {
                SyncError::ModerationUnavailable("vision unavailable".into())
            })
        }
    }

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn submission(game_id: Uuid) -> GameSubmission {
        GameSubmission {
            game_id,
            name: "Star Drifter".to_string(),
            summary: "Space exploration with stylized combat.".to_string(),
            genres: vec!["Adventure".to_string()],
            developer: "Orbit Works".to_string(),
            publisher: "Nebula".to_string(),
            websites: vec!["https://stardrifter.example".to_string()],
            logo_url: Some("https://cdn.example/logo.png".to_string()),
            screenshot_urls: vec![
                "https://cdn.example/s1.png".to_string(),
                "https://cdn.example/s2.png".to_string(),
            ],
        }
    }

    struct Harness {
        engine: ModerationEngine,
        facade: Arc<InMemoryFacade>,
        cache: Arc<InMemoryCache>,
        provider: Arc<MockProvider>,
    }

    fn harness(provider: MockProvider) -> Harness {
        let provider = Arc::new(provider);
        let facade = Arc::new(InMemoryFacade::new());
        let cache = Arc::new(InMemoryCache::new());
        let invalidator = Arc::new(CacheInvalidator::new(cache.clone()));
        let engine = ModerationEngine::new(provider.clone(), facade.clone(), invalidator);
        Harness {
            engine,
            facade,
            cache,
            provider,
        }
    }

    fn approving_vision() -> VisionVerdict {
        VisionVerdict {
            approved: true,
            reason: "ok".to_string(),
            gaming_appropriate: true,
            content_relevant: true,
        }
    }

    #[tokio::test]
    async fn flagged_text_rejects_without_invoking_vision() {
        let h = harness(MockProvider {
            flag_text: true,
            categories: vec!["violence".to_string(), "hate".to_string()],
            ..Default::default()
        });
        let record = h
            .facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();

        let stats = h.engine.process_pending().await.unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(h.provider.vision_calls.load(Ordering::SeqCst), 0);

        let stored = h.facade.record(record.id).unwrap();
        assert_eq!(stored.status, ModerationStatus::Rejected);
        assert!(stored.details.contains("violence"));
    }

    #[tokio::test]
    async fn clean_text_and_approving_vision_approves() {
        let h = harness(MockProvider {
            vision: Some(approving_vision()),
            ..Default::default()
        });
        let record = h
            .facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();

        let stats = h.engine.process_pending().await.unwrap();
        assert_eq!(stats.approved, 1);
        assert_eq!(h.provider.text_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.provider.vision_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.facade.record(record.id).unwrap().status,
            ModerationStatus::Approved
        );
    }

    #[tokio::test]
    async fn unapproving_vision_routes_to_review_not_rejection() {
        let h = harness(MockProvider {
            vision: Some(VisionVerdict {
                approved: false,
                reason: "ambiguous imagery".to_string(),
                gaming_appropriate: true,
                content_relevant: false,
            }),
            ..Default::default()
        });
        let record = h
            .facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();

        h.engine.process_pending().await.unwrap();
        let stored = h.facade.record(record.id).unwrap();
        assert_eq!(stored.status, ModerationStatus::NeedsReview);
        assert!(stored.details.contains("ambiguous imagery"));
    }

    #[tokio::test]
    async fn vision_parse_failure_parks_the_record_as_retryable() {
        let h = harness(MockProvider {
            vision_parse_fails: true,
            ..Default::default()
        });
        let record = h
            .facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();

        let stats = h.engine.process_pending().await.unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(
            h.facade.record(record.id).unwrap().status,
            ModerationStatus::Error
        );

        // Still eligible for the next cycle.
        let pending = h.facade.load_pending_moderation_records().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, record.id);
    }

    #[tokio::test]
    async fn text_stage_failure_parks_the_record_without_vision() {
        let h = harness(MockProvider {
            text_fails: true,
            ..Default::default()
        });
        h.facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();

        let stats = h.engine.process_pending().await.unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(h.provider.vision_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn terminal_decision_purges_the_game_cache_key() {
        let h = harness(MockProvider {
            vision: Some(approving_vision()),
            ..Default::default()
        });
        let game_id = Uuid::new_v4();
        h.facade
            .submit_game_for_moderation(submission(game_id))
            .await
            .unwrap();
        h.cache
            .set(&format!("game:{game_id}"), "stale", Duration::from_secs(60))
            .await
            .unwrap();

        h.engine.process_pending().await.unwrap();
        assert_eq!(h.cache.get(&format!("game:{game_id}")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn transitions_advance_updated_at_monotonically() {
        let provider = Arc::new(MockProvider {
            vision: Some(approving_vision()),
            ..Default::default()
        });
        let facade = Arc::new(InMemoryFacade::new());
        let cache = Arc::new(InMemoryCache::new());
        let created_at = Utc::now();
        let clock = Arc::new(ManualClock {
            now: Mutex::new(created_at + ChronoDuration::seconds(30)),
        });
        let engine = ModerationEngine::with_clock(
            provider,
            facade.clone(),
            Arc::new(CacheInvalidator::new(cache)),
            clock,
        );

        let record = facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();
        engine.process_pending().await.unwrap();

        let stored = facade.record(record.id).unwrap();
        assert!(stored.updated_at > stored.created_at);
    }

    /// Delegates to an in-memory facade but fails the first N persist calls.
    struct FlakyPersistFacade {
        inner: InMemoryFacade,
        persist_failures_left: AtomicUsize,
    }

    impl FlakyPersistFacade {
        fn failing_first(n: usize) -> Self {
            Self {
                inner: InMemoryFacade::new(),
                persist_failures_left: AtomicUsize::new(n),
            }
        }
    }

    #[async_trait]
    impl crate::facade::PersistenceFacade for FlakyPersistFacade {
        async fn persist_moderation_record(&self, record: &ModerationRecord) -> Result<()> {
            if self
                .persist_failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SyncError::Facade("database unavailable".into()));
            }
            self.inner.persist_moderation_record(record).await
        }

        async fn load_pending_moderation_records(&self) -> Result<Vec<ModerationRecord>> {
            self.inner.load_pending_moderation_records().await
        }

        async fn load_game_content(&self, game_id: Uuid) -> Result<Option<GameSubmission>> {
            self.inner.load_game_content(game_id).await
        }

        async fn upsert_catalog_games(
            &self,
            games: &[crate::catalog::types::CatalogGame],
        ) -> Result<()> {
            self.inner.upsert_catalog_games(games).await
        }

        async fn load_catalog_game_ids(&self, limit: usize) -> Result<Vec<u64>> {
            self.inner.load_catalog_game_ids(limit).await
        }

        async fn submit_game_for_moderation(
            &self,
            submission: GameSubmission,
        ) -> Result<ModerationRecord> {
            self.inner.submit_game_for_moderation(submission).await
        }
    }

    #[tokio::test]
    async fn persist_failure_on_one_record_does_not_starve_the_batch() {
        let provider = Arc::new(MockProvider {
            vision: Some(approving_vision()),
            ..Default::default()
        });
        let facade = Arc::new(FlakyPersistFacade::failing_first(usize::MAX));
        let engine = ModerationEngine::new(
            provider.clone(),
            facade.clone(),
            Arc::new(CacheInvalidator::new(Arc::new(InMemoryCache::new()))),
        );

        facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();
        facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();

        // Persistence is down for every record, but the pass still evaluates
        // each one and reports the failures in its stats.
        let stats = engine.process_pending().await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(provider.text_calls.load(Ordering::SeqCst), 2);

        // Nothing was persisted, so both records remain re-processable.
        let pending = facade.load_pending_moderation_records().await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn single_persist_failure_leaves_the_rest_of_the_batch_processed() {
        let provider = Arc::new(MockProvider {
            vision: Some(approving_vision()),
            ..Default::default()
        });
        let facade = Arc::new(FlakyPersistFacade::failing_first(1));
        let engine = ModerationEngine::new(
            provider.clone(),
            facade.clone(),
            Arc::new(CacheInvalidator::new(Arc::new(InMemoryCache::new()))),
        );

        facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();
        facade
            .submit_game_for_moderation(submission(Uuid::new_v4()))
            .await
            .unwrap();

        let stats = engine.process_pending().await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.errors, 1);

        // Only the record whose persist failed is still eligible.
        let pending = facade.load_pending_moderation_records().await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn missing_game_content_parks_the_record() {
        let h = harness(MockProvider {
            vision: Some(approving_vision()),
            ..Default::default()
        });
        // A record without a matching submission.
        let record = ModerationRecord::new(Uuid::new_v4(), Utc::now());
        h.facade.persist_moderation_record(&record).await.unwrap();

        let stats = h.engine.process_pending().await.unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(
            h.facade.record(record.id).unwrap().status,
            ModerationStatus::Error
        );
    }
}
