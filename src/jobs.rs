//! The named background jobs and their wiring into the scheduler. Each job
//! owns its failure: errors are logged by the scheduler and never reach the
//! serving path.

use crate::cache::{CacheInvalidator, MutatedEntity};
use crate::catalog::client::CatalogClient;
use crate::config::{CatalogConfig, SchedulerConfig};
use crate::error::Result;
use crate::facade::PersistenceFacade;
use crate::moderation::engine::ModerationEngine;
use crate::scheduler::Scheduler;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

pub const FETCH_CATALOG_JOB: &str = "fetch-catalog";
pub const UPDATE_TRENDING_JOB: &str = "update-trending-index";
pub const UPDATE_GAME_INFO_JOB: &str = "update-game-info";
pub const PROCESS_MODERATION_JOB: &str = "process-moderation";

/// Shared dependencies handed to every job closure.
pub struct JobContext {
    pub catalog: Arc<CatalogClient>,
    pub facade: Arc<dyn PersistenceFacade>,
    pub invalidator: Arc<CacheInvalidator>,
    pub engine: Arc<ModerationEngine>,
    pub top_games_limit: usize,
    pub trending_limit: usize,
    pub update_batch_size: usize,
}

impl JobContext {
    pub fn new(
        catalog_config: &CatalogConfig,
        catalog: Arc<CatalogClient>,
        facade: Arc<dyn PersistenceFacade>,
        invalidator: Arc<CacheInvalidator>,
        engine: Arc<ModerationEngine>,
    ) -> Self {
        Self {
            catalog,
            facade,
            invalidator,
            engine,
            top_games_limit: catalog_config.top_games_limit,
            trending_limit: catalog_config.trending_limit,
            update_batch_size: catalog_config.update_batch_size,
        }
    }
}

/// Pulls the highest-rated slice of the catalog and refreshes canonical data.
#[instrument(skip(ctx))]
pub async fn fetch_catalog(ctx: Arc<JobContext>) -> Result<()> {
    let games = ctx.catalog.fetch_top_games(ctx.top_games_limit).await?;
    ctx.facade.upsert_catalog_games(&games).await?;
    ctx.invalidator
        .purge(&["games:list:*".to_string(), "games:trending".to_string()])
        .await;
    info!("catalog refresh upserted {} games", games.len());
    Ok(())
}

/// Rebuilds the trending slice from the catalog's current top ratings.
#[instrument(skip(ctx))]
pub async fn update_trending_index(ctx: Arc<JobContext>) -> Result<()> {
    let games = ctx.catalog.fetch_top_games(ctx.trending_limit).await?;
    ctx.facade.upsert_catalog_games(&games).await?;
    ctx.invalidator
        .purge(&["games:trending".to_string(), "games:list:*".to_string()])
        .await;
    info!("trending index refreshed from {} games", games.len());
    Ok(())
}

/// Refreshes metadata for games we already track, one batch per tick.
#[instrument(skip(ctx))]
pub async fn update_game_info(ctx: Arc<JobContext>) -> Result<()> {
    let ids = ctx.facade.load_catalog_game_ids(ctx.update_batch_size).await?;
    if ids.is_empty() {
        return Ok(());
    }
    let games = ctx.catalog.fetch_game_updates(&ids).await?;
    ctx.facade.upsert_catalog_games(&games).await?;

    let mut keys: BTreeSet<String> = BTreeSet::new();
    for game in &games {
        keys.extend(
            ctx.facade
                .notify_mutation(MutatedEntity::Game, &game.igdb_id.to_string()),
        );
    }
    let keys: Vec<String> = keys.into_iter().collect();
    ctx.invalidator.purge(&keys).await;
    info!("refreshed metadata for {} games", games.len());
    Ok(())
}

/// One moderation pass over every re-processable record.
#[instrument(skip(ctx))]
pub async fn process_moderation(ctx: Arc<JobContext>) -> Result<()> {
    let stats = ctx.engine.process_pending().await?;
    if stats.processed > 0 {
        info!(
            processed = stats.processed,
            approved = stats.approved,
            rejected = stats.rejected,
            needs_review = stats.needs_review,
            errors = stats.errors,
            "moderation job finished"
        );
    }
    Ok(())
}

/// Registers the four pipeline jobs on their configured intervals.
pub fn build_scheduler(config: &SchedulerConfig, ctx: Arc<JobContext>) -> Scheduler {
    let mut scheduler = Scheduler::new(
        Duration::from_secs(config.job_timeout_secs),
        Duration::from_secs(config.shutdown_grace_secs),
    );

    {
        let ctx = ctx.clone();
        scheduler.register(
            FETCH_CATALOG_JOB,
            Duration::from_secs(config.fetch_catalog_interval_secs),
            move || fetch_catalog(ctx.clone()),
        );
    }
    {
        let ctx = ctx.clone();
        scheduler.register(
            UPDATE_TRENDING_JOB,
            Duration::from_secs(config.trending_interval_secs),
            move || update_trending_index(ctx.clone()),
        );
    }
    {
        let ctx = ctx.clone();
        scheduler.register(
            UPDATE_GAME_INFO_JOB,
            Duration::from_secs(config.game_info_interval_secs),
            move || update_game_info(ctx.clone()),
        );
    }
    {
        let ctx = ctx.clone();
        scheduler.register(
            PROCESS_MODERATION_JOB,
            Duration::from_secs(config.moderation_interval_secs),
            move || process_moderation(ctx.clone()),
        );
    }

    scheduler
}
