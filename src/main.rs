use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};

mod cache;
mod catalog;
mod config;
mod error;
mod facade;
mod jobs;
mod logging;
mod moderation;
mod observability;
mod scheduler;

use crate::cache::{CacheInvalidator, CacheStore, InMemoryCache, RedisCache};
use crate::catalog::client::CatalogClient;
use crate::config::Config;
use crate::facade::{InMemoryFacade, PersistenceFacade};
use crate::jobs::JobContext;
use crate::moderation::client::OpenAiModerationClient;
use crate::moderation::engine::ModerationEngine;

#[derive(Parser)]
#[command(name = "arcadia_sync")]
#[command(about = "Arcadia catalog-sync and content-moderation pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all background jobs until interrupted
    Run,
    /// Run a single catalog fetch and exit
    FetchCatalog {
        /// Override the configured top-games limit
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run a single moderation pass and exit
    Moderate,
    /// Check whether a company exists in the catalog
    CompanyCheck {
        /// Company name (case-insensitive)
        name: String,
    },
}

fn build_context(config: &Config) -> JobContext {
    let store: Arc<dyn CacheStore> = match RedisCache::connect(&config.cache.redis_url) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            // Cache is a performance optimization; run degraded rather than die.
            warn!("redis unavailable ({e}), falling back to in-memory cache");
            Arc::new(InMemoryCache::new())
        }
    };
    let invalidator = Arc::new(CacheInvalidator::new(store));
    let catalog = Arc::new(CatalogClient::new(&config.catalog));
    let facade: Arc<dyn PersistenceFacade> = Arc::new(InMemoryFacade::new());
    let provider = Arc::new(OpenAiModerationClient::new(&config.moderation));
    let engine = Arc::new(ModerationEngine::new(
        provider,
        facade.clone(),
        invalidator.clone(),
    ));
    JobContext::new(&config.catalog, catalog, facade, invalidator, engine)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => {
            let ctx = Arc::new(build_context(&config));
            let scheduler = jobs::build_scheduler(&config.scheduler, ctx);

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received");
                    let _ = shutdown_tx.send(true);
                }
            });

            println!("🕹️  Arcadia sync pipeline running (ctrl-c to stop)...");
            scheduler.run(shutdown_rx).await;
            println!("✅ Pipeline stopped");
        }
        Commands::FetchCatalog { limit } => {
            let mut ctx = build_context(&config);
            if let Some(limit) = limit {
                ctx.top_games_limit = limit;
            }
            match jobs::fetch_catalog(Arc::new(ctx)).await {
                Ok(()) => println!("✅ Catalog fetch completed"),
                Err(e) => {
                    error!("catalog fetch failed: {e}");
                    println!("❌ Catalog fetch failed: {e}");
                }
            }
        }
        Commands::Moderate => {
            let ctx = Arc::new(build_context(&config));
            match ctx.engine.process_pending().await {
                Ok(stats) => {
                    println!("📋 Moderation pass results:");
                    println!("   Processed: {}", stats.processed);
                    println!("   Approved: {}", stats.approved);
                    println!("   Rejected: {}", stats.rejected);
                    println!("   Needs review: {}", stats.needs_review);
                    println!("   Errors: {}", stats.errors);
                }
                Err(e) => {
                    error!("moderation pass failed: {e}");
                    println!("❌ Moderation pass failed: {e}");
                }
            }
        }
        Commands::CompanyCheck { name } => {
            let ctx = build_context(&config);
            match ctx.catalog.company_exists(&name).await {
                Ok(true) => println!("✅ '{name}' exists in the catalog"),
                Ok(false) => println!("ℹ️  '{name}' not found in the catalog"),
                Err(e) => {
                    error!("company check failed: {e}");
                    println!("❌ Company check failed: {e}");
                }
            }
        }
    }
    Ok(())
}
