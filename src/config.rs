use crate::error::{Result, SyncError};
use std::env;

/// Runtime configuration, loaded from the environment (a local `.env` file is
/// honored for development).
#[derive(Debug, Clone)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub moderation: ModerationConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub top_games_limit: usize,
    pub trending_limit: usize,
    pub update_batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub api_key: String,
    pub api_url: String,
    pub moderation_model: String,
    pub vision_model: String,
    pub max_vision_tokens: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub fetch_catalog_interval_secs: u64,
    pub trending_interval_secs: u64,
    pub game_info_interval_secs: u64,
    pub moderation_interval_secs: u64,
    pub job_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| SyncError::Config(format!("missing environment variable {name}")))
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| SyncError::Config(format!("could not parse {name}='{raw}'"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            catalog: CatalogConfig {
                client_id: required("CATALOG_CLIENT_ID")?,
                client_secret: required("CATALOG_CLIENT_SECRET")?,
                auth_url: parsed_or(
                    "CATALOG_AUTH_URL",
                    "https://id.twitch.tv/oauth2/token".to_string(),
                )?,
                api_url: parsed_or("CATALOG_API_URL", "https://api.igdb.com/v4".to_string())?,
                request_timeout_secs: parsed_or("CATALOG_TIMEOUT_SECS", 15)?,
                top_games_limit: parsed_or("CATALOG_TOP_GAMES_LIMIT", 500)?,
                trending_limit: parsed_or("CATALOG_TRENDING_LIMIT", 50)?,
                update_batch_size: parsed_or("CATALOG_UPDATE_BATCH_SIZE", 100)?,
            },
            moderation: ModerationConfig {
                api_key: required("MODERATION_API_KEY")?,
                api_url: parsed_or("MODERATION_API_URL", "https://api.openai.com/v1".to_string())?,
                moderation_model: parsed_or(
                    "MODERATION_MODEL",
                    "omni-moderation-latest".to_string(),
                )?,
                vision_model: parsed_or("VISION_MODEL", "gpt-4o-mini".to_string())?,
                max_vision_tokens: parsed_or("VISION_MAX_TOKENS", 500)?,
                request_timeout_secs: parsed_or("MODERATION_TIMEOUT_SECS", 30)?,
            },
            cache: CacheConfig {
                redis_url: parsed_or("REDIS_URL", "redis://127.0.0.1:6379".to_string())?,
                default_ttl_secs: parsed_or("CACHE_TTL_SECS", 300)?,
            },
            scheduler: SchedulerConfig {
                fetch_catalog_interval_secs: parsed_or("FETCH_CATALOG_INTERVAL_SECS", 6 * 60 * 60)?,
                trending_interval_secs: parsed_or("TRENDING_INTERVAL_SECS", 60 * 60)?,
                game_info_interval_secs: parsed_or("GAME_INFO_INTERVAL_SECS", 12 * 60 * 60)?,
                moderation_interval_secs: parsed_or("MODERATION_INTERVAL_SECS", 5 * 60)?,
                job_timeout_secs: parsed_or("JOB_TIMEOUT_SECS", 10 * 60)?,
                shutdown_grace_secs: parsed_or("SHUTDOWN_GRACE_SECS", 30)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_or_falls_back_to_default() {
        std::env::remove_var("ARCADIA_TEST_UNSET");
        let v: u64 = parsed_or("ARCADIA_TEST_UNSET", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parsed_or_rejects_garbage() {
        std::env::set_var("ARCADIA_TEST_GARBAGE", "not-a-number");
        let v: Result<u64> = parsed_or("ARCADIA_TEST_GARBAGE", 1);
        assert!(v.is_err());
        std::env::remove_var("ARCADIA_TEST_GARBAGE");
    }
}
