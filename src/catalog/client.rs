use crate::catalog::token::TokenCache;
use crate::catalog::types::{CatalogGame, RawGame, RawNamed};
use crate::config::CatalogConfig;
use crate::error::{Result, SyncError};
use crate::observability;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Fields requested on every game query; keep in sync with `types::RawGame`.
const GAME_FIELDS: &str = "fields id,name,summary,rating,rating_count,first_release_date,\
cover.url,screenshots.url,websites.url,websites.category,genres.name,\
involved_companies.company.name,involved_companies.developer,involved_companies.publisher,\
involved_companies.porting,involved_companies.supporting;";

pub struct ExchangedToken {
    pub access_token: String,
    pub expires_in: i64,
}

/// Seam for the client-credentials token exchange so token flow is testable
/// without a live auth endpoint.
#[async_trait]
pub trait AuthExchange: Send + Sync {
    async fn exchange(&self) -> Result<ExchangedToken>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

pub struct ClientCredentialsExchange {
    http: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentialsExchange {
    pub fn new(http: reqwest::Client, config: &CatalogConfig) -> Self {
        Self {
            http,
            auth_url: config.auth_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }
}

#[async_trait]
impl AuthExchange for ClientCredentialsExchange {
    async fn exchange(&self) -> Result<ExchangedToken> {
        let response = self
            .http
            .post(&self.auth_url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| SyncError::TokenExchangeFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::TokenExchangeFailed(format!(
                "auth endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::TokenExchangeFailed(e.to_string()))?;

        observability::catalog::token_exchange();
        debug!("exchanged client credentials for a catalog token");
        Ok(ExchangedToken {
            access_token: body.access_token,
            expires_in: body.expires_in,
        })
    }
}

/// Client for the external game catalog.
///
/// Single attempt per request, fail fast: retry/backoff belongs to the
/// scheduled job that called us, not here.
pub struct CatalogClient {
    http: reqwest::Client,
    api_url: String,
    client_id: String,
    tokens: Arc<TokenCache>,
    auth: Arc<dyn AuthExchange>,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Self {
        // Every outbound call must carry a deadline; no deadline-less fallback.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("catalog HTTP client with timeout");
        let auth = Arc::new(ClientCredentialsExchange::new(http.clone(), config));
        Self::with_auth(config, Arc::new(TokenCache::new()), auth)
    }

    pub fn with_auth(
        config: &CatalogConfig,
        tokens: Arc<TokenCache>,
        auth: Arc<dyn AuthExchange>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("catalog HTTP client with timeout");
        Self {
            http,
            api_url: config.api_url.clone(),
            client_id: config.client_id.clone(),
            tokens,
            auth,
        }
    }

    /// Returns a valid bearer token, exchanging credentials only when the
    /// cached token is missing or inside its expiry margin.
    async fn bearer_token(&self) -> Result<String> {
        if let Some(token) = self.tokens.get() {
            return Ok(token);
        }
        let exchanged = self.auth.exchange().await?;
        self.tokens
            .set(&exchanged.access_token, exchanged.expires_in);
        Ok(exchanged.access_token)
    }

    async fn query(&self, endpoint: &str, body: String) -> Result<reqwest::Response> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .post(format!("{}/{}", self.api_url, endpoint))
            .header("Client-ID", &self.client_id)
            .bearer_auth(token)
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::CatalogUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            observability::catalog::fetch_error();
            return Err(SyncError::CatalogUnavailable(format!(
                "{endpoint} returned {}",
                response.status()
            )));
        }
        Ok(response)
    }

    async fn query_games(&self, body: String) -> Result<Vec<CatalogGame>> {
        let response = self.query("games", body).await?;
        let raw: Vec<RawGame> = response
            .json()
            .await
            .map_err(|e| SyncError::CatalogUnavailable(format!("bad games payload: {e}")))?;
        let games: Vec<CatalogGame> = raw.into_iter().map(CatalogGame::from).collect();
        observability::catalog::fetch_success(games.len());
        Ok(games)
    }

    /// Fetches the highest-rated games, used by the full-catalog and
    /// trending jobs.
    #[instrument(skip(self))]
    pub async fn fetch_top_games(&self, limit: usize) -> Result<Vec<CatalogGame>> {
        let body = format!(
            "{GAME_FIELDS} where rating != null & rating_count > 10; sort rating desc; limit {limit};"
        );
        let games = self.query_games(body).await?;
        info!("fetched {} top games from catalog", games.len());
        Ok(games)
    }

    /// Refreshes metadata for games we already track.
    #[instrument(skip(self, ids), fields(ids = ids.len()))]
    pub async fn fetch_game_updates(&self, ids: &[u64]) -> Result<Vec<CatalogGame>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let body = format!("{GAME_FIELDS} where id = ({id_list}); limit {};", ids.len());
        let games = self.query_games(body).await?;
        info!("fetched updates for {} games", games.len());
        Ok(games)
    }

    /// Case-insensitive existence check against the catalog's company
    /// records. Serves the company-lookup facade operation.
    #[instrument(skip(self))]
    pub async fn company_exists(&self, name: &str) -> Result<bool> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SyncError::InvalidInput(
                "company name must not be empty".to_string(),
            ));
        }

        let escaped = trimmed.replace('"', "\\\"");
        let body = format!("fields name; where name ~ \"{escaped}\"; limit 1;");
        let response = self.query("companies", body).await?;
        let matches: Vec<RawNamed> = response
            .json()
            .await
            .map_err(|e| SyncError::CatalogUnavailable(format!("bad companies payload: {e}")))?;
        Ok(!matches.is_empty())
    }
}
