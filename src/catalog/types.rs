//! Wire shapes returned by the catalog API and their mapping into internal
//! records. The raw shapes stay private to this module so the rest of the
//! pipeline only ever sees `CatalogGame`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal representation of a catalog game, flattened from the nested
/// catalog response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogGame {
    pub igdb_id: u64,
    pub name: String,
    pub summary: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<u32>,
    pub first_release_date: Option<DateTime<Utc>>,
    pub cover_url: Option<String>,
    pub screenshot_urls: Vec<String>,
    pub websites: Vec<Website>,
    pub genres: Vec<String>,
    pub companies: Vec<CompanyCredit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Website {
    pub url: String,
    pub category: WebsiteCategory,
}

/// Fixed mapping for the catalog's numeric website category codes.
/// Codes we do not recognize are preserved rather than dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WebsiteCategory {
    Official,
    Wikia,
    Wikipedia,
    Facebook,
    Twitter,
    Twitch,
    Instagram,
    Youtube,
    Iphone,
    Ipad,
    Android,
    Steam,
    Reddit,
    Itch,
    EpicGames,
    Gog,
    Discord,
    Unknown(u32),
}

impl WebsiteCategory {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Official,
            2 => Self::Wikia,
            3 => Self::Wikipedia,
            4 => Self::Facebook,
            5 => Self::Twitter,
            6 => Self::Twitch,
            8 => Self::Instagram,
            9 => Self::Youtube,
            10 => Self::Iphone,
            11 => Self::Ipad,
            12 => Self::Android,
            13 => Self::Steam,
            14 => Self::Reddit,
            15 => Self::Itch,
            16 => Self::EpicGames,
            17 => Self::Gog,
            18 => Self::Discord,
            other => Self::Unknown(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Wikia => "wikia",
            Self::Wikipedia => "wikipedia",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
            Self::Twitch => "twitch",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::Iphone => "iphone",
            Self::Ipad => "ipad",
            Self::Android => "android",
            Self::Steam => "steam",
            Self::Reddit => "reddit",
            Self::Itch => "itch",
            Self::EpicGames => "epicgames",
            Self::Gog => "gog",
            Self::Discord => "discord",
            Self::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompanyRole {
    Developer,
    Publisher,
    Porting,
    Supporting,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyCredit {
    pub name: String,
    pub role: CompanyRole,
}

// ---- raw catalog response shapes ----

#[derive(Debug, Deserialize)]
pub(crate) struct RawGame {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub rating_count: Option<u32>,
    #[serde(default)]
    pub first_release_date: Option<i64>,
    #[serde(default)]
    pub cover: Option<RawImage>,
    #[serde(default)]
    pub screenshots: Vec<RawImage>,
    #[serde(default)]
    pub websites: Vec<RawWebsite>,
    #[serde(default)]
    pub genres: Vec<RawNamed>,
    #[serde(default)]
    pub involved_companies: Vec<RawInvolvedCompany>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawImage {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawWebsite {
    pub url: String,
    pub category: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawNamed {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawInvolvedCompany {
    pub company: RawNamed,
    #[serde(default)]
    pub developer: bool,
    #[serde(default)]
    pub publisher: bool,
    #[serde(default)]
    pub porting: bool,
    #[serde(default)]
    pub supporting: bool,
}

/// The catalog serves protocol-relative thumbnail URLs; normalize to https
/// and ask for a display-sized rendition.
fn normalize_image_url(url: &str, size: &str) -> String {
    let with_scheme = if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        url.to_string()
    };
    with_scheme.replace("t_thumb", size)
}

impl RawInvolvedCompany {
    fn role(&self) -> Option<CompanyRole> {
        if self.developer {
            Some(CompanyRole::Developer)
        } else if self.publisher {
            Some(CompanyRole::Publisher)
        } else if self.porting {
            Some(CompanyRole::Porting)
        } else if self.supporting {
            Some(CompanyRole::Supporting)
        } else {
            None
        }
    }
}

impl From<RawGame> for CatalogGame {
    fn from(raw: RawGame) -> Self {
        let first_release_date = raw
            .first_release_date
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        let cover_url = raw
            .cover
            .as_ref()
            .map(|c| normalize_image_url(&c.url, "t_cover_big"));
        let screenshot_urls = raw
            .screenshots
            .iter()
            .map(|s| normalize_image_url(&s.url, "t_screenshot_big"))
            .collect();
        let websites = raw
            .websites
            .into_iter()
            .map(|w| Website {
                url: w.url,
                category: WebsiteCategory::from_code(w.category),
            })
            .collect();
        let genres = raw.genres.into_iter().map(|g| g.name).collect();
        let companies = raw
            .involved_companies
            .into_iter()
            .filter_map(|ic| {
                let role = ic.role()?;
                Some(CompanyCredit {
                    name: ic.company.name,
                    role,
                })
            })
            .collect();

        Self {
            igdb_id: raw.id,
            name: raw.name,
            summary: raw.summary,
            rating: raw.rating,
            rating_count: raw.rating_count,
            first_release_date,
            cover_url,
            screenshot_urls,
            websites,
            genres,
            companies,
        }
    }
}

impl CatalogGame {
    pub fn developer_names(&self) -> Vec<String> {
        self.companies
            .iter()
            .filter(|c| c.role == CompanyRole::Developer)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn publisher_names(&self) -> Vec<String> {
        self.companies
            .iter()
            .filter(|c| c.role == CompanyRole::Publisher)
            .map(|c| c.name.clone())
            .collect()
    }
}
