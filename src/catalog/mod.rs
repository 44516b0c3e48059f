pub mod client;
pub mod token;
pub mod types;

pub use client::{AuthExchange, CatalogClient, ClientCredentialsExchange};
pub use token::{Clock, SystemClock, TokenCache};
pub use types::{CatalogGame, CompanyCredit, CompanyRole, Website, WebsiteCategory};
