pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod facade;
pub mod jobs;
pub mod logging;
pub mod moderation;
pub mod observability;
pub mod scheduler;
