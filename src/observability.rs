//! Pipeline health metrics.
//!
//! Thin helpers over the `metrics` macros so call sites never deal with
//! metric names directly. Counters follow Prometheus naming conventions
//! under the `arcadia_` prefix.

pub mod catalog {
    pub fn fetch_success(games: usize) {
        metrics::counter!("arcadia_catalog_requests_success_total").increment(1);
        metrics::histogram!("arcadia_catalog_games_fetched").record(games as f64);
    }

    pub fn fetch_error() {
        metrics::counter!("arcadia_catalog_requests_error_total").increment(1);
    }

    pub fn token_exchange() {
        metrics::counter!("arcadia_catalog_token_exchanges_total").increment(1);
    }
}

pub mod moderation {
    pub fn outcome(status: &str) {
        metrics::counter!("arcadia_moderation_outcome_total", "status" => status.to_string())
            .increment(1);
    }

    pub fn batch_size(records: usize) {
        metrics::histogram!("arcadia_moderation_batch_size").record(records as f64);
    }
}

pub mod cache {
    pub fn keys_purged(count: u64) {
        metrics::counter!("arcadia_cache_keys_purged_total").increment(count);
    }

    pub fn purge_error() {
        metrics::counter!("arcadia_cache_purge_errors_total").increment(1);
    }
}

pub mod scheduler {
    pub fn job_success(job: &str, duration_secs: f64) {
        metrics::counter!("arcadia_scheduler_job_success_total", "job" => job.to_string())
            .increment(1);
        metrics::histogram!("arcadia_scheduler_job_duration_seconds", "job" => job.to_string())
            .record(duration_secs);
    }

    pub fn job_error(job: &str) {
        metrics::counter!("arcadia_scheduler_job_error_total", "job" => job.to_string())
            .increment(1);
    }

    pub fn tick_skipped(job: &str) {
        metrics::counter!("arcadia_scheduler_ticks_skipped_total", "job" => job.to_string())
            .increment(1);
    }
}
