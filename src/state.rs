//! Application state shared with every handler through Axum's State extractor

use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::{config::Config, services::SubmissionService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    service: Arc<SubmissionService>,
    /// Only used for rate limiting
    redis: Option<ConnectionManager>,
    config: Config,
}

impl AppState {
    pub fn new(
        service: Arc<SubmissionService>,
        redis: Option<ConnectionManager>,
        config: Config,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                service,
                redis,
                config,
            }),
        }
    }

    /// The submission lifecycle coordinator
    pub fn service(&self) -> &SubmissionService {
        &self.inner.service
    }

    /// Clone of the Redis connection manager, if configured
    pub fn redis(&self) -> Option<ConnectionManager> {
        self.inner.redis.clone()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
