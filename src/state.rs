//! Application state management

use std::sync::Arc;

use crate::cfi::Blacklist;
use crate::config::Config;

/// Shared application state
///
/// Requests never share documents; each one parses its own arena, so the
/// configuration is all there is to share.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Configured blacklist merged with one supplied by a request
    pub fn blacklist(&self, extra: Option<&Blacklist>) -> Blacklist {
        let base = &self.inner.config.engine.blacklist;
        match extra {
            Some(extra) => base.merge(extra),
            None => base.clone(),
        }
    }
}
