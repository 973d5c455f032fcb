//! Configuration file watcher for hot reload.
//!
//! # Responsibilities
//! - Watch the config file with `notify`
//! - Skip events that leave the file content unchanged
//! - Deliver every re-read as a [`ConfigUpdate`], rejected ones included
//!
//! # Design Decisions
//! - Editors fire several modify/create events per save; the last text
//!   seen is remembered and identical content is not re-parsed
//! - A rejected file still counts as seen, so the same broken content is
//!   reported once, and fixing it back to the applied text is a change
//! - The receiver decides what to do with a rejection; the running
//!   configuration is never touched here

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::GatewayConfig;
use crate::observability::metrics;

/// Result of re-reading the config file after a change.
pub type ConfigUpdate = Result<GatewayConfig, ConfigError>;

/// Tracks the last file content seen so repeated events collapse.
#[derive(Debug, Default)]
pub struct ReloadState {
    last_seen: Option<String>,
}

impl ReloadState {
    /// Seed with the content the running configuration was loaded from.
    pub fn seeded(content: String) -> Self {
        Self {
            last_seen: Some(content),
        }
    }

    /// Handle freshly read content. `None` when nothing changed.
    pub fn on_content(&mut self, content: String) -> Option<ConfigUpdate> {
        if self.last_seen.as_deref() == Some(content.as_str()) {
            metrics::record_config_reload("unchanged");
            return None;
        }
        let update = parse_config(&content);
        metrics::record_config_reload(if update.is_ok() { "accepted" } else { "rejected" });
        self.last_seen = Some(content);
        Some(update)
    }
}

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ConfigUpdate>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for re-read configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ConfigUpdate>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for updates to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let mut state = std::fs::read_to_string(&path)
            .map(ReloadState::seeded)
            .unwrap_or_default();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let update = match std::fs::read_to_string(&path) {
                        Ok(content) => state.on_content(content),
                        Err(e) => Some(Err(ConfigError::Io(e))),
                    };
                    if let Some(update) = update {
                        tracing::info!(path = ?path, "Config file changed");
                        let _ = tx.send(update);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
