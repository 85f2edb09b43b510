//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::AppConfig;
use crate::cost::PatternCostEstimator;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<AppConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Config file change detected, reloading");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded configurations until the channel closes.
///
/// Cost rules take effect immediately. Rules removed from the file keep
/// their last cost. Every other setting is fixed at startup, so a change to
/// one is only reported.
pub async fn apply_updates(
    mut current: AppConfig,
    estimator: &PatternCostEstimator,
    mut updates: mpsc::UnboundedReceiver<AppConfig>,
) {
    while let Some(next) = updates.recv().await {
        next.apply_costs(estimator);
        tracing::info!(rules = next.costs.len(), patterns = estimator.len(), "Cost rules reloaded");

        if next.limits != current.limits {
            tracing::warn!(
                max_concurrency = next.limits.max_concurrency,
                max_burst = next.limits.max_burst,
                max_queue_duration_ms = next.limits.max_queue_duration_ms,
                "Limit changes require a restart"
            );
        }
        if next.listener != current.listener
            || next.upstream != current.upstream
            || next.timeouts != current.timeouts
            || next.observability != current.observability
        {
            tracing::warn!("Listener, upstream, timeout and observability changes require a restart");
        }

        current = next;
    }
}
