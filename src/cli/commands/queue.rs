//! Queue management commands.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::args::OutputFormat;
use crate::config::{Config, Paths};
use crate::error::SyncqError;
use crate::output::{format_actions, format_drain, format_stats, to_json};
use crate::queue::{
    ActionType, DispatchTable, EnqueueOptions, ProcessorOptions, QueueProcessor, QueueStore,
};
use crate::storage::{default_backend, KvBackend};

/// Data directory, configuration and storage shared by every command.
pub struct Context {
    /// Resolved data paths.
    pub paths: Paths,
    /// Loaded configuration.
    pub config: Config,
    backend: Arc<dyn KvBackend>,
}

impl Context {
    /// Resolve the data directory, load `config.yaml` and open storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the config
    /// file cannot be parsed.
    pub fn load(home: Option<PathBuf>) -> Result<Self, SyncqError> {
        let (paths, config) = Self::resolve(home)?;
        Ok(Self::open(paths, config))
    }

    /// Resolve the data directory and load `config.yaml` without touching
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the config
    /// file cannot be parsed.
    pub fn resolve(home: Option<PathBuf>) -> Result<(Paths, Config), SyncqError> {
        let paths = match home {
            Some(root) => Paths::with_root(root),
            None => Paths::new()?,
        };
        paths.ensure_dirs()?;
        let config = Config::load_from_path(&paths.config_file)?;
        Ok((paths, config))
    }

    /// Open storage under `paths`.
    #[must_use]
    pub fn open(paths: Paths, config: Config) -> Self {
        let backend = default_backend(&paths);
        Self {
            paths,
            config,
            backend,
        }
    }

    /// Open the queue. Commands that only inspect or edit the queue open it
    /// unreachable so nothing is sent behind their back.
    async fn processor(&self, dispatch: DispatchTable, reachable: bool) -> QueueProcessor {
        let store = QueueStore::new(self.backend.clone(), self.config.queue.storage_key.clone())
            .with_lock_file(self.paths.lock_file.clone());
        QueueProcessor::with_options(
            store,
            dispatch,
            ProcessorOptions {
                policy: self.config.queue.retry_policy(),
                sync_tag: self.config.queue.background_sync_tag.clone(),
                reachable,
                ..ProcessorOptions::default()
            },
        )
        .await
    }

    async fn offline(&self) -> QueueProcessor {
        self.processor(DispatchTable::new(), false).await
    }
}

/// Show queue status.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub async fn status(ctx: &Context, format: OutputFormat) -> Result<String, SyncqError> {
    let queue = ctx.offline().await;
    format_stats(&queue.stats().await, ctx.backend.name(), format)
}

/// List queued actions in dispatch order.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub async fn list(ctx: &Context, format: OutputFormat) -> Result<String, SyncqError> {
    let queue = ctx.offline().await;
    format_actions(&queue.list_pending().await, format)
}

/// Queue an action.
///
/// # Errors
///
/// Returns an error if `data` is not valid JSON.
pub async fn add(
    ctx: &Context,
    action_type: &str,
    data: Option<&str>,
    priority: Option<i32>,
    format: OutputFormat,
) -> Result<String, SyncqError> {
    let data: serde_json::Value = match data {
        Some(raw) => serde_json::from_str(raw)?,
        None => serde_json::json!({}),
    };
    let action_type = ActionType::from(action_type);
    if !action_type.is_known() {
        tracing::warn!(action_type = %action_type, "queueing unknown action type");
    }

    let queue = ctx.offline().await;
    let id = queue
        .enqueue(action_type.clone(), data, EnqueueOptions { priority })
        .await;
    let total = queue.count().await;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "id": id,
            "type": action_type,
            "pending": total,
        })),
        OutputFormat::Pretty => Ok(format!("Queued {action_type} ({id}), {total} pending")),
    }
}

/// Remove a queued action.
///
/// # Errors
///
/// Returns `SyncqError::NotFound` if no action has that ID.
pub async fn remove(ctx: &Context, id: &str, format: OutputFormat) -> Result<String, SyncqError> {
    let queue = ctx.offline().await;
    if !queue.remove(id).await {
        return Err(SyncqError::NotFound(format!("action {id}")));
    }

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({ "removed": id })),
        OutputFormat::Pretty => Ok(format!("Removed {id}")),
    }
}

/// Remove every queued action.
///
/// # Errors
///
/// Returns an error unless `force` is set.
pub async fn clear(ctx: &Context, force: bool, format: OutputFormat) -> Result<String, SyncqError> {
    if !force {
        return Err(SyncqError::Config(
            "Use --force to clear the queue".to_string(),
        ));
    }
    let queue = ctx.offline().await;
    let cleared = queue.clear().await;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({ "cleared": cleared })),
        OutputFormat::Pretty => Ok(format!("Cleared {cleared} actions from queue")),
    }
}

/// Run one drain against the HTTP remote.
///
/// Actions that fail with a retryable error keep their incremented retry
/// count and are attempted again by the next drain.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub async fn drain(
    ctx: &Context,
    url: Option<String>,
    format: OutputFormat,
) -> Result<String, SyncqError> {
    let mut remote = ctx.config.remote.clone();
    if let Some(url) = url {
        remote.base_url = url;
    }
    tracing::debug!(base_url = %remote.base_url, "draining queue");

    let queue = ctx.processor(DispatchTable::http(&remote)?, true).await;
    let report = queue.drain_now().await;
    format_drain(report.as_ref(), format)
}
