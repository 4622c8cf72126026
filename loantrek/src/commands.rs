use anyhow::{Context, bail};
use loantrek::api::ApiClient;
use loantrek::config::{AppConfig, INTERVAL_PRESETS, SettingsService};
use loantrek::notification::{
    HttpOverdueQuery, LocalReadMarkStore, MarkAllScope, NotificationPhase,
    NotificationReconciler, RefreshOutcome,
};
use loantrek::scheduler::PollScheduler;
use loantrek::storage::FileKeyValueStore;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::output::{OutputManager, format_duration};

type Reconciler = NotificationReconciler<HttpOverdueQuery, LocalReadMarkStore<FileKeyValueStore>>;

pub struct CommandExecutor {
    config: AppConfig,
    client: Arc<ApiClient>,
    reconciler: Arc<Reconciler>,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let client = ApiClient::new(
            &config.api_url,
            config.endpoints.clone(),
            config.request_timeout,
        )
        .with_context(|| format!("Failed to create API client for {}", config.api_url))?;
        let client = Arc::new(client);

        let kv = Arc::new(FileKeyValueStore::new(config.state_file.clone()));
        debug!(
            api_url = %client.base_url(),
            state_file = %kv.path().display(),
            "Command executor ready"
        );

        let store = Arc::new(LocalReadMarkStore::new(kv));
        let query = Arc::new(HttpOverdueQuery::new(Arc::clone(&client)));
        let reconciler = Arc::new(
            NotificationReconciler::new(query, store).with_mark_all_scope(config.mark_all_scope),
        );

        Ok(Self {
            config,
            client,
            reconciler,
            output: OutputManager::new(std::io::stdout().is_terminal()),
        })
    }

    /// Refresh once; a one-shot command has nothing to show without a list.
    async fn load_notifications(&self) -> anyhow::Result<()> {
        if self.reconciler.refresh().await == RefreshOutcome::Failed {
            let snapshot = self.reconciler.snapshot();
            bail!(
                "Failed to load overdue loans: {}",
                snapshot.last_error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }

    pub async fn status(&self, json: bool) -> anyhow::Result<()> {
        self.load_notifications().await?;
        let snapshot = self.reconciler.snapshot();

        if json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            print!("{}", self.output.format_snapshot(&snapshot));
        }
        Ok(())
    }

    pub async fn mark_read(&self, id: &str) -> anyhow::Result<()> {
        self.load_notifications().await?;
        self.reconciler
            .mark_read(id)
            .await
            .context("Failed to save read marks")?;

        let snapshot = self.reconciler.snapshot();
        println!(
            "Marked {id} as read, {} unread remaining",
            snapshot.unread_count
        );
        Ok(())
    }

    pub async fn mark_all_read(&self) -> anyhow::Result<()> {
        self.load_notifications().await?;
        let added = self
            .reconciler
            .mark_all_read()
            .await
            .context("Failed to save read marks")?;

        match self.reconciler.mark_all_scope() {
            MarkAllScope::Displayed => {
                println!("Marked {added} displayed notification(s) as read")
            }
            MarkAllScope::All => println!("Marked {added} notification(s) as read"),
        }
        Ok(())
    }

    pub async fn clear_read(&self) -> anyhow::Result<()> {
        let outcome = self
            .reconciler
            .clear_read_marks()
            .await
            .context("Failed to clear read marks")?;

        println!("Cleared all read marks");
        if outcome == RefreshOutcome::Updated {
            println!("{}", self.output.format_badge(&self.reconciler.snapshot()));
        }
        Ok(())
    }

    pub async fn show_settings(&self) -> anyhow::Result<()> {
        let service = SettingsService::new(Arc::clone(&self.client));
        let settings = service
            .get_settings()
            .await
            .context("Failed to load settings")?;
        let effective = loantrek::config::resolve_poll_interval(settings.check_interval_hours);

        print!("{}", self.output.format_settings(&settings, effective));
        Ok(())
    }

    pub async fn set_interval(&self, hours: f64) -> anyhow::Result<()> {
        let service = SettingsService::new(Arc::clone(&self.client));
        let interval = service
            .update_interval_hours(hours)
            .await
            .context("Failed to update check interval")?;

        println!(
            "Check interval set to {hours} hour(s), polling every {}",
            format_duration(interval)
        );
        Ok(())
    }

    pub async fn presets(&self) -> anyhow::Result<()> {
        let current = match self.client.settings().await {
            Ok(settings) => settings.check_interval_hours,
            Err(e) => {
                debug!(error = %e, "Could not load current settings for presets");
                None
            }
        };

        print!("{}", self.output.format_presets(INTERVAL_PRESETS, current));
        Ok(())
    }

    pub async fn stats(&self, json: bool) -> anyhow::Result<()> {
        let stats = self
            .client
            .stats()
            .await
            .context("Failed to load statistics")?;

        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            print!("{}", self.output.format_stats(&stats));
        }
        Ok(())
    }

    /// Poll until Ctrl-C, following check interval changes on the service.
    pub async fn watch(&self) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();

        let settings = Arc::new(SettingsService::new(Arc::clone(&self.client)));
        let interval = settings.poll_interval().await;

        let scheduler = Arc::new(PollScheduler::with_cancellation(
            self.reconciler.clone(),
            cancel.child_token(),
        ));
        let listener = scheduler.spawn_settings_listener(settings.subscribe());
        let settings_watch =
            settings.spawn_watch(self.config.settings_refresh, cancel.child_token());

        let retention = self
            .config
            .log_dir
            .clone()
            .map(|dir| loantrek::logging::start_retention_cleanup(dir, cancel.child_token()));

        info!(
            interval = %format_duration(interval),
            settings_refresh = %format_duration(self.config.settings_refresh),
            "Watching for overdue loans"
        );
        scheduler.start(interval);

        let mut snapshots = self.reconciler.subscribe();
        let mut last_badge: Option<(NotificationPhase, usize)> = None;

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                    info!("Shutdown requested");
                    break;
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    let badge = (snapshot.phase, snapshot.unread_count);
                    if last_badge != Some(badge) {
                        println!("{}", self.output.format_badge(&snapshot));
                        last_badge = Some(badge);
                    }
                }
            }
        }

        scheduler.shutdown();
        cancel.cancel();
        if let Err(e) = listener.await {
            warn!(error = %e, "Settings listener task failed");
        }
        if let Err(e) = settings_watch.await {
            warn!(error = %e, "Settings watch task failed");
        }
        if let Some(handle) = retention {
            if let Err(e) = handle.await {
                warn!(error = %e, "Log retention task failed");
            }
        }
        Ok(())
    }
}
