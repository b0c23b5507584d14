//! Entry setup and teardown
//!
//! [`Ampster`] owns the entity registry and one [`EntryRuntime`] per set-up
//! config entry. Setup wires coordinator, sensors, buttons, uploader and
//! automation together; unload reverses it and may be called any number of
//! times. Changing options reloads the entry.

use crate::automation::PriceAutomation;
use crate::buttons::{UpdateNowButton, UploadNowButton};
use crate::config::{Config, EntryOptions, EntrySettings};
use crate::coordinator::{ListenerToken, RefreshCoordinator};
use crate::entity::EntityRegistry;
use crate::error::{AmpsterError, Result};
use crate::fetcher::{HttpPriceFetcher, PriceSource};
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use crate::sensor::{SensorProjector, StaticSensor};
use crate::uploader::DataUploader;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_ENTRY_ID: &str = "default";

/// Everything owned by one loaded entry
pub struct EntryRuntime {
    config: Config,
    settings: EntrySettings,
    source: Arc<dyn PriceSource>,
    coordinator: Arc<RefreshCoordinator>,
    projector: Arc<SensorProjector>,
    uploader: Option<Arc<DataUploader>>,
    listeners: Vec<ListenerToken>,
    /// Entities registered outside the projector
    entity_ids: Vec<String>,
}

impl EntryRuntime {
    pub fn settings(&self) -> &EntrySettings {
        &self.settings
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> Arc<RefreshCoordinator> {
        self.coordinator.clone()
    }

    pub fn uploader(&self) -> Option<Arc<DataUploader>> {
        self.uploader.clone()
    }
}

pub struct Ampster {
    registry: Arc<EntityRegistry>,
    entries: Mutex<HashMap<String, EntryRuntime>>,
    logger: StructuredLogger,
}

impl Default for Ampster {
    fn default() -> Self {
        Self::new()
    }
}

impl Ampster {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(EntityRegistry::new()),
            entries: Mutex::new(HashMap::new()),
            logger: get_logger("integration"),
        }
    }

    pub fn registry(&self) -> Arc<EntityRegistry> {
        self.registry.clone()
    }

    fn entry_logger(component: &str, entry_id: &str) -> StructuredLogger {
        get_logger_with_context(LogContext::new(component).with_entry_id(entry_id))
    }

    /// Set up an entry fetching over HTTP
    pub async fn setup_entry(&self, entry_id: &str, config: &Config) -> Result<()> {
        let source: Arc<dyn PriceSource> = Arc::new(HttpPriceFetcher::new(&config.http)?);
        self.setup_entry_with_source(entry_id, config, source).await
    }

    /// Set up an entry with the given price source
    ///
    /// Fails with [`AmpsterError::NotReady`] when the first refresh fails; in
    /// that case nothing is registered and no timer is started.
    pub async fn setup_entry_with_source(
        &self,
        entry_id: &str,
        config: &Config,
        source: Arc<dyn PriceSource>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(entry_id) {
            return Err(AmpsterError::config(format!(
                "Entry '{}' is already set up",
                entry_id
            )));
        }
        config.validate()?;
        let settings = config.settings();

        let coordinator = Arc::new(RefreshCoordinator::new(
            settings.price_url(),
            source.clone(),
            Self::entry_logger("coordinator", entry_id),
        ));
        coordinator.first_refresh().await?;
        let uploader = Arc::new(DataUploader::new(
            settings.upload.clone(),
            &config.http,
            self.registry.clone(),
            Self::entry_logger("uploader", entry_id),
        )?);

        let mut listeners = Vec::new();
        let mut entity_ids = Vec::new();

        let projector = Arc::new(SensorProjector::new(
            &coordinator,
            self.registry.clone(),
            Self::entry_logger("sensor", entry_id),
        ));
        projector.sync();
        listeners.push(coordinator.add_listener(projector.clone()));

        if self
            .registry
            .register(Arc::new(StaticSensor::new(coordinator.clone())))
        {
            entity_ids.push(crate::sensor::STATIC_SENSOR_ID.to_string());
        }

        let update = Arc::new(UpdateNowButton::new(
            coordinator.clone(),
            Self::entry_logger("button", entry_id),
        ));
        if self.registry.register_button(update) {
            entity_ids.push(crate::buttons::UPDATE_NOW_ID.to_string());
        }

        let uploader = if uploader.start() {
            let button = Arc::new(UploadNowButton::new(
                uploader.clone(),
                Self::entry_logger("button", entry_id),
            ));
            if self.registry.register_button(button) {
                entity_ids.push(crate::buttons::UPLOAD_NOW_ID.to_string());
            }
            Some(uploader)
        } else {
            None
        };

        if config.automation.enabled {
            let automation = Arc::new(PriceAutomation::new(
                config.automation.clone(),
                &coordinator,
                self.registry.clone(),
                Self::entry_logger("automation", entry_id),
            ));
            automation.evaluate();
            listeners.push(coordinator.add_listener(automation));
        }

        coordinator.start_schedule(settings.minute, settings.country.timezone());

        self.logger.info(&format!(
            "Entry '{}' set up for {} (refresh at minute {}, upload {})",
            entry_id,
            settings.country,
            settings.minute,
            if uploader.is_some() { "enabled" } else { "disabled" }
        ));

        entries.insert(
            entry_id.to_string(),
            EntryRuntime {
                config: config.clone(),
                settings,
                source,
                coordinator,
                projector,
                uploader,
                listeners,
                entity_ids,
            },
        );
        Ok(())
    }

    /// Tear an entry down; false when it was not loaded
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let Some(runtime) = self.entries.lock().await.remove(entry_id) else {
            self.logger
                .debug(&format!("Entry '{}' not loaded; nothing to unload", entry_id));
            return false;
        };
        self.teardown(entry_id, runtime);
        true
    }

    fn teardown(&self, entry_id: &str, runtime: EntryRuntime) {
        runtime.coordinator.shutdown();
        if let Some(uploader) = &runtime.uploader {
            uploader.stop();
        }
        for token in &runtime.listeners {
            runtime.coordinator.remove_listener(*token);
        }
        for id in runtime
            .projector
            .entity_ids()
            .iter()
            .chain(runtime.entity_ids.iter())
        {
            self.registry.remove(id);
        }
        self.logger.info(&format!("Entry '{}' unloaded", entry_id));
    }

    /// Unload and set up again with `config`
    pub async fn reload_entry(&self, entry_id: &str, config: &Config) -> Result<()> {
        let source = {
            let mut entries = self.entries.lock().await;
            let runtime = entries.remove(entry_id).ok_or_else(|| {
                AmpsterError::config(format!("Entry '{}' is not set up", entry_id))
            })?;
            let source = runtime.source.clone();
            self.teardown(entry_id, runtime);
            source
        };
        self.setup_entry_with_source(entry_id, config, source).await
    }

    /// Apply new options; reloads when they differ. Returns whether a reload happened
    pub async fn update_options(&self, entry_id: &str, options: EntryOptions) -> Result<bool> {
        let mut config = self
            .config(entry_id)
            .await
            .ok_or_else(|| AmpsterError::config(format!("Entry '{}' is not set up", entry_id)))?;
        if config.options == options {
            return Ok(false);
        }
        config.options = options;
        config.validate()?;
        self.logger
            .info(&format!("Options changed for entry '{}'; reloading", entry_id));
        self.reload_entry(entry_id, &config).await?;
        Ok(true)
    }

    /// Unload every entry
    pub async fn unload_all(&self) -> usize {
        let drained: Vec<(String, EntryRuntime)> = self.entries.lock().await.drain().collect();
        let count = drained.len();
        for (entry_id, runtime) in drained {
            self.teardown(&entry_id, runtime);
        }
        count
    }

    pub async fn is_loaded(&self, entry_id: &str) -> bool {
        self.entries.lock().await.contains_key(entry_id)
    }

    pub async fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn config(&self, entry_id: &str) -> Option<Config> {
        self.entries
            .lock()
            .await
            .get(entry_id)
            .map(|r| r.config.clone())
    }

    pub async fn settings(&self, entry_id: &str) -> Option<EntrySettings> {
        self.entries
            .lock()
            .await
            .get(entry_id)
            .map(|r| r.settings.clone())
    }

    pub async fn coordinator(&self, entry_id: &str) -> Option<Arc<RefreshCoordinator>> {
        self.entries
            .lock()
            .await
            .get(entry_id)
            .map(EntryRuntime::coordinator)
    }

    pub async fn uploader(&self, entry_id: &str) -> Option<Arc<DataUploader>> {
        self.entries
            .lock()
            .await
            .get(entry_id)
            .and_then(EntryRuntime::uploader)
    }
}
