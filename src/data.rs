use std::{ops::Deref, sync::Arc};

use crate::config::BotConfig;
use crate::gateway::{CachePermissionOracle, DiscordGateway};
use crate::media_only::{ContentGate, HttpMediaProbe};
use crate::moderation::{ExpiryRequest, ModerationService, RecordStore, spawn_expiry_task};
use crate::Error;
use poise::serenity_prelude as serenity;
use tokio::sync::mpsc::Sender;
use tracing::{error, info};

/// Shared bot state handed to every command and event
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

pub struct DataInner {
    pub config: BotConfig,
    pub moderation: ModerationService,
    /// Channel to the expiry task
    pub expiry_tx: Sender<ExpiryRequest>,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("guild_id", &self.config.guild_id)
            .field("data_file", &self.config.data_file)
            .field("store", self.moderation.store())
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    #[must_use]
    pub fn new(
        config: BotConfig,
        moderation: ModerationService,
        expiry_tx: Sender<ExpiryRequest>,
    ) -> Self {
        Self(Arc::new(DataInner {
            config,
            moderation,
            expiry_tx,
        }))
    }

    /// Open the record store, wire the moderation service to Discord and
    /// start the expiry task
    ///
    /// # Errors
    /// Returns an error if the record file cannot be loaded or the HTTP probe
    /// cannot be built
    pub async fn connect(
        config: BotConfig,
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
    ) -> Result<Self, Error> {
        let store = RecordStore::open(&config.data_file).await?;
        info!("Opened record store: {store:?}");

        let probe = HttpMediaProbe::new(config.probe_timeout())?;
        let gate = ContentGate::new(Arc::new(probe), config.probe_failure_policy);
        let gateway = DiscordGateway::new(
            http,
            cache.clone(),
            config.alert_channel_id,
            config.changelog_channel_id,
            config.mute_role_id,
        );
        let moderation = ModerationService::new(
            config.guild_id,
            store,
            gate,
            Arc::new(gateway),
            Arc::new(CachePermissionOracle::new(cache)),
        );

        let (expiry_tx, _handle) =
            spawn_expiry_task(moderation.clone(), config.expiry_check_interval());

        Ok(Self::new(config, moderation, expiry_tx))
    }

    /// Ask the expiry task for an immediate pass
    pub async fn request_expiry_check(&self) {
        if let Err(e) = self.expiry_tx.send(ExpiryRequest::CheckAll).await {
            error!("Failed to send expiry check request: {e}");
        }
    }

    /// Stop the expiry task and write the records out
    pub async fn shutdown(&self) {
        if let Err(e) = self.expiry_tx.send(ExpiryRequest::Shutdown).await {
            error!("Failed to stop expiry task: {e}");
        }
        if let Err(e) = self.moderation.store().flush().await {
            error!("Failed to flush records on shutdown: {e}");
        }
    }
}
