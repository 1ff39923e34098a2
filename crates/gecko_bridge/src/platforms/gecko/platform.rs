use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use super::accessory::DeviceContext;
use super::accessory::SpaAccessory;
use super::client::HttpSpaClient;
use super::client::SpaClient;
use super::config::GeckoConfig;
use super::ACCESSORY_NAME;
use super::DEVICE_ID;
use super::DEVICE_UUID_SEED;
use super::PLATFORM_NAME;
use super::PLUGIN_NAME;
use crate::config::PlatformConfig;
use crate::host::DynamicPlatform;
use crate::host::HostApi;
use crate::host::PlatformAccessory;
use crate::host::ToPlatformMessage;

/// The GeckoInTouch2 platform
///
/// Supports exactly one spa. Cached accessories are collected through
/// `configure_accessory`; once the bridge has finished launching, `discover`
/// reuses the cached record for the spa or registers a new one, and hands it
/// to a `SpaAccessory` that does the polling.
pub struct GeckoPlatform<C: SpaClient + 'static = HttpSpaClient> {
    api: HostApi,
    config: GeckoConfig,
    client: Arc<C>,
    accessories: Vec<PlatformAccessory>,
    spa: Option<SpaAccessory<C>>,
}

impl GeckoPlatform<HttpSpaClient> {
    /// Create the platform from its `[[platforms]]` entry
    pub fn new(cfg: &PlatformConfig, api: HostApi) -> anyhow::Result<Self> {
        let config = GeckoConfig::from_platform_config(cfg);
        let client = HttpSpaClient::new(&config.base_url)?;

        info!(
            "[{}] Using spa API at {} (polling every {}s)",
            PLATFORM_NAME, config.base_url, config.polling_interval_sec
        );

        Ok(Self::with_client(config, api, client))
    }
}

impl<C: SpaClient + 'static> GeckoPlatform<C> {
    pub fn with_client(config: GeckoConfig, api: HostApi, client: C) -> Self {
        Self {
            api,
            config,
            client: Arc::new(client),
            accessories: Vec::new(),
            spa: None,
        }
    }

    /// Stable identifier of the (single) spa accessory
    pub fn device_uuid(&self) -> Uuid {
        self.api.generate_uuid(DEVICE_UUID_SEED)
    }

    /// Find or register the spa accessory and start its adapter
    pub async fn discover(&mut self) -> anyhow::Result<()> {
        let uuid = self.device_uuid();

        let accessory = match self.accessories.iter().find(|a| a.uuid == uuid) {
            Some(existing) => {
                info!(
                    "[{}] Restoring existing accessory {}",
                    PLATFORM_NAME, existing.display_name
                );
                existing.clone()
            }
            None => {
                let mut accessory = PlatformAccessory::new(ACCESSORY_NAME, uuid);
                DeviceContext {
                    id: DEVICE_ID.to_string(),
                }
                .store(&mut accessory);

                self.api
                    .register_platform_accessories(
                        PLUGIN_NAME,
                        PLATFORM_NAME,
                        vec![accessory.clone()],
                    )
                    .await?;
                info!("[{}] Registered new accessory {}", PLATFORM_NAME, ACCESSORY_NAME);

                self.accessories.push(accessory.clone());
                accessory
            }
        };

        if let Some(mut previous) = self.spa.take() {
            warn!("[{}] Replacing running spa adapter", PLATFORM_NAME);
            previous.stop();
        }

        let mut spa = SpaAccessory::new(
            self.api.clone(),
            accessory,
            self.client.clone(),
            self.config.clone(),
        );
        spa.start().await?;
        self.spa = Some(spa);

        Ok(())
    }
}

#[async_trait]
impl<C: SpaClient + 'static> DynamicPlatform for GeckoPlatform<C> {
    fn name(&self) -> &str {
        PLATFORM_NAME
    }

    fn configure_accessory(&mut self, accessory: PlatformAccessory) {
        info!(
            "[{}] Loading accessory from cache: {}",
            PLATFORM_NAME, accessory.display_name
        );
        self.accessories.push(accessory);
    }

    async fn did_finish_launching(&mut self) -> anyhow::Result<()> {
        self.discover().await
    }

    async fn handle_message(&mut self, msg: ToPlatformMessage) -> anyhow::Result<()> {
        match msg {
            ToPlatformMessage::SetCharacteristic {
                uuid,
                service_type,
                subtype,
                characteristic,
                value,
            } => {
                let spa = match &self.spa {
                    Some(spa) if spa.accessory().uuid == uuid => spa,
                    _ => anyhow::bail!("no running accessory with uuid {}", uuid),
                };
                let subtype = subtype.as_deref();
                spa.handle_command(service_type, subtype, characteristic, &value).await
            }
        }
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        info!("[{}] Shutting down", PLATFORM_NAME);
        if let Some(spa) = self.spa.as_mut() {
            spa.stop();
        }
        Ok(())
    }
}
