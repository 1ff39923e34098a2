use async_trait::async_trait;
use linkme::distributed_slice;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::accessory::Characteristic;
use super::accessory::CharacteristicValue;
use super::accessory::PlatformAccessory;
use super::accessory::ServiceType;
use super::error::HostError;
use super::error::Result;
use super::message::FromPlatformMessage;
use super::message::ToPlatformMessage;
use crate::config::PlatformConfig;

/// Channel types for messages FROM platforms TO the bridge
/// These are bounded channels to provide backpressure
pub type FromPlatformSender = mpsc::Sender<FromPlatformMessage>;
pub type FromPlatformReceiver = mpsc::Receiver<FromPlatformMessage>;

/// Channel types for messages FROM the bridge TO platforms (unbounded - bridge must not block)
pub type ToPlatformSender = mpsc::UnboundedSender<ToPlatformMessage>;

/// Result type for platform factory functions
pub type PlatformFactoryResult = anyhow::Result<Box<dyn DynamicPlatform>>;

/// A platform a plugin makes available to the bridge.
///
/// The bridge matches `platform_name` against the `platform` key of each
/// `[[platforms]]` config entry and calls `factory` for every match.
pub struct PlatformRegistration {
    pub plugin_name: &'static str,
    pub platform_name: &'static str,
    pub factory: fn(&PlatformConfig, HostApi) -> PlatformFactoryResult,
}

#[distributed_slice]
pub static REGISTRY: [PlatformRegistration];

/// Find the registration for a platform name
pub fn find_registration(platform_name: &str) -> Option<&'static PlatformRegistration> {
    REGISTRY.iter().find(|r| r.platform_name == platform_name)
}

/// Contract every dynamic platform implements
///
/// The bridge drives the lifecycle in a fixed order: `configure_accessory` for
/// every cached accessory of this platform, then `did_finish_launching` once,
/// then `handle_message` for each command, then `shutdown`.
#[async_trait]
pub trait DynamicPlatform: Send + Sync {
    /// Get the name/identifier of this platform
    fn name(&self) -> &str;

    /// Hand back an accessory restored from the cache
    fn configure_accessory(&mut self, accessory: PlatformAccessory);

    /// Called once after all cached accessories have been restored
    async fn did_finish_launching(&mut self) -> anyhow::Result<()>;

    /// Handle a command from the bridge
    async fn handle_message(&mut self, msg: ToPlatformMessage) -> anyhow::Result<()>;

    /// Shut down the platform gracefully
    async fn shutdown(&mut self) -> anyhow::Result<()>;
}

/// Handle platforms use to talk to the bridge
#[derive(Debug, Clone)]
pub struct HostApi {
    tx: FromPlatformSender,
}

impl HostApi {
    pub fn new(tx: FromPlatformSender) -> Self {
        Self { tx }
    }

    /// Generate a stable identifier for an accessory
    pub fn generate_uuid(&self, data: &str) -> Uuid {
        super::uuid::generate(data)
    }

    /// Announce newly created accessories to the bridge
    pub async fn register_platform_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: Vec<PlatformAccessory>,
    ) -> Result<()> {
        self.send(FromPlatformMessage::AccessoriesRegistered {
            plugin: plugin.to_string(),
            platform: platform.to_string(),
            accessories,
        })
        .await
    }

    /// Persist changes made to already registered accessories
    pub async fn update_platform_accessories(
        &self,
        accessories: Vec<PlatformAccessory>,
    ) -> Result<()> {
        self.send(FromPlatformMessage::AccessoriesUpdated { accessories })
            .await
    }

    /// Report a new characteristic value
    pub async fn update_characteristic(
        &self,
        uuid: Uuid,
        service_type: ServiceType,
        subtype: Option<&str>,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> Result<()> {
        self.send(FromPlatformMessage::CharacteristicChanged {
            uuid,
            service_type,
            subtype: subtype.map(str::to_string),
            characteristic,
            value,
        })
        .await
    }

    async fn send(&self, msg: FromPlatformMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| HostError::ChannelClosed)
    }
}
