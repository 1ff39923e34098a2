mod accessory;
mod client;
mod config;
mod platform;
mod status;

use anyhow::Context;
use linkme::distributed_slice;
use platform::GeckoPlatform;

use crate::config::PlatformConfig;
use crate::host;
use crate::host::HostApi;

pub const PLUGIN_NAME: &str = "homebridge-gecko-intouch2";
pub const PLATFORM_NAME: &str = "GeckoInTouch2";

/// Display name of the spa accessory
pub const ACCESSORY_NAME: &str = "Gecko Spa";

/// Seed for the spa's accessory UUID; fixed while only one spa is supported
pub const DEVICE_UUID_SEED: &str = "gecko:spa:default";

pub const DEVICE_ID: &str = "spa-1";

/// Key of the device record in the accessory context
pub const DEVICE_CONTEXT_KEY: &str = "device";

#[distributed_slice(host::PLATFORM_REGISTRY)]
static GECKO_IN_TOUCH2: host::PlatformRegistration = host::PlatformRegistration {
    plugin_name: PLUGIN_NAME,
    platform_name: PLATFORM_NAME,
    factory: init_gecko,
};

fn init_gecko(cfg: &PlatformConfig, api: HostApi) -> host::PlatformFactoryResult {
    let platform =
        GeckoPlatform::new(cfg, api).context("Failed to create GeckoInTouch2 platform")?;
    Ok(Box::new(platform))
}
