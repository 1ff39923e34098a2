mod accessory;
mod bridge;
mod cache;
mod error;
mod message;
mod platform;
pub mod state;
pub mod uuid;

pub use accessory::Characteristic;
pub use accessory::CharacteristicValue;
pub use accessory::PlatformAccessory;
pub use accessory::Service;
pub use accessory::ServiceType;
pub use bridge::Bridge;
#[cfg(test)]
pub use cache::AccessoryCache;
pub use error::HostError;
#[cfg(test)]
pub use message::FromPlatformMessage;
pub use message::ToPlatformMessage;
pub use platform::DynamicPlatform;
#[cfg(test)]
pub use platform::FromPlatformReceiver;
pub use platform::HostApi;
pub use platform::PlatformFactoryResult;
pub use platform::PlatformRegistration;
pub use platform::REGISTRY as PLATFORM_REGISTRY;
pub use state::AccessoryState;
pub use state::State;
pub use state::StateHandle;
