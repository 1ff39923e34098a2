//! Type-safe message system between the bridge and its platforms
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromPlatformMessage`: Registrations and state updates from platforms
//! - `ToPlatformMessage`: Commands from the bridge to platforms

use uuid::Uuid;

use super::accessory::Characteristic;
use super::accessory::CharacteristicValue;
use super::accessory::PlatformAccessory;
use super::accessory::ServiceType;

/// Messages FROM platforms TO the bridge
#[derive(Debug, Clone)]
pub enum FromPlatformMessage {
    /// New accessories were created and should be persisted
    AccessoriesRegistered {
        plugin: String,
        platform: String,
        accessories: Vec<PlatformAccessory>,
    },

    /// Known accessories changed (services added or removed)
    AccessoriesUpdated { accessories: Vec<PlatformAccessory> },

    /// A characteristic reported a new value
    CharacteristicChanged {
        uuid: Uuid,
        service_type: ServiceType,
        subtype: Option<String>,
        characteristic: Characteristic,
        value: CharacteristicValue,
    },
}

/// Messages FROM the bridge TO platforms (commands)
#[derive(Debug, Clone)]
pub enum ToPlatformMessage {
    /// Request to change a writable characteristic
    SetCharacteristic {
        uuid: Uuid,
        service_type: ServiceType,
        subtype: Option<String>,
        characteristic: Characteristic,
        value: CharacteristicValue,
    },
}

impl ToPlatformMessage {
    /// Accessory the command is addressed to
    pub fn accessory_uuid(&self) -> Uuid {
        match self {
            ToPlatformMessage::SetCharacteristic { uuid, .. } => *uuid,
        }
    }
}
