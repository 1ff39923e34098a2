use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use uuid::Uuid;

use super::accessory::Characteristic;
use super::accessory::CharacteristicValue;
use super::accessory::ServiceType;

/// Shared, lock-free view of the bridge state (readers load, the bridge stores)
pub type StateHandle = Arc<ArcSwap<State>>;

/// Last known values of one accessory.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AccessoryState {
    pub display_name: String,
    pub plugin: String,
    pub platform: String,

    /// Characteristic values keyed by `Service[/subtype].Characteristic`
    pub characteristics: BTreeMap<String, CharacteristicValue>,
}

/// Centralized snapshot of everything the bridge knows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub accessories: BTreeMap<Uuid, AccessoryState>,
}

/// Key a characteristic is stored under in `AccessoryState::characteristics`
pub fn characteristic_key(
    service_type: ServiceType,
    subtype: Option<&str>,
    characteristic: Characteristic,
) -> String {
    match subtype {
        Some(subtype) => format!("{}/{}.{}", service_type, subtype, characteristic),
        None => format!("{}.{}", service_type, characteristic),
    }
}
