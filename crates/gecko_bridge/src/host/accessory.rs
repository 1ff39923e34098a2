//! Accessory object model shared between the bridge and its platforms.
//!
//! An accessory is a persisted handle for one physical device. It carries a
//! free-form `context` that platforms use to re-associate a restored record
//! with their logical device, and the list of services it exposes.

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Kinds of services an accessory can expose.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum ServiceType {
    AccessoryInformation,
    Thermostat,
    Switch,
    Lightbulb,
}

/// Characteristics a service can carry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum Characteristic {
    Manufacturer,
    Model,
    SerialNumber,
    Name,
    On,
    CurrentTemperature,
    TargetTemperature,
    CurrentHeatingCoolingState,
    TargetHeatingCoolingState,
    TemperatureDisplayUnits,
}

/// Value of a single characteristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl CharacteristicValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CharacteristicValue::Bool(b) => Some(*b),
            CharacteristicValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CharacteristicValue::Float(f) => Some(*f),
            CharacteristicValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CharacteristicValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<bool> for CharacteristicValue {
    fn from(v: bool) -> Self {
        CharacteristicValue::Bool(v)
    }
}

impl From<i64> for CharacteristicValue {
    fn from(v: i64) -> Self {
        CharacteristicValue::Int(v)
    }
}

impl From<f64> for CharacteristicValue {
    fn from(v: f64) -> Self {
        CharacteristicValue::Float(v)
    }
}

impl From<&str> for CharacteristicValue {
    fn from(v: &str) -> Self {
        CharacteristicValue::String(v.to_string())
    }
}

/// A service exposed by an accessory
///
/// Identified on its accessory by `(service_type, subtype)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub service_type: ServiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub display_name: String,
}

impl Service {
    pub fn new(service_type: ServiceType, display_name: impl Into<String>) -> Self {
        Self {
            service_type,
            subtype: None,
            display_name: display_name.into(),
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    fn matches(&self, service_type: ServiceType, subtype: Option<&str>) -> bool {
        self.service_type == service_type && self.subtype.as_deref() == subtype
    }
}

/// An accessory record as known to the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformAccessory {
    pub uuid: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub services: Vec<Service>,
}

impl PlatformAccessory {
    pub fn new(display_name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            uuid,
            display_name: display_name.into(),
            context: serde_json::Map::new(),
            services: Vec::new(),
        }
    }

    pub fn get_service(
        &self,
        service_type: ServiceType,
        subtype: Option<&str>,
    ) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.matches(service_type, subtype))
    }

    /// Add a service unless one with the same type and subtype already exists.
    ///
    /// Returns true if the service list changed.
    pub fn add_service(&mut self, service: Service) -> bool {
        if self
            .get_service(service.service_type, service.subtype.as_deref())
            .is_some()
        {
            return false;
        }
        self.services.push(service);
        true
    }

    /// Remove a service; returns true if one was removed.
    pub fn remove_service(&mut self, service_type: ServiceType, subtype: Option<&str>) -> bool {
        let before = self.services.len();
        self.services.retain(|s| !s.matches(service_type, subtype));
        self.services.len() != before
    }
}
