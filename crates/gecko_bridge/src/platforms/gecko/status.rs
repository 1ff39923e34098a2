//! Spa status as reported by the local API, and its mapping onto
//! characteristics.

use serde::Deserialize;
use serde::Serialize;

use super::config::AccessoriesConfig;
use crate::host::Characteristic;
use crate::host::CharacteristicValue;
use crate::host::ServiceType;

pub const PUMP1_SUBTYPE: &str = "pump1";

/// HomeKit heating/cooling state values
pub const HEATING_COOLING_OFF: i64 = 0;
pub const HEATING_COOLING_HEAT: i64 = 1;

/// HomeKit temperature display unit for Celsius
pub const DISPLAY_UNITS_CELSIUS: i64 = 0;

/// Response of `GET /api/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaStatus {
    /// Current water temperature in °C
    pub water_temperature: f64,

    /// Heater setpoint in °C
    pub target_temperature: f64,

    #[serde(default)]
    pub heating: bool,

    #[serde(default)]
    pub pump1: bool,

    #[serde(default)]
    pub light: bool,
}

/// One characteristic reading derived from a status
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub service_type: ServiceType,
    pub subtype: Option<&'static str>,
    pub characteristic: Characteristic,
    pub value: CharacteristicValue,
}

impl Reading {
    fn new(
        service_type: ServiceType,
        subtype: Option<&'static str>,
        characteristic: Characteristic,
        value: impl Into<CharacteristicValue>,
    ) -> Self {
        Self {
            service_type,
            subtype,
            characteristic,
            value: value.into(),
        }
    }
}

impl SpaStatus {
    /// Characteristic values for every enabled capability
    pub fn readings(&self, enabled: &AccessoriesConfig) -> Vec<Reading> {
        let mut readings = Vec::new();

        if enabled.thermostat {
            let current_state = if self.heating {
                HEATING_COOLING_HEAT
            } else {
                HEATING_COOLING_OFF
            };
            readings.extend([
                Reading::new(
                    ServiceType::Thermostat,
                    None,
                    Characteristic::CurrentTemperature,
                    self.water_temperature,
                ),
                Reading::new(
                    ServiceType::Thermostat,
                    None,
                    Characteristic::TargetTemperature,
                    self.target_temperature,
                ),
                Reading::new(
                    ServiceType::Thermostat,
                    None,
                    Characteristic::CurrentHeatingCoolingState,
                    current_state,
                ),
                Reading::new(
                    ServiceType::Thermostat,
                    None,
                    Characteristic::TargetHeatingCoolingState,
                    HEATING_COOLING_HEAT,
                ),
                Reading::new(
                    ServiceType::Thermostat,
                    None,
                    Characteristic::TemperatureDisplayUnits,
                    DISPLAY_UNITS_CELSIUS,
                ),
            ]);
        }

        if enabled.pump1 {
            readings.push(Reading::new(
                ServiceType::Switch,
                Some(PUMP1_SUBTYPE),
                Characteristic::On,
                self.pump1,
            ));
        }

        if enabled.light {
            readings.push(Reading::new(
                ServiceType::Lightbulb,
                None,
                Characteristic::On,
                self.light,
            ));
        }

        readings
    }
}
