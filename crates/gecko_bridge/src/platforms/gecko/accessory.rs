//! Accessory adapter for one spa.
//!
//! Owns the spa's accessory record: keeps its services in line with the
//! enabled capabilities, polls the spa API on an interval, pushes changed
//! characteristic values to the bridge and executes commands coming back.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::SpaClient;
use super::client::SpaError;
use super::config::AccessoriesConfig;
use super::config::GeckoConfig;
use super::status::HEATING_COOLING_HEAT;
use super::status::PUMP1_SUBTYPE;
use super::DEVICE_CONTEXT_KEY;
use super::DEVICE_ID;
use super::PLATFORM_NAME;
use crate::host::Characteristic;
use crate::host::CharacteristicValue;
use crate::host::HostApi;
use crate::host::HostError;
use crate::host::PlatformAccessory;
use crate::host::Service;
use crate::host::ServiceType;

pub const MANUFACTURER: &str = "Gecko";
pub const MODEL: &str = "in.touch2";

pub const THERMOSTAT_NAME: &str = "Gecko Spa Thermostat";
pub const PUMP1_NAME: &str = "Pump 1";
pub const LIGHT_NAME: &str = "Light";

/// Setpoint range accepted by the heater (°C)
pub const MIN_TARGET_TEMPERATURE: f64 = 10.0;
pub const MAX_TARGET_TEMPERATURE: f64 = 40.0;

/// Payload stored under the accessory's `device` context key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceContext {
    pub id: String,
}

impl DeviceContext {
    /// Read the device context of an accessory, if present and well-formed
    pub fn from_accessory(accessory: &PlatformAccessory) -> Option<Self> {
        accessory
            .context
            .get(DEVICE_CONTEXT_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn store(&self, accessory: &mut PlatformAccessory) {
        accessory
            .context
            .insert(DEVICE_CONTEXT_KEY.to_string(), serde_json::json!(self));
    }
}

type ReadingKey = (ServiceType, Option<&'static str>, Characteristic);

/// Polls the spa and reports what changed
struct Poller<C> {
    api: HostApi,
    uuid: uuid::Uuid,
    client: Arc<C>,
    enabled: AccessoriesConfig,

    /// Values last pushed to the bridge
    last: HashMap<ReadingKey, CharacteristicValue>,

    /// Whether the previous poll failed
    failing: bool,
}

impl<C: SpaClient> Poller<C> {
    /// Fetch the status once and push changed values.
    ///
    /// Spa errors are logged and swallowed; only a closed bridge channel is
    /// returned as an error.
    async fn poll_once(&mut self) -> Result<(), HostError> {
        let status = match self.client.status().await {
            Ok(status) => status,
            Err(e) => {
                if self.failing {
                    debug!("[{}] Spa still unreachable: {}", PLATFORM_NAME, e);
                } else {
                    warn!("[{}] Failed to poll spa: {}", PLATFORM_NAME, e);
                    self.failing = true;
                }
                return Ok(());
            }
        };

        if self.failing {
            info!("[{}] Spa is reachable again", PLATFORM_NAME);
            self.failing = false;
        }

        for reading in status.readings(&self.enabled) {
            let key = (reading.service_type, reading.subtype, reading.characteristic);
            if self.last.get(&key) == Some(&reading.value) {
                continue;
            }

            self.api
                .update_characteristic(
                    self.uuid,
                    reading.service_type,
                    reading.subtype,
                    reading.characteristic,
                    reading.value.clone(),
                )
                .await?;
            self.last.insert(key, reading.value);
        }

        Ok(())
    }
}

pub struct SpaAccessory<C: SpaClient + 'static> {
    api: HostApi,
    accessory: PlatformAccessory,
    client: Arc<C>,
    config: GeckoConfig,
    poller: Arc<Mutex<Poller<C>>>,
    poll_task: Option<JoinHandle<()>>,
}

impl<C: SpaClient + 'static> SpaAccessory<C> {
    pub fn new(
        api: HostApi,
        accessory: PlatformAccessory,
        client: Arc<C>,
        config: GeckoConfig,
    ) -> Self {
        let poller = Poller {
            api: api.clone(),
            uuid: accessory.uuid,
            client: client.clone(),
            enabled: config.accessories,
            last: HashMap::new(),
            failing: false,
        };

        Self {
            api,
            accessory,
            client,
            config,
            poller: Arc::new(Mutex::new(poller)),
            poll_task: None,
        }
    }

    pub fn accessory(&self) -> &PlatformAccessory {
        &self.accessory
    }

    #[cfg(test)]
    pub fn is_polling(&self) -> bool {
        self.poll_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Bring the record up to date and start polling
    pub async fn start(&mut self) -> Result<(), HostError> {
        let mut changed = self.ensure_device_context();
        changed |= self.configure_services();
        if changed {
            debug!(
                "[{}] Accessory {} changed, updating cache",
                PLATFORM_NAME, self.accessory.display_name
            );
            self.api
                .update_platform_accessories(vec![self.accessory.clone()])
                .await?;
        }

        self.publish_information().await?;

        let poller = self.poller.clone();
        let period = self.config.polling_interval();
        info!(
            "[{}] Polling {} every {:?}",
            PLATFORM_NAME, self.config.base_url, period
        );

        self.stop();
        self.poll_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if let Err(e) = poller.lock().await.poll_once().await {
                    warn!("[{}] Stopping spa polling: {}", PLATFORM_NAME, e);
                    break;
                }
            }
        }));

        Ok(())
    }

    /// Stop polling
    pub fn stop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    /// Poll immediately, outside the regular interval
    pub async fn refresh(&self) -> Result<(), HostError> {
        self.poller.lock().await.poll_once().await
    }

    /// Execute a write coming from the bridge, then refresh
    pub async fn handle_command(
        &self,
        service_type: ServiceType,
        subtype: Option<&str>,
        characteristic: Characteristic,
        value: &CharacteristicValue,
    ) -> anyhow::Result<()> {
        let enabled = &self.config.accessories;

        match (service_type, subtype, characteristic) {
            (ServiceType::Thermostat, None, Characteristic::TargetTemperature)
                if enabled.thermostat =>
            {
                let requested = value
                    .as_f64()
                    .filter(|t| t.is_finite())
                    .ok_or_else(|| wrong_type(characteristic, value))?;
                let target = requested.clamp(MIN_TARGET_TEMPERATURE, MAX_TARGET_TEMPERATURE);
                if target != requested {
                    debug!(
                        "[{}] Clamping target temperature {} to {}",
                        PLATFORM_NAME, requested, target
                    );
                }
                info!("[{}] Setting target temperature to {}°C", PLATFORM_NAME, target);
                self.client.set_target_temperature(target).await?;
            }
            (ServiceType::Thermostat, None, Characteristic::TargetHeatingCoolingState)
                if enabled.thermostat =>
            {
                if value.as_i64() != Some(HEATING_COOLING_HEAT) {
                    return Err(SpaError::UnsupportedCommand(
                        "the spa heater only supports heat mode".to_string(),
                    )
                    .into());
                }
            }
            (ServiceType::Switch, Some(PUMP1_SUBTYPE), Characteristic::On) if enabled.pump1 => {
                let on = value.as_bool().ok_or_else(|| wrong_type(characteristic, value))?;
                info!("[{}] Switching pump 1 {}", PLATFORM_NAME, on_off(on));
                self.client.set_pump1(on).await?;
            }
            (ServiceType::Lightbulb, None, Characteristic::On) if enabled.light => {
                let on = value.as_bool().ok_or_else(|| wrong_type(characteristic, value))?;
                info!("[{}] Switching light {}", PLATFORM_NAME, on_off(on));
                self.client.set_light(on).await?;
            }
            _ => {
                let target = match subtype {
                    Some(subtype) => format!("{}/{}.{}", service_type, subtype, characteristic),
                    None => format!("{}.{}", service_type, characteristic),
                };
                return Err(SpaError::UnsupportedCommand(format!("cannot write {}", target)).into());
            }
        }

        self.refresh().await?;
        Ok(())
    }

    /// Make sure the record carries its device context; true if it changed
    fn ensure_device_context(&mut self) -> bool {
        if DeviceContext::from_accessory(&self.accessory).is_some() {
            return false;
        }
        DeviceContext {
            id: DEVICE_ID.to_string(),
        }
        .store(&mut self.accessory);
        true
    }

    /// Align services with the enabled capabilities; true if anything changed
    fn configure_services(&mut self) -> bool {
        let enabled = self.config.accessories;
        let information = Service::new(
            ServiceType::AccessoryInformation,
            self.accessory.display_name.clone(),
        );

        let mut changed = self.accessory.add_service(information);
        changed |= self.toggle_service(
            enabled.thermostat,
            Service::new(ServiceType::Thermostat, THERMOSTAT_NAME),
        );
        changed |= self.toggle_service(
            enabled.pump1,
            Service::new(ServiceType::Switch, PUMP1_NAME).with_subtype(PUMP1_SUBTYPE),
        );
        changed |= self.toggle_service(
            enabled.light,
            Service::new(ServiceType::Lightbulb, LIGHT_NAME),
        );
        changed
    }

    fn toggle_service(&mut self, enabled: bool, service: Service) -> bool {
        if enabled {
            self.accessory.add_service(service)
        } else {
            let removed = self
                .accessory
                .remove_service(service.service_type, service.subtype.as_deref());
            if removed {
                info!(
                    "[{}] Removing disabled service {}",
                    PLATFORM_NAME, service.display_name
                );
            }
            removed
        }
    }

    async fn publish_information(&self) -> Result<(), HostError> {
        let serial = DeviceContext::from_accessory(&self.accessory)
            .map(|c| c.id)
            .unwrap_or_else(|| DEVICE_ID.to_string());

        let information = [
            (Characteristic::Manufacturer, MANUFACTURER.to_string()),
            (Characteristic::Model, MODEL.to_string()),
            (Characteristic::SerialNumber, serial),
            (Characteristic::Name, self.accessory.display_name.clone()),
        ];

        for (characteristic, value) in information {
            self.api
                .update_characteristic(
                    self.accessory.uuid,
                    ServiceType::AccessoryInformation,
                    None,
                    characteristic,
                    CharacteristicValue::String(value),
                )
                .await?;
        }
        Ok(())
    }
}

impl<C: SpaClient + 'static> Drop for SpaAccessory<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn wrong_type(characteristic: Characteristic, value: &CharacteristicValue) -> SpaError {
    SpaError::UnsupportedCommand(format!("invalid value {:?} for {}", value, characteristic))
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::host::FromPlatformMessage;
    use crate::host::FromPlatformReceiver;
    use crate::platforms::gecko::client::MockCommand;
    use crate::platforms::gecko::client::MockSpaClient;
    use crate::platforms::gecko::status::SpaStatus;

    fn status() -> SpaStatus {
        SpaStatus {
            water_temperature: 36.0,
            target_temperature: 38.0,
            heating: false,
            pump1: false,
            light: false,
        }
    }

    fn spa(
        client: MockSpaClient,
        accessories: AccessoriesConfig,
        accessory: PlatformAccessory,
    ) -> (SpaAccessory<MockSpaClient>, Arc<MockSpaClient>, FromPlatformReceiver) {
        let (tx, rx) = mpsc::channel(64);
        let client = Arc::new(client);
        let config = GeckoConfig {
            accessories,
            ..GeckoConfig::default()
        };
        let spa = SpaAccessory::new(HostApi::new(tx), accessory, client.clone(), config);
        (spa, client, rx)
    }

    fn blank_accessory() -> PlatformAccessory {
        PlatformAccessory::new("Gecko Spa", crate::host::uuid::generate("gecko:spa:default"))
    }

    fn drain(rx: &mut FromPlatformReceiver) -> Vec<FromPlatformMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn changed_values(
        messages: &[FromPlatformMessage],
    ) -> Vec<(Characteristic, CharacteristicValue)> {
        messages
            .iter()
            .filter_map(|m| match m {
                FromPlatformMessage::CharacteristicChanged {
                    service_type,
                    characteristic,
                    value,
                    ..
                } if *service_type != ServiceType::AccessoryInformation => {
                    Some((*characteristic, value.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_start_configures_services_and_polls() {
        let (mut spa, client, mut rx) = spa(
            MockSpaClient::new(status()),
            AccessoriesConfig::default(),
            blank_accessory(),
        );

        spa.start().await.unwrap();

        // Services were added, so the record is re-persisted first
        match rx.recv().await.unwrap() {
            FromPlatformMessage::AccessoriesUpdated { accessories } => {
                let accessory = &accessories[0];
                assert_eq!(accessory.services.len(), 4);
                assert!(accessory.get_service(ServiceType::Switch, Some("pump1")).is_some());
                assert_eq!(
                    DeviceContext::from_accessory(accessory),
                    Some(DeviceContext {
                        id: "spa-1".to_string()
                    })
                );
            }
            other => panic!("unexpected message: {:?}", other),
        }

        // 4 information characteristics, then 7 readings from the first poll
        let mut messages = Vec::new();
        while messages.len() < 11 {
            messages.push(rx.recv().await.unwrap());
        }
        assert_eq!(changed_values(&messages).len(), 7);
        assert!(client.poll_count() >= 1);
        assert!(spa.is_polling());

        spa.stop();
        assert!(spa.poll_task.is_none());
    }

    #[tokio::test]
    async fn test_only_changes_are_reported() {
        let (spa, client, mut rx) = spa(
            MockSpaClient::new(status()),
            AccessoriesConfig::default(),
            blank_accessory(),
        );

        spa.refresh().await.unwrap();
        assert_eq!(changed_values(&drain(&mut rx)).len(), 7);

        spa.refresh().await.unwrap();
        assert!(drain(&mut rx).is_empty());

        client.set_status(Some(SpaStatus {
            light: true,
            ..status()
        }));
        spa.refresh().await.unwrap();
        assert_eq!(
            changed_values(&drain(&mut rx)),
            vec![(Characteristic::On, CharacteristicValue::Bool(true))]
        );
    }

    #[tokio::test]
    async fn test_offline_spa_is_not_fatal() {
        let (spa, client, mut rx) = spa(
            MockSpaClient::offline(),
            AccessoriesConfig::default(),
            blank_accessory(),
        );

        spa.refresh().await.unwrap();
        spa.refresh().await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert!(spa.poller.lock().await.failing);

        client.set_status(Some(status()));
        spa.refresh().await.unwrap();
        assert_eq!(changed_values(&drain(&mut rx)).len(), 7);
        assert!(!spa.poller.lock().await.failing);
    }

    #[tokio::test]
    async fn test_target_temperature_is_clamped() {
        let (spa, client, mut rx) = spa(
            MockSpaClient::new(status()),
            AccessoriesConfig::default(),
            blank_accessory(),
        );

        spa.handle_command(
            ServiceType::Thermostat,
            None,
            Characteristic::TargetTemperature,
            &CharacteristicValue::Float(45.0),
        )
        .await
        .unwrap();

        assert_eq!(client.commands(), vec![MockCommand::Setpoint(40.0)]);
        assert!(changed_values(&drain(&mut rx))
            .contains(&(Characteristic::TargetTemperature, CharacteristicValue::Float(40.0))));
    }

    #[tokio::test]
    async fn test_switch_commands() {
        let (spa, client, _rx) = spa(
            MockSpaClient::new(status()),
            AccessoriesConfig::default(),
            blank_accessory(),
        );

        spa.handle_command(
            ServiceType::Switch,
            Some("pump1"),
            Characteristic::On,
            &CharacteristicValue::Bool(true),
        )
        .await
        .unwrap();
        spa.handle_command(
            ServiceType::Lightbulb,
            None,
            Characteristic::On,
            &CharacteristicValue::Int(1),
        )
        .await
        .unwrap();

        assert_eq!(
            client.commands(),
            vec![MockCommand::Pump1(true), MockCommand::Light(true)]
        );
    }

    #[tokio::test]
    async fn test_rejected_commands() {
        let (spa, client, _rx) = spa(
            MockSpaClient::new(status()),
            AccessoriesConfig {
                thermostat: true,
                pump1: true,
                light: false,
            },
            blank_accessory(),
        );

        // Disabled capability
        assert!(spa
            .handle_command(
                ServiceType::Lightbulb,
                None,
                Characteristic::On,
                &CharacteristicValue::Bool(true),
            )
            .await
            .is_err());

        // Wrong value type
        assert!(spa
            .handle_command(
                ServiceType::Switch,
                Some("pump1"),
                Characteristic::On,
                &CharacteristicValue::String("on".to_string()),
            )
            .await
            .is_err());

        // Cooling is not available
        assert!(spa
            .handle_command(
                ServiceType::Thermostat,
                None,
                Characteristic::TargetHeatingCoolingState,
                &CharacteristicValue::Int(2),
            )
            .await
            .is_err());

        // Read-only characteristic
        assert!(spa
            .handle_command(
                ServiceType::Thermostat,
                None,
                Characteristic::CurrentTemperature,
                &CharacteristicValue::Float(30.0),
            )
            .await
            .is_err());

        assert!(client.commands().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_services_are_removed_from_restored_record() {
        let mut restored = blank_accessory();
        DeviceContext {
            id: "spa-1".to_string(),
        }
        .store(&mut restored);
        restored.add_service(Service::new(ServiceType::AccessoryInformation, "Gecko Spa"));
        restored.add_service(Service::new(ServiceType::Thermostat, THERMOSTAT_NAME));
        restored.add_service(Service::new(ServiceType::Lightbulb, LIGHT_NAME));

        let (mut spa, _client, _rx) = spa(
            MockSpaClient::new(status()),
            AccessoriesConfig {
                thermostat: true,
                pump1: false,
                light: false,
            },
            restored,
        );

        assert!(!spa.ensure_device_context());
        assert!(spa.configure_services());
        assert!(spa
            .accessory()
            .get_service(ServiceType::Lightbulb, None)
            .is_none());
        assert_eq!(spa.accessory().services.len(), 2);

        // Second pass is a no-op
        assert!(!spa.configure_services());
    }
}
