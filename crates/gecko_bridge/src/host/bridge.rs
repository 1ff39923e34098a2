use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use super::accessory::PlatformAccessory;
use super::cache::AccessoryCache;
use super::cache::CachedAccessory;
use super::error::HostError;
use super::message::FromPlatformMessage;
use super::message::ToPlatformMessage;
use super::platform::find_registration;
use super::platform::DynamicPlatform;
use super::platform::FromPlatformReceiver;
use super::platform::FromPlatformSender;
use super::platform::HostApi;
use super::platform::ToPlatformSender;
use super::state::characteristic_key;
use super::state::State;
use super::state::StateHandle;
use crate::config::BridgeConfig;
use crate::config::Config;

/// Capacity for the platform→bridge message channel
/// Provides backpressure when platforms send faster than the bridge can process
const FROM_PLATFORM_CHANNEL_SIZE: usize = 1024;

/// A platform that has been configured but not launched yet
struct PendingPlatform {
    name: String,
    platform: Box<dyn DynamicPlatform>,
    commands: mpsc::UnboundedReceiver<ToPlatformMessage>,
}

/// The bridge host
///
/// Owns the accessory cache, drives the lifecycle of every platform, persists
/// the accessories they register and keeps a view of their characteristics
/// in `State`.
pub struct Bridge {
    name: String,

    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: StateHandle,

    /// Persistent accessory records
    cache: std::sync::Mutex<AccessoryCache>,

    /// Map of accessory uuid -> platform name for routing commands
    accessory_platform_map: std::sync::Mutex<HashMap<Uuid, String>>,

    /// Communication channels to platforms (for commands)
    platform_channels: HashMap<String, ToPlatformSender>,

    /// Platforms waiting for `did_finish_launching`
    pending: Vec<PendingPlatform>,

    /// Receive messages from platforms
    message_rx: Mutex<FromPlatformReceiver>,

    /// Sender handed to platforms through `HostApi`
    message_tx: FromPlatformSender,

    /// Handles for platform tasks
    platform_handles: Vec<(String, JoinHandle<()>)>,
}

impl Bridge {
    /// Create a bridge, restoring the accessory cache from `storage_path`
    ///
    /// An unreadable cache is logged and replaced by an empty one.
    pub fn new(cfg: &BridgeConfig) -> Self {
        let cache = match AccessoryCache::load(&cfg.storage_path) {
            Ok(cache) => cache,
            Err(e) => {
                error!("{}; starting with an empty accessory cache", e);
                AccessoryCache::new(&cfg.storage_path)
            }
        };
        Self::with_cache(cfg.name.clone(), cache)
    }

    fn with_cache(name: String, cache: AccessoryCache) -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_PLATFORM_CHANNEL_SIZE);
        Self {
            name,
            state: Arc::new(ArcSwap::from_pointee(State::default())),
            cache: std::sync::Mutex::new(cache),
            accessory_platform_map: std::sync::Mutex::new(HashMap::new()),
            platform_channels: HashMap::new(),
            pending: Vec::new(),
            message_rx: Mutex::new(message_rx),
            message_tx,
            platform_handles: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle given to platforms for registering accessories and reporting state
    pub fn api(&self) -> HostApi {
        HostApi::new(self.message_tx.clone())
    }

    /// Shared handle to the state snapshot
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// Get a snapshot of the current bridge state.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Register platforms from configuration
    ///
    /// Each `[[platforms]]` entry is matched against the platform registry.
    /// Unknown platforms and failing factories are logged and skipped.
    pub fn register_platforms_from_config(&mut self, cfg: &Config) {
        for platform_cfg in &cfg.platforms {
            let registration = match find_registration(&platform_cfg.platform) {
                Some(r) => r,
                None => {
                    warn!(
                        "No plugin provides platform '{}', skipping",
                        platform_cfg.platform
                    );
                    continue;
                }
            };

            match (registration.factory)(platform_cfg, self.api()) {
                Ok(platform) => self.add_platform(
                    registration.plugin_name,
                    registration.platform_name,
                    platform,
                ),
                Err(e) => {
                    error!(
                        "failed to set up platform '{}': {:#}",
                        registration.platform_name, e
                    );
                }
            }
        }
    }

    /// Add a platform and restore its cached accessories
    ///
    /// Every cached accessory owned by `plugin`/`platform_name` is handed to
    /// `configure_accessory` before the platform is launched.
    pub fn add_platform(
        &mut self,
        plugin: &str,
        platform_name: &str,
        mut platform: Box<dyn DynamicPlatform>,
    ) {
        let name = platform.name().to_string();
        if self.platform_channels.contains_key(&name) {
            warn!("Platform '{}' is already configured, skipping", name);
            return;
        }

        let restored: Vec<PlatformAccessory> = {
            let cache = self.lock_cache();
            cache.for_platform(plugin, platform_name).cloned().collect()
        };

        info!(
            "Loading platform '{}' from plugin {} ({} cached accessories)",
            name,
            plugin,
            restored.len()
        );

        for accessory in restored {
            debug!(
                "Restoring cached accessory {} ({})",
                accessory.display_name, accessory.uuid
            );
            self.track_accessory(&accessory, plugin, platform_name);
            platform.configure_accessory(accessory);
        }

        let (to_platform_tx, to_platform_rx) = mpsc::unbounded_channel();
        self.platform_channels.insert(name.clone(), to_platform_tx);
        self.pending.push(PendingPlatform {
            name,
            platform,
            commands: to_platform_rx,
        });
    }

    /// Signal that launching finished
    ///
    /// Spawns each pending platform in its own task: the platform runs its
    /// `did_finish_launching` without blocking the bridge, then serves commands
    /// until the bridge shuts down.
    pub fn did_finish_launching(&mut self) {
        self.warn_orphaned_accessories();

        for pending in self.pending.drain(..) {
            let PendingPlatform {
                name,
                mut platform,
                mut commands,
            } = pending;
            let task_name = name.clone();

            let handle = tokio::spawn(async move {
                if let Err(e) = platform.did_finish_launching().await {
                    error!("Platform '{}' failed to finish launching: {:#}", task_name, e);
                }

                // Process commands from bridge
                while let Some(msg) = commands.recv().await {
                    if let Err(e) = platform.handle_message(msg).await {
                        warn!("Platform '{}' failed to handle message: {:#}", task_name, e);
                    }
                }

                if let Err(e) = platform.shutdown().await {
                    warn!("Platform '{}' shutdown failed: {:#}", task_name, e);
                }
            });

            self.platform_handles.push((name, handle));
        }

        info!("Bridge '{}' finished launching", self.name);
    }

    /// Send a command to the platform owning the addressed accessory
    pub fn send_command(&self, msg: ToPlatformMessage) -> Result<(), HostError> {
        let uuid = msg.accessory_uuid();

        let platform_name = self
            .lock_routes()
            .get(&uuid)
            .cloned()
            .ok_or(HostError::UnknownAccessory(uuid))?;

        let tx = self
            .platform_channels
            .get(&platform_name)
            .ok_or(HostError::UnknownAccessory(uuid))?;

        tx.send(msg).map_err(|_| HostError::ChannelClosed)
    }

    /// Run the bridge's main event loop
    ///
    /// The bridge holds a sender itself, so this only returns when the future
    /// is dropped; callers race it against their shutdown signal.
    pub async fn run(&self) {
        info!("Bridge '{}' starting", self.name);

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }
    }

    /// Stop all platforms and wait for their tasks to finish
    pub async fn shutdown(&mut self) {
        info!("Shutting down platforms...");

        // Closing the command channels ends each platform's command loop
        self.platform_channels.clear();
        self.pending.clear();

        for (name, handle) in self.platform_handles.drain(..) {
            match handle.await {
                Ok(()) => debug!("Platform '{}' stopped", name),
                Err(e) => error!("Platform '{}' task failed: {}", name, e),
            }
        }

        // Drain whatever the platforms reported while stopping
        {
            let mut rx = self.message_rx.lock().await;
            while let Ok(msg) = rx.try_recv() {
                self.handle_event(msg);
            }
        }

        if let Err(e) = self.lock_cache().save() {
            error!("Failed to save accessory cache: {}", e);
        }
    }

    /// Handle a message from a platform
    fn handle_event(&self, msg: FromPlatformMessage) {
        match msg {
            FromPlatformMessage::AccessoriesRegistered {
                plugin,
                platform,
                accessories,
            } => {
                {
                    let mut cache = self.lock_cache();
                    for accessory in &accessories {
                        info!(
                            "Registering accessory {} ({}) for platform {}",
                            accessory.display_name, accessory.uuid, platform
                        );
                        cache.upsert(CachedAccessory {
                            plugin: plugin.clone(),
                            platform: platform.clone(),
                            accessory: accessory.clone(),
                        });
                    }
                }

                for accessory in &accessories {
                    self.track_accessory(accessory, &plugin, &platform);
                }

                self.persist_cache();
            }
            FromPlatformMessage::AccessoriesUpdated { accessories } => {
                {
                    let mut cache = self.lock_cache();
                    for accessory in accessories {
                        debug!("Updating cached accessory {}", accessory.uuid);
                        if !cache.update(accessory.clone()) {
                            warn!(
                                "Ignoring update for unregistered accessory {} ({})",
                                accessory.display_name, accessory.uuid
                            );
                        }
                    }
                }

                self.persist_cache();
            }
            FromPlatformMessage::CharacteristicChanged {
                uuid,
                service_type,
                subtype,
                characteristic,
                value,
            } => {
                let key = characteristic_key(service_type, subtype.as_deref(), characteristic);

                let mut state = State::clone(&self.state.load());
                match state.accessories.get_mut(&uuid) {
                    Some(accessory) => {
                        info!("{}: {} -> {:?}", accessory.display_name, key, value);
                        accessory.characteristics.insert(key, value);
                        self.state.store(Arc::new(state));
                    }
                    None => {
                        warn!("Characteristic update for unknown accessory {}: {}", uuid, key);
                    }
                }
            }
        }
    }

    /// Record routing and state for an accessory owned by `platform`
    fn track_accessory(&self, accessory: &PlatformAccessory, plugin: &str, platform: &str) {
        self.lock_routes()
            .insert(accessory.uuid, platform.to_string());

        let mut state = State::clone(&self.state.load());
        let entry = state.accessories.entry(accessory.uuid).or_default();
        entry.display_name = accessory.display_name.clone();
        entry.plugin = plugin.to_string();
        entry.platform = platform.to_string();
        self.state.store(Arc::new(state));
    }

    fn warn_orphaned_accessories(&self) {
        let cache = self.lock_cache();
        let routes = self.lock_routes();
        for entry in cache.entries() {
            if !routes.contains_key(&entry.accessory.uuid) {
                warn!(
                    "Cached accessory {} belongs to unconfigured platform '{}' ({}); keeping it",
                    entry.accessory.display_name, entry.platform, entry.plugin
                );
            }
        }
    }

    fn persist_cache(&self) {
        if let Err(e) = self.lock_cache().save() {
            error!("Failed to save accessory cache: {}", e);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, AccessoryCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_routes(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, String>> {
        self.accessory_platform_map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::host::accessory::Characteristic;
    use crate::host::accessory::CharacteristicValue;
    use crate::host::accessory::ServiceType;

    /// What a `RecordingPlatform` has seen
    #[derive(Debug, Default)]
    struct Calls {
        configured: Vec<Uuid>,
        launched: usize,
        messages: Vec<ToPlatformMessage>,
        shutdown: bool,
    }

    struct RecordingPlatform {
        calls: Arc<StdMutex<Calls>>,
        fail_launch: bool,
    }

    impl RecordingPlatform {
        fn new(fail_launch: bool) -> (Self, Arc<StdMutex<Calls>>) {
            let calls = Arc::new(StdMutex::new(Calls::default()));
            (
                Self {
                    calls: calls.clone(),
                    fail_launch,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl DynamicPlatform for RecordingPlatform {
        fn name(&self) -> &str {
            "Recording"
        }

        fn configure_accessory(&mut self, accessory: PlatformAccessory) {
            self.calls.lock().unwrap().configured.push(accessory.uuid);
        }

        async fn did_finish_launching(&mut self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().launched += 1;
            if self.fail_launch {
                anyhow::bail!("device unreachable");
            }
            Ok(())
        }

        async fn handle_message(&mut self, msg: ToPlatformMessage) -> anyhow::Result<()> {
            self.calls.lock().unwrap().messages.push(msg);
            Ok(())
        }

        async fn shutdown(&mut self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().shutdown = true;
            Ok(())
        }
    }

    fn cached(name: &str, platform: &str) -> CachedAccessory {
        CachedAccessory {
            plugin: "test-plugin".to_string(),
            platform: platform.to_string(),
            accessory: PlatformAccessory::new(name, crate::host::uuid::generate(name)),
        }
    }

    fn set_on(uuid: Uuid) -> ToPlatformMessage {
        ToPlatformMessage::SetCharacteristic {
            uuid,
            service_type: ServiceType::Lightbulb,
            subtype: None,
            characteristic: Characteristic::On,
            value: CharacteristicValue::Bool(true),
        }
    }

    #[tokio::test]
    async fn test_restores_only_own_accessories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut cache = AccessoryCache::new(temp_dir.path());
        let mine = cached("Spa", "Recording");
        cache.upsert(mine.clone());
        cache.upsert(cached("Elsewhere", "Other"));
        cache.save().unwrap();

        let mut bridge = Bridge::new(&BridgeConfig {
            name: "test".to_string(),
            storage_path: temp_dir.path().to_path_buf(),
        });

        let (platform, calls) = RecordingPlatform::new(false);
        bridge.add_platform("test-plugin", "Recording", Box::new(platform));

        assert_eq!(calls.lock().unwrap().configured, vec![mine.accessory.uuid]);
        assert_eq!(calls.lock().unwrap().launched, 0);

        let state = bridge.state_snapshot();
        assert_eq!(state.accessories.len(), 1);
        assert_eq!(state.accessories[&mine.accessory.uuid].display_name, "Spa");
    }

    #[tokio::test]
    async fn test_registration_is_persisted_and_routed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut bridge = Bridge::new(&BridgeConfig {
            name: "test".to_string(),
            storage_path: temp_dir.path().to_path_buf(),
        });

        let (platform, calls) = RecordingPlatform::new(false);
        bridge.add_platform("test-plugin", "Recording", Box::new(platform));
        bridge.did_finish_launching();

        let accessory = cached("Spa", "Recording").accessory;
        bridge.handle_event(FromPlatformMessage::AccessoriesRegistered {
            plugin: "test-plugin".to_string(),
            platform: "Recording".to_string(),
            accessories: vec![accessory.clone()],
        });

        let reloaded = AccessoryCache::load(temp_dir.path()).unwrap();
        assert_eq!(reloaded.get(accessory.uuid).unwrap().platform, "Recording");

        bridge.send_command(set_on(accessory.uuid)).unwrap();
        bridge.shutdown().await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.launched, 1);
        assert_eq!(calls.messages.len(), 1);
        assert_eq!(calls.messages[0].accessory_uuid(), accessory.uuid);
        assert!(calls.shutdown);
    }

    #[tokio::test]
    async fn test_characteristic_updates_state() {
        let temp_dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(&BridgeConfig {
            name: "test".to_string(),
            storage_path: temp_dir.path().to_path_buf(),
        });

        let accessory = cached("Spa", "Recording").accessory;
        bridge.handle_event(FromPlatformMessage::AccessoriesRegistered {
            plugin: "test-plugin".to_string(),
            platform: "Recording".to_string(),
            accessories: vec![accessory.clone()],
        });
        bridge.handle_event(FromPlatformMessage::CharacteristicChanged {
            uuid: accessory.uuid,
            service_type: ServiceType::Switch,
            subtype: Some("pump1".to_string()),
            characteristic: Characteristic::On,
            value: CharacteristicValue::Bool(true),
        });

        // Unknown accessories are ignored
        bridge.handle_event(FromPlatformMessage::CharacteristicChanged {
            uuid: Uuid::nil(),
            service_type: ServiceType::Switch,
            subtype: None,
            characteristic: Characteristic::On,
            value: CharacteristicValue::Bool(true),
        });

        let state = bridge.state_snapshot();
        assert_eq!(state.accessories.len(), 1);
        assert_eq!(
            state.accessories[&accessory.uuid].characteristics["Switch/pump1.On"],
            CharacteristicValue::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_launch_failure_does_not_stop_platform() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut cache = AccessoryCache::new(temp_dir.path());
        let spa = cached("Spa", "Recording");
        cache.upsert(spa.clone());
        cache.save().unwrap();

        let mut bridge = Bridge::new(&BridgeConfig {
            name: "test".to_string(),
            storage_path: temp_dir.path().to_path_buf(),
        });

        let (platform, calls) = RecordingPlatform::new(true);
        bridge.add_platform("test-plugin", "Recording", Box::new(platform));
        bridge.did_finish_launching();

        bridge.send_command(set_on(spa.accessory.uuid)).unwrap();
        bridge.shutdown().await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.launched, 1);
        assert_eq!(calls.messages.len(), 1);
        assert!(calls.shutdown);
    }

    #[tokio::test]
    async fn test_command_for_unknown_accessory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(&BridgeConfig {
            name: "test".to_string(),
            storage_path: temp_dir.path().to_path_buf(),
        });

        let err = bridge.send_command(set_on(Uuid::nil())).unwrap_err();
        assert!(matches!(err, HostError::UnknownAccessory(_)));
    }

    #[tokio::test]
    async fn test_duplicate_platform_is_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut bridge = Bridge::new(&BridgeConfig {
            name: "test".to_string(),
            storage_path: temp_dir.path().to_path_buf(),
        });

        let (first, _) = RecordingPlatform::new(false);
        let (second, second_calls) = RecordingPlatform::new(false);
        bridge.add_platform("test-plugin", "Recording", Box::new(first));
        bridge.add_platform("test-plugin", "Recording", Box::new(second));
        bridge.did_finish_launching();
        bridge.shutdown().await;

        assert_eq!(second_calls.lock().unwrap().launched, 0);
    }

    #[tokio::test]
    async fn test_corrupt_cache_starts_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("accessories");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("cachedAccessories.json"), "[{").unwrap();

        let bridge = Bridge::new(&BridgeConfig {
            name: "test".to_string(),
            storage_path: temp_dir.path().to_path_buf(),
        });
        assert!(bridge.state_snapshot().accessories.is_empty());
    }
}
