//! Persistent accessory cache.
//!
//! Accessories survive restarts by being written to
//! `<storage_path>/accessories/cachedAccessories.json`. On startup the bridge
//! hands every cached record back to the platform that created it.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::accessory::PlatformAccessory;
use super::error::HostError;
use super::error::Result;

const CACHE_DIR: &str = "accessories";
const CACHE_FILE: &str = "cachedAccessories.json";

/// One cached record together with its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAccessory {
    pub plugin: String,
    pub platform: String,
    pub accessory: PlatformAccessory,
}

#[derive(Debug)]
pub struct AccessoryCache {
    path: PathBuf,
    entries: Vec<CachedAccessory>,
}

impl AccessoryCache {
    /// Empty cache that will be written below `storage_path`
    pub fn new(storage_path: &Path) -> Self {
        Self {
            path: storage_path.join(CACHE_DIR).join(CACHE_FILE),
            entries: Vec::new(),
        }
    }

    /// Load the cache from disk; a missing file yields an empty cache
    pub fn load(storage_path: &Path) -> Result<Self> {
        let mut cache = Self::new(storage_path);

        let contents = match std::fs::read_to_string(&cache.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No accessory cache at {}", cache.path.display());
                return Ok(cache);
            }
            Err(e) => return Err(HostError::CacheIo(cache.path.clone(), e)),
        };

        cache.entries = serde_json::from_str(&contents)
            .map_err(|e| HostError::CacheFormat(cache.path.clone(), e))?;
        debug!(
            "Loaded {} cached accessories from {}",
            cache.entries.len(),
            cache.path.display()
        );

        Ok(cache)
    }

    /// Write the cache atomically (temp file + rename)
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| HostError::CacheIo(dir.to_path_buf(), e))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| HostError::CacheFormat(self.path.clone(), e))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| HostError::CacheIo(tmp.clone(), e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| HostError::CacheIo(self.path.clone(), e))?;

        Ok(())
    }

    pub fn entries(&self) -> &[CachedAccessory] {
        &self.entries
    }

    /// Cached accessories owned by one plugin/platform pair
    pub fn for_platform<'a>(
        &'a self,
        plugin: &'a str,
        platform: &'a str,
    ) -> impl Iterator<Item = &'a PlatformAccessory> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.plugin == plugin && e.platform == platform)
            .map(|e| &e.accessory)
    }

    #[cfg(test)]
    pub fn get(&self, uuid: uuid::Uuid) -> Option<&CachedAccessory> {
        self.entries.iter().find(|e| e.accessory.uuid == uuid)
    }

    /// Insert or replace (by UUID) a cached accessory
    pub fn upsert(&mut self, entry: CachedAccessory) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.accessory.uuid == entry.accessory.uuid)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Replace the accessory of an existing entry, keeping its owner.
    ///
    /// Returns false if the accessory is not cached.
    pub fn update(&mut self, accessory: PlatformAccessory) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.accessory.uuid == accessory.uuid)
        {
            Some(existing) => {
                existing.accessory = accessory;
                true
            }
            None => false,
        }
    }
}
