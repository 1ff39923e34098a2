use std::path::PathBuf;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Bridge channel closed")]
    ChannelClosed,

    #[error("No platform found for accessory: {0}")]
    UnknownAccessory(Uuid),

    #[error("Failed to access accessory cache {0}: {1}")]
    CacheIo(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse accessory cache {0}: {1}")]
    CacheFormat(PathBuf, #[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
