pub mod api;
pub mod config;
mod host;
mod platforms;

pub use config::Config;
pub use config::LogLevel;
pub use host::AccessoryState;
pub use host::Bridge;
pub use host::HostError;
pub use host::State;
pub use host::StateHandle;
