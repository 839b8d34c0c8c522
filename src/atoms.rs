// L0 原子层：与 Clash 外部控制器直接交互的基础能力

pub mod api_client;
pub mod api_config;
pub mod config_snapshot;
pub mod log_stream;
pub mod version_probe;

pub use api_client::{ClashApiClient, ControllerApi};
pub use api_config::{ApiConfig, DEFAULT_BASE_URL};
pub use config_snapshot::{
    ConfigPatch, ConfigSnapshot, LogLevel, Mode, PortField, Reported, TunConfig, TunStack, WireEnum,
};
pub use log_stream::{LogEntry, LogStream, LogSubscription};
pub use version_probe::{Capabilities, VersionInfo, VersionProbe};
