// L2 协调层模块入口

pub mod settings_coordinator;

pub use settings_coordinator::{BackendOverride, SettingsCoordinator, resolve_backend};
