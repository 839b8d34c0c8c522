// Clash 核心设置管理
//
// 分层：atoms（与外部控制器交互）→ molecules（表单与偏好设置）→ coordinator（会话编排）

pub mod atoms;
pub mod coordinator;
pub mod error;
pub mod logger;
pub mod molecules;
pub mod services;

#[cfg(test)]
mod testing;

pub use coordinator::{BackendOverride, SettingsCoordinator};
pub use error::{ApiError, FormError, PreferenceError};
