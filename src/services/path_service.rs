// 应用文件路径管理服务，单例模式

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "clash-settings";
const PREFERENCES_FILE_NAME: &str = "preferences.json";

// 路径服务单例
pub static PATH_SERVICE: Lazy<PathService> = Lazy::new(|| {
    PathService::new().unwrap_or_else(|e| {
        log::warn!("路径服务初始化失败：{}，使用降级路径", e);
        PathService::fallback()
    })
});

pub struct PathService {
    // 应用配置目录（<config_dir>/clash-settings）
    config_dir: PathBuf,
    preferences_file: PathBuf,
}

impl PathService {
    pub fn new() -> Result<Self, String> {
        let base = dirs::config_dir().ok_or_else(|| "无法获取系统配置目录".to_string())?;
        Ok(Self::with_base(base))
    }

    // 以指定目录为根构造（测试或便携模式）
    pub fn with_base(base: impl AsRef<Path>) -> Self {
        let config_dir = base.as_ref().join(APP_DIR_NAME);
        let preferences_file = config_dir.join(PREFERENCES_FILE_NAME);

        Self {
            config_dir,
            preferences_file,
        }
    }

    // 降级路径：当前工作目录
    fn fallback() -> Self {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_base(current_dir)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn preferences_file(&self) -> &Path {
        &self.preferences_file
    }
}

// 获取偏好设置文件路径
pub fn preferences_file() -> PathBuf {
    PATH_SERVICE.preferences_file().to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_base() {
        let service = PathService::with_base("/tmp/cfg");
        assert_eq!(service.config_dir(), Path::new("/tmp/cfg/clash-settings"));
        assert_eq!(
            service.preferences_file(),
            Path::new("/tmp/cfg/clash-settings/preferences.json")
        );
    }

    #[test]
    fn test_singleton_resolves_preferences_file() {
        assert!(preferences_file().ends_with("clash-settings/preferences.json"));
    }
}
