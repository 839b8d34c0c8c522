// 应用偏好设置
//
// 与核心配置相互独立：图表样式、延迟测试地址、界面语言以及已保存的后端列表。
// 每次修改后立即写回磁盘，写入失败只记录日志。

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::atoms::ApiConfig;
use crate::error::PreferenceError;

pub const DEFAULT_LATENCY_TEST_URL: &str = "http://www.gstatic.com/generate_204";

// 流量图表样式数量
pub const CHART_STYLE_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    #[default]
    En,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Zh, Language::En];

    pub fn code(&self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Language::Zh => "中文",
            Language::En => "English",
        }
    }

    // 接受 "zh"、"zh-CN"、"en_US" 等形式
    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|lang| lang.code() == primary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub backends: Vec<ApiConfig>,
    pub selected_backend: Option<usize>,
    pub selected_chart_style_index: usize,
    pub latency_test_url: String,
    pub language: Language,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            selected_backend: None,
            selected_chart_style_index: 0,
            latency_test_url: DEFAULT_LATENCY_TEST_URL.to_string(),
            language: Language::default(),
        }
    }
}

pub struct PreferenceStore {
    path: Option<PathBuf>,
    state: RwLock<Preferences>,
}

impl PreferenceStore {
    // 不落盘的存储（测试或临时会话）
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(Preferences::default()),
        }
    }

    // 从文件加载，文件不存在时使用默认值
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PreferenceError> {
        let path = path.into();

        let preferences = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let mut preferences: Preferences = serde_json::from_str(&content)?;
                preferences.sanitize();
                preferences
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("偏好设置文件不存在，使用默认值：{}", path.display());
                Preferences::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            state: RwLock::new(preferences),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Preferences {
        self.read().clone()
    }

    pub fn latency_test_url(&self) -> String {
        self.read().latency_test_url.clone()
    }

    pub fn set_latency_test_url(&self, url: &str) {
        self.update(|p| p.latency_test_url = url.to_string());
    }

    pub fn selected_chart_style_index(&self) -> usize {
        self.read().selected_chart_style_index
    }

    // 越界索引被忽略，返回是否生效
    pub fn select_chart_style(&self, index: usize) -> bool {
        if index >= CHART_STYLE_COUNT {
            log::debug!("忽略无效的图表样式索引：{}", index);
            return false;
        }
        self.update(|p| p.selected_chart_style_index = index);
        true
    }

    pub fn language(&self) -> Language {
        self.read().language
    }

    pub fn set_language(&self, language: Language) {
        self.update(|p| p.language = language);
    }

    pub fn backends(&self) -> Vec<ApiConfig> {
        self.read().backends.clone()
    }

    // 当前选中的后端
    pub fn selected_backend(&self) -> Option<ApiConfig> {
        let state = self.read();
        state
            .selected_backend
            .and_then(|index| state.backends.get(index).cloned())
    }

    // 添加后端（已存在则复用），返回其索引
    pub fn add_backend(&self, api: ApiConfig) -> usize {
        let mut index = 0;
        self.update(|p| {
            index = match p.backends.iter().position(|b| *b == api) {
                Some(existing) => existing,
                None => {
                    p.backends.push(api);
                    p.backends.len() - 1
                }
            };
        });
        index
    }

    pub fn select_backend(&self, index: usize) -> Result<ApiConfig, PreferenceError> {
        let mut selected = None;
        self.update(|p| {
            if let Some(api) = p.backends.get(index) {
                selected = Some(api.clone());
                p.selected_backend = Some(index);
            }
        });

        selected.ok_or_else(|| PreferenceError::BackendIndex {
            index,
            len: self.read().backends.len(),
        })
    }

    // 切换后端：清除当前选择，下次启动需重新选择
    pub fn clear_selected_backend(&self) {
        self.update(|p| p.selected_backend = None);
    }

    pub fn save(&self) -> Result<(), PreferenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&*self.read())?;

        // 先写同目录临时文件再重命名，中断时不会留下半截文件
        let temp_path = path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, path)?;
        log::trace!("偏好设置已保存：{}", path.display());
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut Preferences)) {
        {
            let mut state = self.write();
            f(&mut state);
        }

        if let Err(e) = self.save() {
            log::error!("保存偏好设置失败：{}", e);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Preferences> {
        self.state.read().unwrap_or_else(|e| {
            log::warn!("偏好设置锁中毒，正在恢复");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Preferences> {
        self.state.write().unwrap_or_else(|e| {
            log::warn!("偏好设置锁中毒，正在恢复");
            e.into_inner()
        })
    }
}

impl Preferences {
    // 修正手工编辑导致的越界值
    fn sanitize(&mut self) {
        if self.selected_chart_style_index >= CHART_STYLE_COUNT {
            self.selected_chart_style_index = 0;
        }
        if self
            .selected_backend
            .is_some_and(|index| index >= self.backends.len())
        {
            self.selected_backend = None;
        }
        if self.latency_test_url.is_empty() {
            self.latency_test_url = DEFAULT_LATENCY_TEST_URL.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::load(dir.path().join("preferences.json")).unwrap();

        let prefs = store.snapshot();
        assert_eq!(prefs.latency_test_url, DEFAULT_LATENCY_TEST_URL);
        assert_eq!(prefs.language, Language::En);
        assert_eq!(store.selected_backend(), None);
    }

    #[test]
    fn test_changes_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        let store = PreferenceStore::load(&path).unwrap();
        store.set_latency_test_url("https://cp.cloudflare.com");
        store.set_language(Language::Zh);
        assert!(store.select_chart_style(3));
        let index = store.add_backend(ApiConfig::new("http://192.168.1.2:9090", None));
        store.select_backend(index).unwrap();

        let reloaded = PreferenceStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
        assert_eq!(
            reloaded.selected_backend().map(|b| b.base_url),
            Some("http://192.168.1.2:9090".to_string())
        );
    }

    #[test]
    fn test_save_replaces_file_through_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        let temp_path = dir.path().join("preferences.json.tmp");

        // 上次中断残留的临时文件
        std::fs::write(&temp_path, "{\"latencyTes").unwrap();
        std::fs::write(&path, r#"{"language":"zh"}"#).unwrap();

        let store = PreferenceStore::load(&path).unwrap();
        assert_eq!(store.language(), Language::Zh);

        store.set_latency_test_url("https://cp.cloudflare.com");
        assert!(!temp_path.exists());

        let reloaded = PreferenceStore::load(&path).unwrap().snapshot();
        assert_eq!(reloaded.latency_test_url, "https://cp.cloudflare.com");
        assert_eq!(reloaded.language, Language::Zh);
    }

    #[test]
    fn test_out_of_range_values_are_ignored() {
        let store = PreferenceStore::in_memory();
        assert!(!store.select_chart_style(CHART_STYLE_COUNT));
        assert_eq!(store.selected_chart_style_index(), 0);

        assert!(matches!(
            store.select_backend(0),
            Err(PreferenceError::BackendIndex { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_backend_dedup_and_switch() {
        let store = PreferenceStore::in_memory();
        let a = store.add_backend(ApiConfig::default());
        let b = store.add_backend(ApiConfig::new("http://10.0.0.2:9090", None));
        assert_eq!(store.add_backend(ApiConfig::default()), a);
        assert_eq!(store.backends().len(), 2);

        store.select_backend(b).unwrap();
        assert!(store.selected_backend().is_some());
        store.clear_selected_backend();
        assert_eq!(store.selected_backend(), None);
    }

    #[test]
    fn test_sanitize_corrupted_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(
            &path,
            r#"{"selectedBackend":4,"selectedChartStyleIndex":9,"latencyTestUrl":""}"#,
        )
        .unwrap();

        let prefs = PreferenceStore::load(&path).unwrap().snapshot();
        assert_eq!(prefs.selected_backend, None);
        assert_eq!(prefs.selected_chart_style_index, 0);
        assert_eq!(prefs.latency_test_url, DEFAULT_LATENCY_TEST_URL);
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("zh-CN"), Some(Language::Zh));
        assert_eq!(Language::from_code("en_US"), Some(Language::En));
        assert_eq!(Language::from_code("fr"), None);
    }
}
