// 核心版本探测
//
// 以控制器地址为键缓存 /version 结果，用于判断核心是否支持 Meta 扩展功能

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;

use super::api_client::ControllerApi;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub premium: bool,
}

// 核心能力（决定表单高级区块是否显示）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub meta: bool,
}

impl From<&VersionInfo> for Capabilities {
    fn from(info: &VersionInfo) -> Self {
        Self { meta: info.meta }
    }
}

#[derive(Default)]
pub struct VersionProbe {
    cache: RwLock<HashMap<String, VersionInfo>>,
}

impl VersionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    // 查询版本（命中缓存则不发请求），失败不缓存
    pub async fn probe(&self, api: &dyn ControllerApi) -> Option<VersionInfo> {
        let key = api.endpoint().cache_key();

        if let Some(info) = self.cached(&key) {
            return Some(info);
        }

        match api.fetch_version().await {
            Ok(info) => {
                log::info!(
                    "核心版本：{}（meta：{}）",
                    if info.version.is_empty() { "未知" } else { info.version.as_str() },
                    info.meta
                );
                let mut cache = self.cache.write().unwrap_or_else(|e| {
                    log::warn!("版本缓存锁中毒，正在恢复");
                    e.into_inner()
                });
                cache.insert(key, info.clone());
                Some(info)
            }
            Err(e) => {
                log::warn!("版本探测失败，高级选项将被隐藏：{}", e);
                None
            }
        }
    }

    pub async fn capabilities(&self, api: &dyn ControllerApi) -> Capabilities {
        self.probe(api)
            .await
            .map(|info| Capabilities::from(&info))
            .unwrap_or_default()
    }

    fn cached(&self, key: &str) -> Option<VersionInfo> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(key).cloned()
    }

    // 切换后端或核心重启后清除缓存
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.clear();
    }
}
