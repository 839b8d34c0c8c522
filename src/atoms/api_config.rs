// Clash 外部控制器地址

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9090";

// 一个后端（外部控制器）的连接信息
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            secret: None,
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            // 空密钥等同于未设置
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    // 拼接 REST 路径，保留 base_url 中可能存在的路径前缀
    pub fn url(&self, path: &str) -> ApiResult<Url> {
        let raw = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|e| ApiError::InvalidEndpoint(format!("{}（{}）", raw, e)))
    }

    // WebSocket 地址：http → ws，https → wss，密钥通过 token 查询参数传递
    pub fn ws_url(&self, path: &str) -> ApiResult<Url> {
        let mut url = self.url(path)?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ApiError::InvalidEndpoint(format!(
                    "不支持的协议：{}",
                    other
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ApiError::InvalidEndpoint(self.base_url.clone()))?;

        if let Some(secret) = &self.secret {
            url.query_pairs_mut().append_pair("token", secret);
        }

        Ok(url)
    }

    // 版本探测缓存键
    pub fn cache_key(&self) -> String {
        format!(
            "{}#{}",
            self.base_url.trim_end_matches('/'),
            self.secret.as_deref().unwrap_or_default()
        )
    }
}
