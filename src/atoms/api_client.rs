// Clash 外部控制器 REST 客户端
//
// 表单只依赖 ControllerApi trait，测试中可替换为内存实现

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use super::api_config::ApiConfig;
use super::config_snapshot::{ConfigPatch, ConfigSnapshot};
use super::version_probe::VersionInfo;
use crate::error::{ApiError, ApiResult};

// 请求超时（秒）
const REQUEST_TIMEOUT_SECS: u64 = 10;
// 连接失败时的最大重试次数
const MAX_RETRIES: usize = 2;
const RETRY_DELAY_MS: u64 = 200;
// 延迟测试在核心超时之外额外等待的时间
const DELAY_TIMEOUT_MARGIN_MS: u64 = 2000;

#[async_trait]
pub trait ControllerApi: Send + Sync {
    // 当前连接的后端
    fn endpoint(&self) -> &ApiConfig;

    // GET /configs
    async fn fetch_configs(&self) -> ApiResult<ConfigSnapshot>;

    // PATCH /configs
    async fn patch_configs(&self, patch: &ConfigPatch) -> ApiResult<()>;

    // GET /version
    async fn fetch_version(&self) -> ApiResult<VersionInfo>;

    // PUT /configs?force=true，重新加载配置文件
    async fn reload_configs(&self) -> ApiResult<()>;

    // POST /configs/geo
    async fn update_geo_databases(&self) -> ApiResult<()>;

    // POST /cache/fakeip/flush
    async fn flush_fakeip_pool(&self) -> ApiResult<()>;

    // GET /proxies/{name}/delay，返回延迟毫秒数
    async fn proxy_delay(&self, proxy_name: &str, test_url: &str, timeout_ms: u32)
    -> ApiResult<u32>;
}

#[derive(Deserialize)]
struct DelayResponse {
    delay: u32,
}

// 基于 reqwest 的实现
pub struct ClashApiClient {
    api: ApiConfig,
    client: Client,
}

impl ClashApiClient {
    pub fn new(api: ApiConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .no_proxy() // 控制器通常在本机，不走系统代理
            .build()?;

        Ok(Self { api, client })
    }

    // 发送请求（连接失败时自动重试）
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> ApiResult<String> {
        let mut attempt = 0;

        loop {
            match self.execute(method.clone(), path, body, timeout).await {
                Err(ApiError::Http(e)) if e.is_connect() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    log::warn!(
                        "Clash API {} 连接失败（第 {} 次尝试），{}ms 后重试：{}，error：{}",
                        method,
                        attempt,
                        RETRY_DELAY_MS,
                        path,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                }
                Err(e) => {
                    if e.is_busy() {
                        log::debug!("Clash API {} 核心繁忙：{}，{}", method, path, e);
                    } else {
                        log::error!("Clash API {} 请求失败：{}，error：{}", method, path, e);
                    }
                    return Err(e);
                }
                Ok(text) => return Ok(text),
            }
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> ApiResult<String> {
        let url = self.api.url(path)?;
        log::trace!("Clash API {} {}", method, url);

        let mut builder = self.client.request(method, url);
        if let Some(secret) = &self.api.secret {
            builder = builder.bearer_auth(secret);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.len() > 200 {
            let preview = text.chars().take(100).collect::<String>();
            log::trace!("响应体内容（截断）：{}…[总长度：{}字节]", preview, text.len());
        } else {
            log::trace!("响应体内容：{}", text);
        }

        Ok(text)
    }
}

#[async_trait]
impl ControllerApi for ClashApiClient {
    fn endpoint(&self) -> &ApiConfig {
        &self.api
    }

    async fn fetch_configs(&self) -> ApiResult<ConfigSnapshot> {
        let body = self.request(Method::GET, "/configs", None, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn patch_configs(&self, patch: &ConfigPatch) -> ApiResult<()> {
        log::info!("更新核心配置：{}", patch);
        let body = patch.clone().into_value();
        self.request(Method::PATCH, "/configs", Some(&body), None)
            .await
            .map(|_| ())
    }

    async fn fetch_version(&self) -> ApiResult<VersionInfo> {
        let body = self.request(Method::GET, "/version", None, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn reload_configs(&self) -> ApiResult<()> {
        log::info!("重新加载核心配置文件");
        let body = json!({ "path": "", "payload": "" });
        self.request(Method::PUT, "/configs?force=true", Some(&body), None)
            .await
            .map(|_| ())
    }

    async fn update_geo_databases(&self) -> ApiResult<()> {
        log::info!("更新 GEO 数据库");
        let body = json!({ "path": "", "payload": "" });
        self.request(Method::POST, "/configs/geo", Some(&body), None)
            .await
            .map(|_| ())
    }

    async fn flush_fakeip_pool(&self) -> ApiResult<()> {
        log::info!("清空 FakeIP 地址池");
        self.request(Method::POST, "/cache/fakeip/flush", None, None)
            .await
            .map(|_| ())
    }

    async fn proxy_delay(
        &self,
        proxy_name: &str,
        test_url: &str,
        timeout_ms: u32,
    ) -> ApiResult<u32> {
        let path = format!(
            "/proxies/{}/delay?timeout={}&url={}",
            urlencoding::encode(proxy_name),
            timeout_ms,
            urlencoding::encode(test_url)
        );
        let timeout = Duration::from_millis(u64::from(timeout_ms) + DELAY_TIMEOUT_MARGIN_MS);

        let body = self.request(Method::GET, &path, None, Some(timeout)).await?;
        let response: DelayResponse = serde_json::from_str(&body)?;
        Ok(response.delay)
    }
}
