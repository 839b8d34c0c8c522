// Clash 日志流订阅
//
// 通过 WebSocket 连接 /logs?level=<level>，切换级别时以新级别重新订阅

use futures_util::stream::StreamExt;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use super::api_config::ApiConfig;
use super::config_snapshot::LogLevel;
use crate::error::{ApiError, ApiResult};

// 表单只需要能切换日志级别
pub trait LogSubscription: Send + Sync {
    fn set_level(&self, level: LogLevel);
}

// 核心推送的一条日志
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type", default = "default_log_type")]
    pub log_type: String,
    #[serde(default)]
    pub payload: String,
}

fn default_log_type() -> String {
    "info".to_string()
}

type LogCallback = Arc<dyn Fn(LogEntry) + Send + Sync>;

pub struct LogStream {
    api: ApiConfig,
    on_entry: LogCallback,
    level: Mutex<LogLevel>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LogStream {
    pub fn new<F>(api: ApiConfig, on_entry: F) -> Self
    where
        F: Fn(LogEntry) + Send + Sync + 'static,
    {
        Self {
            api,
            on_entry: Arc::new(on_entry),
            level: Mutex::new(LogLevel::default()),
            task: Mutex::new(None),
        }
    }

    pub fn stream_url(api: &ApiConfig, level: LogLevel) -> ApiResult<Url> {
        api.ws_url(&format!("/logs?level={}", level))
    }

    pub fn level(&self) -> LogLevel {
        *self.level.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // 以指定级别开始订阅（已有订阅会被替换），silent 表示不订阅
    pub fn start(&self, level: LogLevel) -> ApiResult<()> {
        let url = Self::stream_url(&self.api, level)?;

        *self.level.lock().unwrap_or_else(|e| e.into_inner()) = level;
        self.stop();

        if level == LogLevel::Silent {
            log::info!("日志级别为 silent，不订阅日志流");
            return Ok(());
        }

        let on_entry = Arc::clone(&self.on_entry);
        let handle = tokio::spawn(async move {
            if let Err(e) = run_stream(url, on_entry).await {
                log::error!("日志流 WebSocket 连接失败：{}", e);
            }
        });

        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        log::info!("开始监听日志数据（级别：{}）", level);
        Ok(())
    }

    pub fn stop(&self) {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            log::debug!("日志流订阅已停止");
        }
    }
}

impl LogSubscription for LogStream {
    fn set_level(&self, level: LogLevel) {
        if let Err(e) = self.start(level) {
            log::error!("切换日志级别失败：{}", e);
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// 消息接收循环
async fn run_stream(url: Url, on_entry: LogCallback) -> ApiResult<()> {
    log::debug!("开始建立 WebSocket 连接：{}", url.path());

    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| ApiError::WebSocket(format!("WebSocket 握手失败：{}", e)))?;

    log::info!("日志流 WebSocket 连接建立成功");

    let (_writer, mut reader) = ws_stream.split();

    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<LogEntry>(&text) {
                Ok(entry) => on_entry(entry),
                Err(e) => log::error!("日志消息 JSON 解析失败：{}", e),
            },
            Ok(Message::Close(close_frame)) => {
                log::info!("日志流 WebSocket 连接关闭：{:?}", close_frame);
                break;
            }
            // Ping/Pong 由 tokio-tungstenite 自动处理
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Binary(data)) => {
                log::debug!("日志流收到二进制消息：{}bytes", data.len());
            }
            Err(e) => {
                return Err(ApiError::WebSocket(format!("消息读取错误：{}", e)));
            }
        }
    }

    log::debug!("日志流消息接收循环已结束");
    Ok(())
}
