// 测试用内存实现

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::atoms::{
    ApiConfig, ConfigPatch, ConfigSnapshot, ControllerApi, LogLevel, LogSubscription, VersionInfo,
};
use crate::error::{ApiError, ApiResult};

// 记录所有请求的 ControllerApi
pub(crate) struct MockApi {
    endpoint: ApiConfig,
    snapshot: ConfigSnapshot,
    version: Option<VersionInfo>,
    is_patch_failing: bool,
    patches: Mutex<Vec<Value>>,
    calls: Mutex<Vec<&'static str>>,
    version_calls: AtomicUsize,
    delays: Mutex<HashMap<String, VecDeque<Result<u32, u16>>>>,
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self {
            endpoint: ApiConfig::default(),
            snapshot: ConfigSnapshot::default(),
            version: Some(VersionInfo::default()),
            is_patch_failing: false,
            patches: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            version_calls: AtomicUsize::new(0),
            delays: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn with_snapshot(mut self, snapshot: ConfigSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub(crate) fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = Some(version);
        self
    }

    pub(crate) fn failing_version(mut self) -> Self {
        self.version = None;
        self
    }

    pub(crate) fn failing_patch(mut self) -> Self {
        self.is_patch_failing = true;
        self
    }

    // 依次返回的延迟结果，Err 为 HTTP 状态码
    pub(crate) fn with_delays(self, proxy: &str, results: Vec<Result<u32, u16>>) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(proxy.to_string(), results.into());
        self
    }

    pub(crate) fn patches(&self) -> Vec<Value> {
        self.patches.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ControllerApi for MockApi {
    fn endpoint(&self) -> &ApiConfig {
        &self.endpoint
    }

    async fn fetch_configs(&self) -> ApiResult<ConfigSnapshot> {
        self.record("fetch_configs");
        Ok(self.snapshot.clone())
    }

    async fn patch_configs(&self, patch: &ConfigPatch) -> ApiResult<()> {
        self.record("patch_configs");
        self.patches.lock().unwrap().push(patch.clone().into_value());
        if self.is_patch_failing {
            return Err(ApiError::Status {
                status: 400,
                body: "{\"message\":\"Body invalid\"}".to_string(),
            });
        }
        Ok(())
    }

    async fn fetch_version(&self) -> ApiResult<VersionInfo> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        self.version.clone().ok_or(ApiError::Status {
            status: 404,
            body: String::new(),
        })
    }

    async fn reload_configs(&self) -> ApiResult<()> {
        self.record("reload_configs");
        Ok(())
    }

    async fn update_geo_databases(&self) -> ApiResult<()> {
        self.record("update_geo_databases");
        Ok(())
    }

    async fn flush_fakeip_pool(&self) -> ApiResult<()> {
        self.record("flush_fakeip_pool");
        Ok(())
    }

    async fn proxy_delay(
        &self,
        proxy_name: &str,
        _test_url: &str,
        _timeout_ms: u32,
    ) -> ApiResult<u32> {
        self.record("proxy_delay");
        let next = self
            .delays
            .lock()
            .unwrap()
            .get_mut(proxy_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Err(404));
        next.map_err(|status| ApiError::Status {
            status,
            body: String::new(),
        })
    }
}

// 记录日志级别切换
#[derive(Default)]
pub(crate) struct RecordingLogs {
    levels: Mutex<Vec<LogLevel>>,
}

impl RecordingLogs {
    pub(crate) fn levels(&self) -> Vec<LogLevel> {
        self.levels.lock().unwrap().clone()
    }
}

impl LogSubscription for RecordingLogs {
    fn set_level(&self, level: LogLevel) {
        self.levels.lock().unwrap().push(level);
    }
}
