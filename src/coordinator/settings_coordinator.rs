// 设置协调器：编排偏好设置、后端选择、API 客户端与表单

use std::sync::Arc;

use crate::atoms::{
    ApiConfig, ClashApiClient, ConfigSnapshot, ControllerApi, LogEntry, LogStream, VersionProbe,
};
use crate::error::FormError;
use crate::molecules::{DelayTester, PreferenceStore, SettingsForm};

// 命令行参数或环境变量指定的后端
#[derive(Debug, Clone, Default)]
pub struct BackendOverride {
    pub base_url: Option<String>,
    pub secret: Option<String>,
}

// 解析当前后端：显式指定 > 已选后端 > 默认地址
pub fn resolve_backend(preferences: &PreferenceStore, explicit: &BackendOverride) -> ApiConfig {
    if let Some(base_url) = &explicit.base_url {
        return ApiConfig::new(base_url.clone(), explicit.secret.clone());
    }

    let mut api = preferences.selected_backend().unwrap_or_default();
    // 单独指定的密钥覆盖已保存的密钥
    if let Some(secret) = explicit.secret.clone().filter(|s| !s.is_empty()) {
        api.secret = Some(secret);
    }
    api
}

pub struct SettingsCoordinator {
    preferences: Arc<PreferenceStore>,
    api: Arc<dyn ControllerApi>,
    probe: VersionProbe,
    form: SettingsForm,
    snapshot: Option<Arc<ConfigSnapshot>>,
}

impl SettingsCoordinator {
    // 连接到解析出的后端并完成首次同步
    pub async fn connect(
        preferences: Arc<PreferenceStore>,
        explicit: &BackendOverride,
    ) -> Result<Self, FormError> {
        let backend = resolve_backend(&preferences, explicit);
        log::info!("连接 Clash 外部控制器：{}", backend.base_url);

        let client = ClashApiClient::new(backend)?;
        Self::with_api(preferences, Arc::new(client)).await
    }

    pub async fn with_api(
        preferences: Arc<PreferenceStore>,
        api: Arc<dyn ControllerApi>,
    ) -> Result<Self, FormError> {
        let form = SettingsForm::new(Arc::clone(&api), Arc::clone(&preferences));

        let mut coordinator = Self {
            preferences,
            api,
            probe: VersionProbe::new(),
            form,
            snapshot: None,
        };

        coordinator.refresh().await?;
        coordinator.form.refresh_capabilities(&coordinator.probe).await;
        Ok(coordinator)
    }

    // 重新拉取配置快照并同步表单，返回表单是否被覆盖
    pub async fn refresh(&mut self) -> Result<bool, FormError> {
        let snapshot = Arc::new(self.api.fetch_configs().await?);
        let is_synced = self.form.sync(&snapshot);
        self.snapshot = Some(snapshot);
        Ok(is_synced)
    }

    pub fn form(&self) -> &SettingsForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut SettingsForm {
        &mut self.form
    }

    pub fn snapshot(&self) -> Option<&Arc<ConfigSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.preferences
    }

    pub fn endpoint(&self) -> &ApiConfig {
        self.api.endpoint()
    }

    // 以偏好设置中的测试地址构造延迟测试器
    pub fn delay_tester(&self) -> DelayTester {
        DelayTester::new(Arc::clone(&self.api), self.preferences.latency_test_url())
    }

    // 以当前日志级别订阅日志流，并让表单的日志级别切换驱动重新订阅
    pub fn attach_log_stream<F>(&mut self, on_entry: F) -> Result<Arc<LogStream>, FormError>
    where
        F: Fn(LogEntry) + Send + Sync + 'static,
    {
        let stream = Arc::new(LogStream::new(self.api.endpoint().clone(), on_entry));
        // 未知级别按默认级别订阅
        let level = self.form.local().log_level.known().unwrap_or_default();
        stream.start(level)?;
        self.form.set_log_subscription(stream.clone());
        Ok(stream)
    }
}
