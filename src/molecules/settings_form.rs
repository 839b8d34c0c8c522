// 设置表单控制器
//
// 持有核心配置的本地可编辑副本：
// - 即时控件（模式、日志级别、局域网、嗅探、TUN 开关/网络栈）修改后立即下发局部更新
// - 文本输入在失焦时校验并提交，端口非法时静默丢弃，设备名与出口网卡不提交
// - 上游快照只有在引用变化时才覆盖本地副本
// - 重载配置、更新 GEO、清空 FakeIP、切换后端均为即发即弃的后台任务

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

use super::preferences::{Language, PreferenceStore};
use crate::atoms::{
    Capabilities, ConfigPatch, ConfigSnapshot, ControllerApi, LogLevel, LogSubscription, Mode,
    PortField, TunStack, VersionProbe,
};
use crate::error::{ApiResult, FormError};

// 失焦提交的字段名（与界面 input name 一致）
pub const LATENCY_TEST_URL_FIELD: &str = "latencyTestUrl";
pub const DEVICE_NAME_FIELD: &str = "device name";
pub const INTERFACE_NAME_FIELD: &str = "interface name";

// 即时生效的控件变更
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    Mode(Mode),
    LogLevel(LogLevel),
    AllowLan(bool),
    Sniffing(bool),
    TunEnable(bool),
    TunStack(TunStack),
}

impl FieldChange {
    // 由字段名和文本值构造（命令行入口使用）
    pub fn parse(name: &str, value: &str) -> Result<Self, FormError> {
        let invalid = || FormError::InvalidValue {
            field: name.to_string(),
            value: value.to_string(),
        };

        let change = match name {
            "mode" => FieldChange::Mode(value.parse().map_err(|_| invalid())?),
            "log-level" => FieldChange::LogLevel(value.parse().map_err(|_| invalid())?),
            "allow-lan" => FieldChange::AllowLan(parse_switch(value).ok_or_else(invalid)?),
            "sniffing" => FieldChange::Sniffing(parse_switch(value).ok_or_else(invalid)?),
            "enable" | "tun-enable" => {
                FieldChange::TunEnable(parse_switch(value).ok_or_else(invalid)?)
            }
            "stack" | "tun-stack" => FieldChange::TunStack(value.parse().map_err(|_| invalid())?),
            _ => return Err(FormError::UnknownField(name.to_string())),
        };

        Ok(change)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldChange::Mode(_) => "mode",
            FieldChange::LogLevel(_) => "log-level",
            FieldChange::AllowLan(_) => "allow-lan",
            FieldChange::Sniffing(_) => "sniffing",
            FieldChange::TunEnable(_) => "enable",
            FieldChange::TunStack(_) => "stack",
        }
    }

    // 仅包含本字段的局部更新，TUN 字段嵌套在 tun 下
    pub fn patch(&self) -> ConfigPatch {
        match *self {
            FieldChange::Mode(mode) => ConfigPatch::field("mode", mode.as_str()),
            FieldChange::LogLevel(level) => ConfigPatch::field("log-level", level.as_str()),
            FieldChange::AllowLan(on) => ConfigPatch::field("allow-lan", on),
            FieldChange::Sniffing(on) => ConfigPatch::field("sniffing", on),
            FieldChange::TunEnable(on) => ConfigPatch::tun("enable", on),
            FieldChange::TunStack(stack) => ConfigPatch::tun("stack", stack.as_str()),
        }
    }

    fn apply(&self, snapshot: &mut ConfigSnapshot) {
        match *self {
            FieldChange::Mode(mode) => snapshot.mode = mode.into(),
            FieldChange::LogLevel(level) => snapshot.log_level = level.into(),
            FieldChange::AllowLan(on) => snapshot.allow_lan = on,
            FieldChange::Sniffing(on) => snapshot.sniffing = on,
            FieldChange::TunEnable(on) => snapshot.tun_mut().enable = on,
            FieldChange::TunStack(stack) => snapshot.tun_mut().stack = Some(stack.into()),
        }
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Some(true),
        "false" | "off" | "0" | "no" => Some(false),
        _ => None,
    }
}

// 端口必须是 [0, 65535] 内的整数
fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse::<u16>().ok()
}

// 失焦提交的文本字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Port(PortField),
    LatencyTestUrl,
    DeviceName,
    InterfaceName,
}

impl TextField {
    pub fn from_name(name: &str) -> Result<Self, FormError> {
        if let Some(field) = PortField::from_key(name) {
            return Ok(TextField::Port(field));
        }

        match name {
            LATENCY_TEST_URL_FIELD => Ok(TextField::LatencyTestUrl),
            DEVICE_NAME_FIELD => Ok(TextField::DeviceName),
            INTERFACE_NAME_FIELD => Ok(TextField::InterfaceName),
            _ => Err(FormError::UnknownField(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextField::Port(field) => field.key(),
            TextField::LatencyTestUrl => LATENCY_TEST_URL_FIELD,
            TextField::DeviceName => DEVICE_NAME_FIELD,
            TextField::InterfaceName => INTERFACE_NAME_FIELD,
        }
    }
}

// 失焦提交的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    // 已向核心下发局部更新
    Dispatched(ConfigPatch),
    // 已写入应用偏好设置
    Preference,
    // 与当前值相同，无需提交
    Unchanged,
    // 输入非法，字段保持原值
    Rejected,
}

pub struct SettingsForm {
    api: Arc<dyn ControllerApi>,
    preferences: Arc<PreferenceStore>,
    log_subscription: Option<Arc<dyn LogSubscription>>,
    // 最近一次同步的上游快照（仅用于引用比较）
    upstream: Option<Arc<ConfigSnapshot>>,
    local: ConfigSnapshot,
    drafts: HashMap<TextField, String>,
    capabilities: Capabilities,
}

impl SettingsForm {
    pub fn new(api: Arc<dyn ControllerApi>, preferences: Arc<PreferenceStore>) -> Self {
        Self {
            api,
            preferences,
            log_subscription: None,
            upstream: None,
            local: ConfigSnapshot::default(),
            drafts: HashMap::new(),
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_log_subscription(mut self, subscription: Arc<dyn LogSubscription>) -> Self {
        self.set_log_subscription(subscription);
        self
    }

    pub fn set_log_subscription(&mut self, subscription: Arc<dyn LogSubscription>) {
        self.log_subscription = Some(subscription);
    }

    pub fn api(&self) -> &Arc<dyn ControllerApi> {
        &self.api
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn local(&self) -> &ConfigSnapshot {
        &self.local
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
    }

    pub async fn refresh_capabilities(&mut self, probe: &VersionProbe) -> Capabilities {
        self.capabilities = probe.capabilities(self.api.as_ref()).await;
        self.capabilities
    }

    // 正在编辑但尚未提交的文本
    pub fn draft(&self, field: TextField) -> Option<&str> {
        self.drafts.get(&field).map(String::as_str)
    }

    // 同步上游快照，仅在引用变化时覆盖本地副本，返回是否发生覆盖
    pub fn sync(&mut self, snapshot: &Arc<ConfigSnapshot>) -> bool {
        let is_changed = self
            .upstream
            .as_ref()
            .is_none_or(|previous| !Arc::ptr_eq(previous, snapshot));

        if is_changed {
            log::debug!("上游配置快照已更新，覆盖本地副本");
            self.local = ConfigSnapshot::clone(snapshot);
            self.drafts.clear();
            self.upstream = Some(Arc::clone(snapshot));
        }

        is_changed
    }

    // 即时控件变更：更新本地副本并立即下发仅含该字段的局部更新
    pub async fn on_change(&mut self, change: FieldChange) -> Result<ConfigPatch, FormError> {
        let patch = change.patch();
        change.apply(&mut self.local);

        if let FieldChange::LogLevel(level) = change
            && let Some(subscription) = &self.log_subscription
        {
            subscription.set_level(level);
        }

        log::debug!("字段 {} 已变更，下发局部更新", change.name());
        self.api.patch_configs(&patch).await?;
        Ok(patch)
    }

    // 输入过程中的草稿：端口只接受空串或合法端口，其余输入被拒绝，返回是否接受
    pub fn on_input(&mut self, name: &str, value: &str) -> Result<bool, FormError> {
        let field = TextField::from_name(name)?;

        if let TextField::Port(_) = field
            && !value.is_empty()
            && parse_port(value).is_none()
        {
            return Ok(false);
        }

        self.drafts.insert(field, value.to_string());
        Ok(true)
    }

    // 失焦提交：校验通过后下发局部更新或写入偏好设置
    // 未知字段名属于编程错误，返回 FormError::UnknownField
    pub async fn on_blur(&mut self, name: &str, value: &str) -> Result<Commit, FormError> {
        let field = TextField::from_name(name)?;
        self.drafts.remove(&field);

        match field {
            TextField::Port(port_field) => {
                let Some(port) = parse_port(value) else {
                    log::debug!("忽略非法端口输入：{}={}", port_field.key(), value);
                    return Ok(Commit::Rejected);
                };

                self.local.set_port(port_field, port);
                self.dispatch(ConfigPatch::field(port_field.key(), port))
                    .await
            }
            TextField::LatencyTestUrl => {
                let url = value.trim();
                let is_valid = Url::parse(url)
                    .map(|u| matches!(u.scheme(), "http" | "https"))
                    .unwrap_or(false);
                if !is_valid {
                    log::debug!("忽略非法延迟测试地址：{}", value);
                    return Ok(Commit::Rejected);
                }

                if self.preferences.latency_test_url() == url {
                    return Ok(Commit::Unchanged);
                }
                self.preferences.set_latency_test_url(url);
                log::info!("延迟测试地址已更新：{}", url);
                Ok(Commit::Preference)
            }
            // 设备名与出口网卡只读展示，失焦不提交
            TextField::DeviceName | TextField::InterfaceName => Ok(Commit::Unchanged),
        }
    }

    async fn dispatch(&self, patch: ConfigPatch) -> Result<Commit, FormError> {
        self.api.patch_configs(&patch).await?;
        Ok(Commit::Dispatched(patch))
    }

    // 重新加载配置文件
    pub fn reload_config(&self) -> JoinHandle<()> {
        self.spawn_action("重新加载配置文件", |api| async move {
            api.reload_configs().await
        })
    }

    // 更新 GEO 数据库
    pub fn update_geo_databases(&self) -> JoinHandle<()> {
        self.spawn_action("更新 GEO 数据库", |api| async move {
            api.update_geo_databases().await
        })
    }

    // 清空 FakeIP 地址池
    pub fn flush_fakeip_pool(&self) -> JoinHandle<()> {
        self.spawn_action("清空 FakeIP 地址池", |api| async move {
            api.flush_fakeip_pool().await
        })
    }

    // 切换后端：清除已选后端，由前端重新选择
    pub fn switch_backend(&self) -> JoinHandle<()> {
        let preferences = Arc::clone(&self.preferences);
        tokio::task::spawn_blocking(move || {
            preferences.clear_selected_backend();
            log::info!("已清除当前后端选择");
        })
    }

    pub fn select_chart_style(&self, index: usize) -> bool {
        self.preferences.select_chart_style(index)
    }

    // 切换界面语言，未知语言代码被忽略
    pub fn change_language(&self, code: &str) -> bool {
        match Language::from_code(code) {
            Some(language) => {
                self.preferences.set_language(language);
                true
            }
            None => {
                log::debug!("忽略未知语言代码：{}", code);
                false
            }
        }
    }

    fn spawn_action<F, Fut>(&self, action: &'static str, f: F) -> JoinHandle<()>
    where
        F: FnOnce(Arc<dyn ControllerApi>) -> Fut,
        Fut: Future<Output = ApiResult<()>> + Send + 'static,
    {
        let task = f(Arc::clone(&self.api));
        tokio::spawn(async move {
            match task.await {
                Ok(()) => log::info!("{}完成", action),
                Err(e) => log::error!("{}失败：{}", action, e),
            }
        })
    }
}
