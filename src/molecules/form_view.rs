// 表单视图模型
//
// 将表单当前状态渲染为分区的控件列表，前端（命令行或图形界面）据此展示

use std::fmt;

use super::preferences::{CHART_STYLE_COUNT, Language, Preferences};
use super::settings_form::{
    DEVICE_NAME_FIELD, INTERFACE_NAME_FIELD, LATENCY_TEST_URL_FIELD, SettingsForm, TextField,
};
use crate::atoms::{Capabilities, ConfigSnapshot, LogLevel, Mode, PortField, TunStack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    General,
    Tun,
    Actions,
    Preferences,
}

impl SectionKind {
    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::General => "General",
            SectionKind::Tun => "TUN",
            SectionKind::Actions => "Actions",
            SectionKind::Preferences => "Preferences",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Text { value: String },
    // 当前值不在选项中时不选中任何项
    Select {
        options: Vec<SelectOption>,
        selected: Option<String>,
    },
    Switch { checked: bool },
    Button,
    ChartStyle { count: usize, selected: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub name: String,
    pub label: String,
    pub control: Control,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub fields: Vec<FieldView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormView {
    pub sections: Vec<Section>,
}

impl FormView {
    // 高级区块（TUN、操作按钮、嗅探开关）仅在核心为 Meta 时出现
    pub fn build(
        snapshot: &ConfigSnapshot,
        drafts: &dyn Fn(TextField) -> Option<String>,
        capabilities: Capabilities,
        preferences: &Preferences,
    ) -> Self {
        let mut sections = vec![general_section(snapshot, drafts, capabilities)];

        if capabilities.meta {
            sections.push(tun_section(snapshot, drafts));
            sections.push(actions_section());
        }

        sections.push(preferences_section(preferences, drafts));
        Self { sections }
    }

    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn field(&self, name: &str) -> Option<&FieldView> {
        self.sections
            .iter()
            .flat_map(|s| s.fields.iter())
            .find(|f| f.name == name)
    }
}

impl SettingsForm {
    pub fn view(&self) -> FormView {
        let drafts = |field: TextField| self.draft(field).map(str::to_string);
        FormView::build(
            self.local(),
            &drafts,
            self.capabilities(),
            &self.preferences().snapshot(),
        )
    }
}

fn general_section(
    snapshot: &ConfigSnapshot,
    drafts: &dyn Fn(TextField) -> Option<String>,
    capabilities: Capabilities,
) -> Section {
    // 只显示核心返回的端口
    let mut fields: Vec<FieldView> = PortField::ALL
        .into_iter()
        .filter_map(|field| {
            let port = snapshot.port(field)?;
            let value = drafts(TextField::Port(field)).unwrap_or_else(|| port.to_string());
            Some(text(field.key(), field.label(), value))
        })
        .collect();

    fields.push(select(
        "mode",
        "Mode",
        Mode::ALL.iter().map(|m| (m.as_str(), m.label())),
        Some(snapshot.mode.as_str()),
    ));
    fields.push(select(
        "log-level",
        "Log Level",
        LogLevel::ALL.iter().map(|l| (l.as_str(), l.label())),
        Some(snapshot.log_level.as_str()),
    ));
    fields.push(switch("allow-lan", "Allow LAN", snapshot.allow_lan));

    if capabilities.meta {
        fields.push(switch("sniffing", "Sniffing", snapshot.sniffing));
    }

    Section {
        kind: SectionKind::General,
        fields,
    }
}

fn tun_section(snapshot: &ConfigSnapshot, drafts: &dyn Fn(TextField) -> Option<String>) -> Section {
    let tun = snapshot.tun.clone().unwrap_or_default();
    let stack = tun.stack.as_ref().map(|s| s.as_str());

    let device = drafts(TextField::DeviceName)
        .or(tun.device)
        .unwrap_or_default();
    let interface = drafts(TextField::InterfaceName)
        .or_else(|| snapshot.interface_name.clone())
        .unwrap_or_default();

    Section {
        kind: SectionKind::Tun,
        fields: vec![
            switch("enable", "Enable", tun.enable),
            select(
                "stack",
                "Stack",
                TunStack::ALL.iter().map(|s| (s.as_str(), s.label())),
                stack,
            ),
            text(DEVICE_NAME_FIELD, "Device Name", device),
            text(INTERFACE_NAME_FIELD, "Interface Name", interface),
        ],
    }
}

fn actions_section() -> Section {
    Section {
        kind: SectionKind::Actions,
        fields: vec![
            button("reload", "Reload config file"),
            button("update-geo", "Update GEO Databases"),
            button("flush-fakeip", "Flush fake-ip pool"),
        ],
    }
}

fn preferences_section(
    preferences: &Preferences,
    drafts: &dyn Fn(TextField) -> Option<String>,
) -> Section {
    let latency_url = drafts(TextField::LatencyTestUrl)
        .unwrap_or_else(|| preferences.latency_test_url.clone());

    Section {
        kind: SectionKind::Preferences,
        fields: vec![
            text(LATENCY_TEST_URL_FIELD, "Latency Test URL", latency_url),
            select(
                "lang",
                "Language",
                Language::ALL.iter().map(|l| (l.code(), l.label())),
                Some(preferences.language.code()),
            ),
            FieldView {
                name: "chart-style".to_string(),
                label: "Chart Style".to_string(),
                control: Control::ChartStyle {
                    count: CHART_STYLE_COUNT,
                    selected: preferences.selected_chart_style_index,
                },
            },
            button("switch-backend", "Switch backend"),
        ],
    }
}

fn text(name: &str, label: &str, value: String) -> FieldView {
    FieldView {
        name: name.to_string(),
        label: label.to_string(),
        control: Control::Text { value },
    }
}

fn switch(name: &str, label: &str, checked: bool) -> FieldView {
    FieldView {
        name: name.to_string(),
        label: label.to_string(),
        control: Control::Switch { checked },
    }
}

fn button(name: &str, label: &str) -> FieldView {
    FieldView {
        name: name.to_string(),
        label: label.to_string(),
        control: Control::Button,
    }
}

fn select<'a>(
    name: &str,
    label: &str,
    options: impl Iterator<Item = (&'a str, &'a str)>,
    selected: Option<&str>,
) -> FieldView {
    let options: Vec<SelectOption> = options
        .map(|(value, label)| SelectOption {
            value: value.to_string(),
            label: label.to_string(),
        })
        .collect();
    let selected = selected
        .filter(|value| options.iter().any(|o| o.value == *value))
        .map(str::to_string);

    FieldView {
        name: name.to_string(),
        label: label.to_string(),
        control: Control::Select { options, selected },
    }
}

// 纯文本渲染（命令行 show 使用）
impl fmt::Display for FormView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, section) in self.sections.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.kind.title())?;

            for field in &section.fields {
                let value = match &field.control {
                    Control::Text { value } => value.clone(),
                    Control::Select { options, selected } => {
                        let choices: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
                        let current = selected.as_deref().unwrap_or("-");
                        format!("{}  ({})", current, choices.join(" | "))
                    }
                    Control::Switch { checked } => {
                        let state = if *checked { "on" } else { "off" };
                        state.to_string()
                    }
                    Control::Button => format!("<{}>", field.name),
                    Control::ChartStyle { count, selected } => {
                        format!("{} / {}", selected + 1, count)
                    }
                };
                writeln!(f, "  {:<18} {}", field.label, value)?;
            }
        }
        Ok(())
    }
}
