// Clash 运行配置快照
//
// GET /configs 返回的配置对象，以及 PATCH /configs 使用的局部更新

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

// 核心上报的取值：已知枚举或原样保留的字符串
// 不同核心（Clash、Meta、sing-box）的取值并不统一，未知值不应导致整个快照解析失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reported<T> {
    Known(T),
    Other(String),
}

impl<T: Default> Default for Reported<T> {
    fn default() -> Self {
        Reported::Known(T::default())
    }
}

impl<T> From<T> for Reported<T> {
    fn from(value: T) -> Self {
        Reported::Known(value)
    }
}

impl<T: Copy> Reported<T> {
    pub fn known(&self) -> Option<T> {
        match self {
            Reported::Known(value) => Some(*value),
            Reported::Other(_) => None,
        }
    }
}

impl<T: WireEnum> Reported<T> {
    pub fn as_str(&self) -> &str {
        match self {
            Reported::Known(value) => value.as_str(),
            Reported::Other(raw) => raw,
        }
    }
}

impl<T: WireEnum> fmt::Display for Reported<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T: WireEnum> Serialize for Reported<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, T: WireEnum> Deserialize<'de> for Reported<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.parse::<T>() {
            Ok(value) => Reported::Known(value),
            Err(_) => {
                log::debug!("核心上报了未知取值：{}", raw);
                Reported::Other(raw)
            }
        })
    }
}

pub trait WireEnum: Copy + FromStr {
    fn as_str(&self) -> &'static str;
}

// 为字符串枚举生成 as_str / FromStr / Display / serde 实现
// 解析时忽略大小写（核心可能返回 "Rule"、"gVisor"、"LWIP"），并接受别名
macro_rules! impl_wire_enum {
    ($name:ident {
        $($variant:ident => ($wire:literal, $label:literal $(, $alias:literal)*)),+ $(,)?
    }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            // 界面显示名称
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl WireEnum for $name {
            fn as_str(&self) -> &'static str {
                $name::as_str(self)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($wire $(| $alias)* => Ok($name::$variant),)+
                    other => Err(format!("无效的 {} 取值：{}", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// 出站模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Direct,
    #[default]
    Rule,
    Script,
    Global,
}

impl_wire_enum!(Mode {
    Direct => ("direct", "Direct"),
    Rule => ("rule", "Rule"),
    Script => ("script", "Script"),
    Global => ("global", "Global"),
});

// 核心日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Silent,
}

impl_wire_enum!(LogLevel {
    // sing-box 使用 trace / warn
    Debug => ("debug", "Debug", "trace"),
    Info => ("info", "Info"),
    Warning => ("warning", "Warning", "warn"),
    Error => ("error", "Error"),
    Silent => ("silent", "Silent"),
});

// TUN 网络栈
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunStack {
    #[default]
    Gvisor,
    System,
    Lwip,
    Mixed,
}

impl_wire_enum!(TunStack {
    Gvisor => ("gvisor", "gVisor"),
    System => ("system", "System"),
    Lwip => ("lwip", "LWIP"),
    Mixed => ("mixed", "Mixed"),
});

// 端口字段（按界面显示顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortField {
    Port,
    SocksPort,
    MixedPort,
    RedirPort,
    MitmPort,
}

impl PortField {
    pub const ALL: [PortField; 5] = [
        PortField::Port,
        PortField::SocksPort,
        PortField::MixedPort,
        PortField::RedirPort,
        PortField::MitmPort,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            PortField::Port => "port",
            PortField::SocksPort => "socks-port",
            PortField::MixedPort => "mixed-port",
            PortField::RedirPort => "redir-port",
            PortField::MitmPort => "mitm-port",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PortField::Port => "Http Port",
            PortField::SocksPort => "Socks5 Port",
            PortField::MixedPort => "Mixed Port",
            PortField::RedirPort => "Redir Port",
            PortField::MitmPort => "MITM Port",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

// TUN 配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TunConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Reported<TunStack>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    // 其余字段原样保留（auto-route、dns-hijack 等）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// 核心配置快照
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socks_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixed_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redir_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitm_port: Option<u16>,

    #[serde(default)]
    pub mode: Reported<Mode>,
    #[serde(default)]
    pub log_level: Reported<LogLevel>,
    #[serde(default)]
    pub allow_lan: bool,
    #[serde(default)]
    pub sniffing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tun: Option<TunConfig>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigSnapshot {
    pub fn port(&self, field: PortField) -> Option<u16> {
        match field {
            PortField::Port => self.port,
            PortField::SocksPort => self.socks_port,
            PortField::MixedPort => self.mixed_port,
            PortField::RedirPort => self.redir_port,
            PortField::MitmPort => self.mitm_port,
        }
    }

    pub fn set_port(&mut self, field: PortField, value: u16) {
        let slot = match field {
            PortField::Port => &mut self.port,
            PortField::SocksPort => &mut self.socks_port,
            PortField::MixedPort => &mut self.mixed_port,
            PortField::RedirPort => &mut self.redir_port,
            PortField::MitmPort => &mut self.mitm_port,
        };
        *slot = Some(value);
    }

    // 缺失时创建默认的 TUN 配置
    pub fn tun_mut(&mut self) -> &mut TunConfig {
        self.tun.get_or_insert_with(TunConfig::default)
    }
}

// 局部更新：仅包含变更字段，由核心侧合并
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ConfigPatch(Map<String, Value>);

impl ConfigPatch {
    pub fn field(key: &str, value: impl Into<Value>) -> Self {
        let mut map = Map::new();
        map.insert(key.to_string(), value.into());
        Self(map)
    }

    // TUN 字段嵌套在 tun 对象下：{"tun": {"enable": true}}
    pub fn tun(key: &str, value: impl Into<Value>) -> Self {
        Self::field("tun", Self::field(key, value).into_value())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl fmt::Display for ConfigPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_core_snapshot() {
        let body = json!({
            "port": 7890,
            "socks-port": 7891,
            "mixed-port": 0,
            "redir-port": 0,
            "mode": "Rule",
            "log-level": "warning",
            "allow-lan": true,
            "sniffing": false,
            "interface-name": "",
            "ipv6": false,
            "tun": {
                "enable": true,
                "stack": "gVisor",
                "device": "utun9",
                "dns-hijack": ["any:53"]
            }
        });

        let snapshot: ConfigSnapshot = serde_json::from_value(body).unwrap();
        assert_eq!(snapshot.port, Some(7890));
        assert_eq!(snapshot.mitm_port, None);
        assert_eq!(snapshot.mode, Reported::Known(Mode::Rule));
        assert_eq!(snapshot.log_level.known(), Some(LogLevel::Warning));
        assert!(snapshot.allow_lan);

        let tun = snapshot.tun.as_ref().unwrap();
        assert_eq!(tun.stack, Some(Reported::Known(TunStack::Gvisor)));
        assert_eq!(tun.device.as_deref(), Some("utun9"));
        assert!(tun.extra.contains_key("dns-hijack"));
        assert_eq!(snapshot.extra.get("ipv6"), Some(&json!(false)));
    }

    #[test]
    fn test_parse_sing_box_snapshot() {
        let body = json!({
            "port": 7890,
            "mode": "Rule",
            "log-level": "warn",
        });
        let snapshot: ConfigSnapshot = serde_json::from_value(body).unwrap();
        assert_eq!(snapshot.mode.known(), Some(Mode::Rule));
        assert_eq!(snapshot.log_level.known(), Some(LogLevel::Warning));

        let trace: ConfigSnapshot =
            serde_json::from_value(json!({ "log-level": "trace" })).unwrap();
        assert_eq!(trace.log_level.known(), Some(LogLevel::Debug));
    }

    #[test]
    fn test_unknown_values_are_kept() {
        let body = json!({
            "mode": "Enhanced",
            "log-level": "panic",
            "tun": { "enable": true, "stack": "future" }
        });
        let snapshot: ConfigSnapshot = serde_json::from_value(body).unwrap();

        assert_eq!(snapshot.mode, Reported::Other("Enhanced".to_string()));
        assert_eq!(snapshot.mode.known(), None);
        assert_eq!(snapshot.log_level.as_str(), "panic");
        assert_eq!(
            snapshot.tun.as_ref().and_then(|t| t.stack.clone()),
            Some(Reported::Other("future".to_string()))
        );

        // 原样写回
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["mode"], json!("Enhanced"));
        assert_eq!(value["tun"]["stack"], json!("future"));
    }

    #[test]
    fn test_enum_parse_case_insensitive() {
        assert_eq!("LWIP".parse::<TunStack>(), Ok(TunStack::Lwip));
        assert_eq!("Global".parse::<Mode>(), Ok(Mode::Global));
        assert_eq!(LogLevel::Silent.to_string(), "silent");
        assert_eq!(TunStack::Gvisor.label(), "gVisor");
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert!("enhanced".parse::<Mode>().is_err());
    }

    #[test]
    fn test_patch_shapes() {
        let patch = ConfigPatch::field("port", 8080);
        assert_eq!(patch.into_value(), json!({ "port": 8080 }));

        let patch = ConfigPatch::tun("stack", TunStack::System.as_str());
        assert_eq!(patch.keys().collect::<Vec<_>>(), vec!["tun"]);
        assert_eq!(patch.into_value(), json!({ "tun": { "stack": "system" } }));
    }

    #[test]
    fn test_port_field_keys() {
        assert_eq!(PortField::from_key("mitm-port"), Some(PortField::MitmPort));
        assert_eq!(PortField::from_key("tproxy-port"), None);

        let mut snapshot = ConfigSnapshot::default();
        snapshot.set_port(PortField::SocksPort, 1080);
        assert_eq!(snapshot.port(PortField::SocksPort), Some(1080));
    }
}
