// common_models/src/ws_payloads.rs

//! 包含 WebSocket 通信中使用的标签常量、出站指令结构以及各类 `details` 负载结构体。
//!
//! 协议概要：
//! - 入站帧 (设备 → 面板): `{ "event": .., "action": .., "status": .., "details": .., "error": .., "id": .. }`，
//!   由 `(event, action)` 两级标签路由。
//! - 出站帧 (面板 → 设备): 规范格式为 `{ "type": .., "command": .., "key": .., "value": .., "id": .. }`。
//!   早期固件使用的 `{ "command": .., "setting": .., "value": .. }` 格式以 `LegacyCommand` 保留，仅用于兼容。

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::CommandKind;

// --- 事件与动作名称 ---

/// 事件名：系统类。
pub const EVENT_SYSTEM: &str = "system";
/// 事件名：日志类。
pub const EVENT_LOG: &str = "log";
/// 事件名：串口类。
pub const EVENT_SERIAL: &str = "serial";

/// `system/wifi`: WLAN 状态、开关、网络列表、扫描、连接。
pub const TAG_SYSTEM_WIFI: (&str, &str) = (EVENT_SYSTEM, "wifi");
/// `system/version`: 固件版本。
pub const TAG_SYSTEM_VERSION: (&str, &str) = (EVENT_SYSTEM, "version");
/// `system/init`: 设备在客户端连接后主动推送的问候帧。
pub const TAG_SYSTEM_INIT: (&str, &str) = (EVENT_SYSTEM, "init");
/// `log/debug`: 调试 (文件) 日志开关。
pub const TAG_LOG_DEBUG: (&str, &str) = (EVENT_LOG, "debug");
/// `log/list`: 设备上的日志文件列表。
pub const TAG_LOG_LIST: (&str, &str) = (EVENT_LOG, "list");
/// `serial/status`: 串口可用性与波特率 (推送或应答)。
pub const TAG_SERIAL_STATUS: (&str, &str) = (EVENT_SERIAL, "status");
/// `serial/setBaud`: 设备拒绝波特率设置时的应答 (成功时以 `serial/status` 确认)。
pub const TAG_SERIAL_SET_BAUD: (&str, &str) = (EVENT_SERIAL, "setBaud");
/// `serial/incoming`: 串口收到的数据 (推送)。
pub const TAG_SERIAL_INCOMING: (&str, &str) = (EVENT_SERIAL, "incoming");
/// `serial/send`: 向串口写入数据的应答。
pub const TAG_SERIAL_SEND: (&str, &str) = (EVENT_SERIAL, "send");
/// `serial/disconnect`: 关闭串口的应答。
pub const TAG_SERIAL_DISCONNECT: (&str, &str) = (EVENT_SERIAL, "disconnect");

/// 设备端允许的串口波特率。
pub const SUPPORTED_BAUD_RATES: [u32; 10] = [
    1200, 2400, 4800, 9600, 19200, 38400, 57600, 74880, 115200, 230400,
];

/// 规范格式的出站指令。
///
/// 序列化结果形如 `{"type":"system","command":"wifi","key":"status"}`。
/// `id` 是关联请求与应答的唯一标识；不支持该字段的旧固件会忽略它，
/// 此时客户端退回到仅按标签匹配。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceCommand {
    /// 指令类别，JSON 字段名为 `type`。
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// 指令名，同时也是设备应答帧中的 `action`。
    pub command: String,
    /// 子操作 (例如 `status`、`scan`、`activate`)。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// 可选参数。固件历来以字符串读取该字段，结构化参数需先编码为 JSON 字符串。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// 请求关联标识。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl DeviceCommand {
    /// 创建一个不带 `key`/`value` 的指令。
    pub fn new(kind: CommandKind, command: impl Into<String>) -> Self {
        Self {
            kind,
            command: command.into(),
            key: None,
            value: None,
            id: None,
        }
    }

    /// 设置 `key`。
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// 设置 `value`。
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// 设置请求关联标识。
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// 设备应答该指令时使用的标签 `(type, command)`。
    pub fn response_tag(&self) -> (&'static str, &str) {
        (self.kind.as_str(), self.command.as_str())
    }

    /// `value` 的字符串形式：字符串原样返回，其他 JSON 值返回其序列化文本。
    pub fn value_as_string(&self) -> Option<String> {
        self.value.as_ref().map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// 解析任意一种出站格式 (规范格式或旧格式) 的文本，统一转换为规范格式。
    ///
    /// 旧格式 `{command, setting, value}` 映射为 `type = command`、`command = setting`。
    /// 无法识别的文本返回 `None`。
    pub fn parse_any(text: &str) -> Option<DeviceCommand> {
        let raw: Value = serde_json::from_str(text).ok()?;
        if raw.get("type").is_some() {
            return serde_json::from_value(raw).ok();
        }
        let legacy: LegacyCommand = serde_json::from_value(raw).ok()?;
        legacy.into_canonical()
    }
}

/// 旧版出站指令格式。
///
/// 早期的面板代码以 `{ "command": "serial", "setting": "set", "value": "9600" }` 形式发送指令。
/// 新代码应使用 [`DeviceCommand`]；此结构仅为兼容仍在使用旧格式的固件而保留。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LegacyCommand {
    /// 类别 (等价于规范格式的 `type`)。
    pub command: String,
    /// 操作 (等价于规范格式的 `command`)。
    pub setting: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl LegacyCommand {
    /// 转换为规范格式；类别无法识别时返回 `None`。
    pub fn into_canonical(self) -> Option<DeviceCommand> {
        let kind = CommandKind::parse(&self.command)?;
        Some(DeviceCommand {
            kind,
            command: self.setting,
            key: None,
            value: self.value,
            id: None,
        })
    }
}

/// 一个 WLAN 网络条目 (已保存网络或扫描结果)。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WifiNetwork {
    pub ssid: String,
    #[serde(default)]
    pub security: String,
    #[serde(default)]
    pub rssi: i32,
    #[serde(default, deserialize_with = "string_or_number")]
    pub channel: String,
}

/// 连接 WLAN 时提交的凭据，编码为 JSON 字符串后放入指令的 `value`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// `serial/status` 帧的 `details`。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialStatusDetails {
    /// 串口上是否检测到设备。
    pub available: bool,
    /// 当前波特率，字段名与固件保持一致。
    #[serde(rename = "baudRate")]
    pub baud_rate: u32,
}

/// `log/debug` 帧在新固件中的结构化 `details`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoggingDetails {
    /// 文件日志是否开启。固件发送布尔值，早期版本发送 `"true"`/`"false"` 字符串，两者都接受。
    #[serde(deserialize_with = "bool_or_string")]
    pub activate: bool,
    /// 人类可读的说明。
    #[serde(default)]
    pub detail: String,
}

/// `log/list` 帧中的单个日志文件。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LogFileEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// 最后写入时间 (Unix 秒)。
    #[serde(default)]
    pub date: i64,
}

/// `system/init` 问候帧的 `details`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemInitDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<SerialStatusDetails>,
}

fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.as_str() {
            "true" | "on" => Ok(true),
            "false" | "off" => Ok(false),
            other => Err(de::Error::custom(format!("无法解释为布尔值: '{}'", other))),
        },
        other => Err(de::Error::custom(format!("期望布尔值或字符串，实际为: {}", other))),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("期望字符串或数字，实际为: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 测试规范指令的序列化只包含已设置的字段。
    fn test_device_command_serialization_skips_empty_fields() {
        let command = DeviceCommand::new(CommandKind::System, "wifi").with_key("status");
        let json = serde_json::to_value(&command).expect("序列化 DeviceCommand 失败");
        assert_eq!(json, serde_json::json!({"type": "system", "command": "wifi", "key": "status"}));
        // 断言：应答标签由 type 与 command 组成
        assert_eq!(command.response_tag(), ("system", "wifi"));
    }

    #[test]
    /// 测试旧格式指令会被映射为规范格式。
    fn test_parse_any_maps_legacy_schema() {
        let parsed = DeviceCommand::parse_any(r#"{"command":"serial","setting":"set","value":"9600"}"#)
            .expect("旧格式指令应能被解析");
        assert_eq!(parsed.kind, CommandKind::Serial);
        assert_eq!(parsed.command, "set");
        assert_eq!(parsed.value_as_string().as_deref(), Some("9600"));

        let canonical = DeviceCommand::parse_any(r#"{"type":"log","command":"debug","key":"activate","id":"r-1"}"#)
            .expect("规范格式指令应能被解析");
        assert_eq!(canonical.key.as_deref(), Some("activate"));
        assert_eq!(canonical.id.as_deref(), Some("r-1"));

        // 断言：无法识别的类别与非 JSON 文本都返回 None
        assert!(DeviceCommand::parse_any(r#"{"command":"gpio","setting":"on"}"#).is_none());
        assert!(DeviceCommand::parse_any("not json").is_none());
    }

    #[test]
    /// 测试日志详情同时接受布尔值与字符串形式的 activate。
    fn test_logging_details_accepts_bool_and_string() {
        let from_bool: LoggingDetails =
            serde_json::from_value(serde_json::json!({"activate": true, "detail": "File-Logging aktiviert"})).unwrap();
        assert!(from_bool.activate);
        let from_string: LoggingDetails = serde_json::from_value(serde_json::json!({"activate": "false"})).unwrap();
        assert!(!from_string.activate);
        assert!(serde_json::from_value::<LoggingDetails>(serde_json::json!({"activate": "maybe"})).is_err());
    }

    #[test]
    /// 测试串口状态使用固件的 baudRate 字段名，WLAN 条目容忍数字形式的信道。
    fn test_device_detail_field_names() {
        let status: SerialStatusDetails =
            serde_json::from_str(r#"{"available":true,"baudRate":115200}"#).unwrap();
        assert_eq!(status, SerialStatusDetails { available: true, baud_rate: 115200 });

        let network: WifiNetwork = serde_json::from_str(r#"{"ssid":"lab","rssi":-61,"channel":6}"#).unwrap();
        assert_eq!(network.channel, "6");
        assert_eq!(network.security, "");
    }
}
