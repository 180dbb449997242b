//! 通用枚举模块。
//!
//! 本模块定义了设备协议中反复出现的两类枚举：
//! - `CommandKind`: 出站指令的 `type` 字段，决定设备端由哪个处理器 (system / log / serial) 处理。
//! - `ResponseStatus`: 入站应答中的 `status` 字段。设备固件在不同版本里使用过
//!   `"success"`、`"error"` 之外的多种状态字符串 (例如 `"list"`、`"scan"`、`"data"`)，
//!   因此这里保留一个 `Other` 分支承载未知值，而不是在反序列化时直接失败。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 出站指令的类别，对应 JSON 中的 `type` 字段。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// 系统类指令 (WLAN、固件版本等)。
    System,
    /// 日志类指令 (调试日志开关、日志文件列表)。
    Log,
    /// 串口类指令 (波特率、发送、断开)。
    Serial,
}

impl CommandKind {
    /// 返回协议中使用的小写字符串形式。
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::System => "system",
            CommandKind::Log => "log",
            CommandKind::Serial => "serial",
        }
    }

    /// 从协议字符串解析类别；未知字符串返回 `None`。
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(CommandKind::System),
            "log" => Some(CommandKind::Log),
            "serial" => Some(CommandKind::Serial),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 入站应答中的 `status` 字段。
///
/// 只有 `Error` 被视为明确的失败信号；`Success` 之外的其他已知状态
/// (`Data`、`List`、`Scan`) 是某些标签上的终结状态，由各功能的分类器自行解释。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum ResponseStatus {
    /// `"success"`
    Success,
    /// `"error"`
    Error,
    /// `"data"`: 串口推送的数据行。
    Data,
    /// `"list"`: 已保存网络列表。
    List,
    /// `"scan"`: 扫描结果。
    Scan,
    /// 其他任何状态字符串，原样保留。
    Other(String),
}

impl ResponseStatus {
    /// 从协议字符串解析状态。
    pub fn parse(value: &str) -> Self {
        match value {
            "success" => ResponseStatus::Success,
            "error" => ResponseStatus::Error,
            "data" => ResponseStatus::Data,
            "list" => ResponseStatus::List,
            "scan" => ResponseStatus::Scan,
            other => ResponseStatus::Other(other.to_string()),
        }
    }

    /// 返回协议中使用的字符串形式。
    pub fn as_str(&self) -> &str {
        match self {
            ResponseStatus::Success => "success",
            ResponseStatus::Error => "error",
            ResponseStatus::Data => "data",
            ResponseStatus::List => "list",
            ResponseStatus::Scan => "scan",
            ResponseStatus::Other(other) => other.as_str(),
        }
    }

    /// 是否为明确的失败信号。
    pub fn is_failure(&self) -> bool {
        matches!(self, ResponseStatus::Error)
    }
}

impl From<String> for ResponseStatus {
    fn from(value: String) -> Self {
        ResponseStatus::parse(&value)
    }
}

impl From<ResponseStatus> for String {
    fn from(value: ResponseStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
