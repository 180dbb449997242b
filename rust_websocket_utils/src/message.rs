// rust_websocket_utils/src/message.rs

//! 定义设备协议的入站帧信封。
//!
//! 设备发往面板的每一帧都是一个 JSON 对象，其中 `event` 与 `action` 两个字段共同组成路由标签 [`Tag`]，
//! 其余字段 (`status`、`details`、`error`、`id` 以及任何附加字段) 构成交给监听器的 [`Payload`]。
//! [`InboundFrame::parse`] 负责拆分信封；[`InboundFrame::to_json`] 则用于设备模拟器与测试重新组装帧。

use std::fmt;

use common_models::enums::ResponseStatus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WsError;

/// 入站帧信封中的标签字段名。
const EVENT_KEY: &str = "event";
const ACTION_KEY: &str = "action";

/// `(event, action)` 路由标签。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub event: String,
    pub action: String,
}

impl Tag {
    pub fn new(event: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            action: action.into(),
        }
    }
}

impl From<(&str, &str)> for Tag {
    fn from((event, action): (&str, &str)) -> Self {
        Tag::new(event, action)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event, self.action)
    }
}

/// 去掉 `event`/`action` 之后的帧负载。
///
/// 负载保持为原始 JSON 对象，因为同一标签在不同固件版本中携带的 `details` 形状并不固定
/// (字符串、布尔值、对象、数组都出现过)，解释工作交给各功能的分类器。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new(map: Map<String, Value>) -> Self {
        Payload(map)
    }

    /// 读取任意字段。
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// 写入字段 (用于构造应答帧)。
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// 解析后的 `status`；字段缺失或不是字符串时为 `None`。
    pub fn status(&self) -> Option<ResponseStatus> {
        self.0.get("status").and_then(Value::as_str).map(ResponseStatus::parse)
    }

    /// `status` 是否为 `success`。
    pub fn is_success(&self) -> bool {
        self.status() == Some(ResponseStatus::Success)
    }

    /// 原始 `details` 值。
    pub fn details(&self) -> Option<&Value> {
        self.0.get("details")
    }

    /// `details` 为字符串时返回该字符串。
    pub fn details_str(&self) -> Option<&str> {
        self.details().and_then(Value::as_str)
    }

    /// 将 `details` 反序列化为指定类型。
    pub fn details_as<T: DeserializeOwned>(&self) -> Result<T, WsError> {
        let details = self
            .details()
            .ok_or_else(|| WsError::DeserializationError("负载中缺少 details 字段".to_string()))?;
        serde_json::from_value(details.clone())
            .map_err(|e| WsError::DeserializationError(format!("details 字段结构不符: {}", e)))
    }

    /// 设备给出的错误说明：优先取 `error` 字段，其次取字符串形式的 `details`。
    pub fn error_text(&self) -> Option<&str> {
        self.0
            .get("error")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| self.details_str())
    }

    /// 请求关联标识 (`id`)，旧固件不会回传该字段。
    pub fn request_id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }
}

/// 一个已拆分的入站帧。
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub tag: Tag,
    pub payload: Payload,
}

impl InboundFrame {
    pub fn new(tag: impl Into<Tag>, payload: Payload) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    /// 构造一个带 `status` 与 `details` 的应答帧。
    pub fn response(tag: impl Into<Tag>, status: ResponseStatus, details: impl Into<Value>) -> Self {
        let mut payload = Payload::default();
        payload.insert("status", status.as_str());
        payload.insert("details", details);
        Self::new(tag, payload)
    }

    /// 附加错误说明 (同时把 `status` 置为 `error`)。
    pub fn with_error(mut self, reason: impl Into<String>) -> Self {
        self.payload.insert("status", ResponseStatus::Error.as_str());
        self.payload.insert("error", reason.into());
        self
    }

    /// 回传请求关联标识；`None` 时不写入该字段。
    pub fn with_request_id(mut self, id: Option<&str>) -> Self {
        if let Some(id) = id {
            self.payload.insert("id", id);
        }
        self
    }

    /// 解析一条文本帧并拆分出标签。
    ///
    /// 以下情况视为格式错误：不是合法 JSON、顶层不是对象、`event` 或 `action` 缺失或不是字符串。
    pub fn parse(text: &str) -> Result<Self, WsError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| WsError::DeserializationError(format!("帧不是合法的 JSON: {}", e)))?;
        let Value::Object(mut map) = value else {
            return Err(WsError::DeserializationError("帧的顶层不是 JSON 对象".to_string()));
        };
        let event = take_string(&mut map, EVENT_KEY)?;
        let action = take_string(&mut map, ACTION_KEY)?;
        Ok(Self {
            tag: Tag { event, action },
            payload: Payload(map),
        })
    }

    /// 重新组装为线上格式的 JSON 文本。
    pub fn to_json(&self) -> Result<String, WsError> {
        let mut map = Map::with_capacity(self.payload.0.len() + 2);
        map.insert(EVENT_KEY.to_string(), Value::String(self.tag.event.clone()));
        map.insert(ACTION_KEY.to_string(), Value::String(self.tag.action.clone()));
        for (key, value) in &self.payload.0 {
            map.insert(key.clone(), value.clone());
        }
        serde_json::to_string(&Value::Object(map))
            .map_err(|e| WsError::SerializationError(format!("帧序列化失败: {}", e)))
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Result<String, WsError> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(WsError::DeserializationError(format!(
            "字段 '{}' 应为字符串，实际为: {}",
            key, other
        ))),
        None => Err(WsError::DeserializationError(format!("帧中缺少 '{}' 字段", key))),
    }
}
