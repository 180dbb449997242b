// DevicePanel/src/error.rs

//! 面板客户端的统一错误类型。

use std::time::Duration;

use rust_websocket_utils::error::WsError;
use rust_websocket_utils::message::Tag;
use thiserror::Error;

/// 面板客户端各层 (连接管理、请求助手、功能助手、配置) 返回的错误。
#[derive(Error, Debug)]
pub enum PanelError {
    /// 建立 WebSocket 连接失败 (URL 非法、握手失败、对端不可达)。
    #[error("建立 WebSocket 连接失败: {0}")]
    Connect(#[source] WsError),

    /// 出站帧写入失败后连接已被丢弃。
    #[error("发送帧失败: {0}")]
    Send(#[source] WsError),

    /// 在超时窗口内没有收到终结应答。
    #[error("等待 {tag} 的应答超时 (超过 {after:?})")]
    Timeout { tag: Tag, after: Duration },

    /// 设备以明确的失败状态拒绝了请求。
    #[error("设备拒绝了 {tag} 请求: {reason}")]
    DeviceRejected { tag: Tag, reason: String },

    /// 出站负载序列化失败。
    #[error("序列化出站帧失败: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 请求在收到应答之前被取消 (监听器被外部移除)。
    #[error("{0} 的应答通道在完成前被关闭")]
    ChannelClosed(Tag),

    /// 调用参数不合法 (例如不受支持的波特率)。
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    /// 配置文件读写或校验失败。
    #[error("配置错误: {0}")]
    Config(String),
}

impl PanelError {
    /// 是否为超时错误。
    pub fn is_timeout(&self) -> bool {
        matches!(self, PanelError::Timeout { .. })
    }
}
