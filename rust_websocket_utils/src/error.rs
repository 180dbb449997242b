// rust_websocket_utils/src/error.rs

//! 定义 WebSocket 工具库相关的错误类型。

use thiserror::Error; // 引入 thiserror 来简化错误类型的定义

/// WebSocket 工具库的统一错误类型。
#[derive(Error, Debug)]
pub enum WsError {
    /// 当 serde 序列化失败时返回。
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 当入站文本无法解析为合法的帧信封时返回 (非 JSON、不是对象、缺少 event/action 等)。
    #[error("反序列化错误: {0}")]
    DeserializationError(String),

    /// WebSocket 协议相关的错误，例如握手失败、连接被重置。
    #[error("WebSocket协议错误: {0}")]
    WebSocketProtocolError(#[from] tokio_tungstenite::tungstenite::Error),

    /// 底层 I/O 错误 (例如 TCP 监听器绑定失败)。
    #[error("I/O错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 无效的 URL 格式。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 连接已关闭，无法继续发送。
    #[error("连接已关闭")]
    ConnectionClosed,

    /// 通用消息错误，用于其他未明确分类的错误。
    #[error("消息错误: {0}")]
    Message(String),
}

impl WsError {
    /// 该错误是否意味着底层连接已经不可用 (需要丢弃当前连接并在下次使用时重连)。
    pub fn is_connection_lost(&self) -> bool {
        use tokio_tungstenite::tungstenite::Error as TungsteniteError;
        match self {
            WsError::ConnectionClosed | WsError::IoError(_) => true,
            WsError::WebSocketProtocolError(e) => matches!(
                e,
                TungsteniteError::ConnectionClosed
                    | TungsteniteError::AlreadyClosed
                    | TungsteniteError::Io(_)
                    | TungsteniteError::Protocol(_)
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::Error as TungsteniteError;

    #[test]
    fn test_connection_lost_classification() {
        assert!(WsError::ConnectionClosed.is_connection_lost());
        assert!(WsError::from(TungsteniteError::AlreadyClosed).is_connection_lost());
        // 断言：帧格式错误只影响单个帧，不代表连接丢失
        assert!(!WsError::DeserializationError("bad".to_string()).is_connection_lost());
        assert!(!WsError::InvalidUrl("x".to_string()).is_connection_lost());
    }
}
