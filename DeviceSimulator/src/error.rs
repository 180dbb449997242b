// DeviceSimulator/src/error.rs

use rust_websocket_utils::error::WsError;
use thiserror::Error;

/// 模拟器的错误类型。
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("WebSocket 服务错误: {0}")]
    WebSocketService(#[from] WsError),

    #[error("配置错误: {0}")]
    ConfigError(String),
}
