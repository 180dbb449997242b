//! `rust_websocket_utils` 是一个提供 WebSocket 通信实用功能的 Rust Crate。
//! 它封装了 `tokio-tungstenite` 的连接、文本帧收发细节，并定义了设备协议的入站帧信封。
//!
//! 主要模块包括：
//! - `message`: 入站帧信封 `InboundFrame`、路由标签 `Tag` 与负载 `Payload`。
//! - `error`: 库中使用的统一错误类型 `WsError`。
//! - `server`: WebSocket 服务器端传输层 (供设备模拟器与测试使用)。
//! - `client`: WebSocket 客户端传输层。

pub mod client;
pub mod error;
pub mod message;
pub mod server;
