// rust_websocket_utils/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! `transport` 子模块负责连接建立与文本帧收发，连接生命周期 (状态机、重连、发送队列)
//! 由使用本库的上层服务自行管理。

pub mod transport;
