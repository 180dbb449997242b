// DevicePanel/src/ws_client/mod.rs

//! 面板与设备之间的 WebSocket 关联层。
//!
//! - `connection`: 连接管理器 `SocketService` (唯一连接、发送队列、入站分发)
//! - `registry`: 按 `(event, action)` 标签组织的监听器注册表
//! - `request`: 基于标签与请求标识的请求/应答助手

pub mod connection;
pub mod registry;
pub mod request;

pub use connection::{ConnectionState, OutboundFrame, SendOutcome, SocketService};
pub use registry::{ListenerGuard, ListenerId};
pub use request::{RequestSpec, Verdict};
