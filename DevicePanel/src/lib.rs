//! `device_panel` 设备控制面板客户端库。
//!
//! 本 crate 通过一条 WebSocket 连接与设备 (或 `device_simulator`) 通信，
//! 把"发送指令，再等待带有特定 `(event, action)` 标签的应答"包装为带超时的异步请求。
//!
//! 主要模块：
//! - `ws_client`: 连接管理 (`SocketService`)、监听器注册表与请求关联。
//! - `services`: WLAN、文件日志、固件版本、串口与整体状态刷新等功能助手。
//! - `state`: 功能助手写入的共享设备状态。
//! - `reachability`: 网络可达性判断。
//! - `config`: `app_settings.json` 配置加载与环境变量覆盖。
//! - `error`: 面板错误类型 `PanelError`。

pub mod config;
pub mod error;
pub mod reachability;
pub mod services;
pub mod state;
pub mod ws_client;
