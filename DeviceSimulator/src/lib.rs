//! `device_simulator` 设备端模拟器库。
//!
//! 模拟设备固件的 WebSocket 后端：接受面板连接，解析规范格式与旧格式的指令，
//! 在约定的 `(event, action)` 标签上应答，并主动推送 `system/init`、`serial/status`
//! 与 `serial/incoming` 帧。既可作为独立程序运行，也可在测试中以 [`spawn`] 启动在随机端口上。
//!
//! 主要模块：
//! - `config`: 模拟器配置 (`simulator_settings.json` 与环境变量覆盖)。
//! - `device`: 模拟的设备状态 (WLAN、文件日志、固件版本、串口)。
//! - `router`: 指令到应答帧的路由。
//! - `session`: 单个客户端连接的会话循环。
//! - `server`: 监听与测试用的 [`SimulatorHandle`]。

pub mod config;
pub mod device;
pub mod error;
pub mod router;
pub mod server;
pub mod session;

pub use server::{spawn, SimulatorHandle};
