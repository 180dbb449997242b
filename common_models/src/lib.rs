//! `common_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了控制面板客户端 (`device_panel`) 与设备端后端
//! (真实固件或 `device_simulator` 模拟器) 之间通过 WebSocket 交换的共享数据结构。
//!
//! 主要包含以下类型的模型：
//! - **WebSocket 消息负载 (`ws_payloads`)**: 标签常量 (`event`/`action`)、
//!   出站指令结构 (`DeviceCommand` 以及旧版的 `LegacyCommand`)、
//!   WLAN 网络、串口状态、日志文件等 `details` 负载结构体。
//! - **通用枚举 (`enums`)**: 指令类别 (`CommandKind`) 与应答状态 (`ResponseStatus`)。
//!
//! 设计原则：
//! - **共享性**: 客户端与模拟器使用同一份模型，保证两端对协议的理解一致。
//! - **序列化/反序列化**: 所有模型都派生 `serde::Serialize` / `serde::Deserialize`，
//!   字段命名与设备固件的 JSON 字段保持一致 (例如 `baudRate`)。

pub mod enums; // 协议中使用的枚举类型
pub mod ws_payloads; // WebSocket 通信中使用的各种消息负载结构体
