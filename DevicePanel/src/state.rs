// DevicePanel/src/state.rs

//! 面板共享状态。
//!
//! 功能助手在收到终结应答后把结果写入这里；命令行前端只读取它。
//! 状态以 `Arc<RwLock<SystemState>>` 的形式在各助手之间共享。

use std::sync::Arc;

use common_models::ws_payloads::{SerialStatusDetails, SystemInitDetails, WifiNetwork};
use serde::Serialize;
use tokio::sync::RwLock;

/// 固件版本未知时显示的值。
pub const UNKNOWN_VERSION: &str = "unknown";

/// WLAN 状态。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WlanState {
    pub enabled: bool,
    pub connected: bool,
    pub loading: bool,
    /// 最近一次通过面板发起连接的网络名称。
    pub connected_ssid: Option<String>,
    pub saved_networks: Vec<WifiNetwork>,
}

/// 文件日志状态。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoggingState {
    pub enabled: bool,
    pub loading: bool,
}

/// 固件版本。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionState {
    pub value: String,
    pub loading: bool,
}

impl Default for VersionState {
    fn default() -> Self {
        Self {
            value: UNKNOWN_VERSION.to_string(),
            loading: false,
        }
    }
}

/// 串口状态。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SerialState {
    /// 设备报告串口上有设备。
    pub available: bool,
    pub baud_rate: u32,
    /// 面板已确认设置了波特率，处于可收发状态。
    pub connected: bool,
    pub loading: bool,
}

impl SerialState {
    /// 写入设备报告的串口状态。
    pub fn apply_details(&mut self, details: SerialStatusDetails) {
        self.available = details.available;
        self.baud_rate = details.baud_rate;
        if !details.available {
            self.connected = false;
        }
    }
}

/// 面板所知的设备状态全集。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemState {
    pub wlan: WlanState,
    pub logging: LoggingState,
    pub version: VersionState,
    pub serial: SerialState,
}

impl SystemState {
    /// 合并设备连接后推送的 `system/init` 问候帧。
    pub fn apply_init(&mut self, init: &SystemInitDetails) {
        if let Some(version) = init.version.as_deref().filter(|v| !v.is_empty()) {
            self.version.value = version.to_string();
        }
        if let Some(serial) = init.serial {
            self.serial.apply_details(serial);
        }
    }
}

/// 在各助手之间共享的状态句柄。
pub type SharedSystemState = Arc<RwLock<SystemState>>;

/// 创建一份默认状态的共享句柄。
pub fn new_shared_state() -> SharedSystemState {
    Arc::new(RwLock::new(SystemState::default()))
}
