// DeviceSimulator/src/device.rs

//! 模拟的设备状态。

use chrono::{Duration as ChronoDuration, Utc};
use common_models::ws_payloads::{LogFileEntry, SerialStatusDetails, SystemInitDetails, WifiNetwork};
use serde::Serialize;

use crate::config::SimulatorConfig;

/// 设备初始波特率。
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// 一台模拟设备的全部可变状态。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub firmware_version: String,
    pub wlan_enabled: bool,
    /// 当前连接的网络，`None` 表示未连接。
    pub connected_ssid: Option<String>,
    pub saved_networks: Vec<WifiNetwork>,
    /// 扫描时"可见"的网络。
    pub visible_networks: Vec<WifiNetwork>,
    pub file_logging: bool,
    pub log_files: Vec<LogFileEntry>,
    /// 串口上是否接有设备。
    pub serial_attached: bool,
    /// 串口是否已由面板打开 (设置过波特率且未断开)。
    pub serial_open: bool,
    pub baud_rate: u32,
}

fn network(ssid: &str, security: &str, rssi: i32, channel: u8) -> WifiNetwork {
    WifiNetwork {
        ssid: ssid.to_string(),
        security: security.to_string(),
        rssi,
        channel: channel.to_string(),
    }
}

impl DeviceState {
    pub fn from_config(config: &SimulatorConfig) -> Self {
        let now = Utc::now();
        let log_files = (0..3)
            .map(|day| LogFileEntry {
                name: format!("log_{}.txt", (now - ChronoDuration::days(day)).format("%Y%m%d")),
                size: 1024 * (day as u64 + 1),
                date: (now - ChronoDuration::days(day)).timestamp(),
            })
            .collect();
        let saved = network("Werkstatt", "WPA2", -48, 6);
        Self {
            firmware_version: config.firmware_version.clone(),
            wlan_enabled: config.wlan_enabled,
            connected_ssid: config.wlan_enabled.then(|| saved.ssid.clone()),
            saved_networks: vec![saved.clone()],
            visible_networks: vec![saved, network("Lager", "WPA2", -71, 11), network("Gast", "OPEN", -80, 1)],
            file_logging: false,
            log_files,
            serial_attached: config.serial_attached,
            serial_open: false,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// WLAN 状态描述：`disabled`、`connected` 或 `disconnected`。
    pub fn wlan_status(&self) -> &'static str {
        match (self.wlan_enabled, self.connected_ssid.is_some()) {
            (false, _) => "disabled",
            (true, true) => "connected",
            (true, false) => "disconnected",
        }
    }

    pub fn serial_status(&self) -> SerialStatusDetails {
        SerialStatusDetails {
            available: self.serial_attached,
            baud_rate: self.baud_rate,
        }
    }

    /// 客户端连接后推送的问候内容。
    pub fn init_details(&self) -> SystemInitDetails {
        SystemInitDetails {
            version: Some(self.firmware_version.clone()),
            serial: Some(self.serial_status()),
        }
    }

    pub fn is_visible(&self, ssid: &str) -> bool {
        self.visible_networks.iter().any(|n| n.ssid == ssid)
    }

    pub fn is_saved(&self, ssid: &str) -> bool {
        self.saved_networks.iter().any(|n| n.ssid == ssid)
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::from_config(&SimulatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wlan_status_strings() {
        let mut device = DeviceState::default();
        assert_eq!(device.wlan_status(), "connected");
        device.connected_ssid = None;
        assert_eq!(device.wlan_status(), "disconnected");
        device.wlan_enabled = false;
        assert_eq!(device.wlan_status(), "disabled");
    }

    #[test]
    fn test_init_details_carry_version_and_serial() {
        let device = DeviceState::default();
        let init = device.init_details();
        assert_eq!(init.version.as_deref(), Some("1.0.0-sim"));
        assert_eq!(init.serial, Some(SerialStatusDetails { available: true, baud_rate: DEFAULT_BAUD_RATE }));
        assert_eq!(device.log_files.len(), 3);
    }
}
