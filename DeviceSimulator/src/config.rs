// DeviceSimulator/src/config.rs

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SimulatorError;

/// 模拟器的默认监听地址
pub const DEFAULT_WS_HOST: &str = "0.0.0.0";
/// 模拟器的默认端口号
pub const DEFAULT_WS_PORT: u16 = 8088;
/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "simulator_settings.json";
/// 覆盖端口号的环境变量
pub const ENV_PORT: &str = "DEVICE_SIM_PORT";

/// 模拟器配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// 监听的主机地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听的端口号
    #[serde(default = "default_port")]
    pub port: u16,
    /// 模拟的固件版本
    #[serde(default = "default_version")]
    pub firmware_version: String,
    /// 串口上是否接有设备
    #[serde(default = "default_true")]
    pub serial_attached: bool,
    /// 启动时 WLAN 是否开启
    #[serde(default = "default_true")]
    pub wlan_enabled: bool,
}

fn default_host() -> String {
    DEFAULT_WS_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_WS_PORT
}

fn default_version() -> String {
    "1.0.0-sim".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            firmware_version: default_version(),
            serial_attached: true,
            wlan_enabled: true,
        }
    }
}

impl SimulatorConfig {
    /// 监听地址 `host:port`。
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 使用给定的查找函数应用环境变量覆盖 (生产环境中传入 `std::env::var`)。
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), SimulatorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| SimulatorError::ConfigError(format!("{} 的值 '{}' 不是合法端口: {}", ENV_PORT, port, e)))?;
            info!("[配置模块] 环境变量 {} 覆盖端口号: {}", ENV_PORT, self.port);
        }
        Ok(())
    }
}

/// 加载或创建配置文件。
///
/// 文件不存在或内容损坏时使用默认配置，并尝试把默认配置写回该路径。
pub fn load_or_create_config(config_file_path: &Path) -> SimulatorConfig {
    match fs::read_to_string(config_file_path) {
        Ok(content) => match serde_json::from_str::<SimulatorConfig>(&content) {
            Ok(config) => {
                info!("[配置模块] 已成功从配置文件 {:?} 加载模拟器配置。", config_file_path);
                config
            }
            Err(e) => {
                warn!(
                    "[配置模块] 警告：从 {:?} 反序列化配置失败: {}. 文件可能已损坏。将使用默认配置并尝试覆盖。",
                    config_file_path, e
                );
                let default_config = SimulatorConfig::default();
                save_config(&default_config, config_file_path);
                default_config
            }
        },
        Err(e) => {
            info!(
                "[配置模块] 未在 {:?} 找到配置文件或读取时发生错误 (错误: {}). 将使用默认配置并尝试创建新文件。",
                config_file_path, e
            );
            let default_config = SimulatorConfig::default();
            save_config(&default_config, config_file_path);
            default_config
        }
    }
}

/// 默认配置文件路径 (当前目录下的 `simulator_settings.json`)。
pub fn default_config_path() -> PathBuf {
    PathBuf::from(".").join(CONFIG_FILE_NAME)
}

/// 保存配置到文件，失败只记录警告。
pub fn save_config(config: &SimulatorConfig, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("[配置模块] 错误：创建配置目录 {:?} 失败: {}", parent, e);
                return;
            }
        }
    }

    match serde_json::to_string_pretty(config) {
        Ok(content) => {
            if let Err(e) = fs::write(path, content) {
                warn!("[配置模块] 错误：将配置写入文件 {:?} 时失败: {}", path, e);
            } else {
                info!("[配置模块] 已成功将当前配置保存到 {:?}.", path);
            }
        }
        Err(e) => warn!("[配置模块] 错误：序列化配置信息以便保存时失败: {}", e),
    }
}
