// DevicePanel/src/config.rs

//! 面板客户端配置模块。
//!
//! 配置以 JSON 格式保存在 `app_settings.json` 中 (默认位于 `./config/`)。
//! 文件不存在时以默认值创建；内容损坏时记录错误并退回默认配置。
//! 加载后再应用环境变量覆盖：
//! - `DEVICE_PANEL_WS_URL`: 设备 WebSocket 地址
//! - `DEVICE_PANEL_LOG_LEVEL`: 日志级别
//!
//! 最终的 `ws_url` 会经过 `url` crate 校验，只接受 `ws://` 与 `wss://`。

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::PanelError;

/// 配置文件名。
pub const CONFIG_FILE_NAME: &str = "app_settings.json";
/// 覆盖设备地址的环境变量。
pub const ENV_WS_URL: &str = "DEVICE_PANEL_WS_URL";
/// 覆盖日志级别的环境变量。
pub const ENV_LOG_LEVEL: &str = "DEVICE_PANEL_LOG_LEVEL";

/// 未配置时使用的本地设备地址。
pub const DEFAULT_WS_URL: &str = "ws://localhost:80";

/// 各类请求的超时窗口 (毫秒)。
///
/// 按操作类别划分：
/// - `status_ms`: 状态查询 (WLAN 状态、日志状态、固件版本、串口状态)
/// - `network_ms`: 设备端耗时较长的网络操作 (扫描、保存的网络、开关 WLAN/日志、连接网络)
/// - `serial_ms`: 串口操作 (设置波特率、发送、断开)
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    #[serde(default = "default_status_ms")]
    pub status_ms: u64,
    #[serde(default = "default_network_ms")]
    pub network_ms: u64,
    #[serde(default = "default_serial_ms")]
    pub serial_ms: u64,
}

fn default_status_ms() -> u64 {
    5_000
}

fn default_network_ms() -> u64 {
    60_000
}

fn default_serial_ms() -> u64 {
    3_000
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            status_ms: default_status_ms(),
            network_ms: default_network_ms(),
            serial_ms: default_serial_ms(),
        }
    }
}

impl RequestTimeouts {
    pub fn status(&self) -> Duration {
        Duration::from_millis(self.status_ms)
    }

    pub fn network(&self) -> Duration {
        Duration::from_millis(self.network_ms)
    }

    pub fn serial(&self) -> Duration {
        Duration::from_millis(self.serial_ms)
    }
}

/// 面板客户端的全部配置项。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// 设备 WebSocket 地址。
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// 日志级别 ("error"、"warn"、"info"、"debug"、"trace")。
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 请求超时配置。
    #[serde(default)]
    pub timeouts: RequestTimeouts,
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            log_level: default_log_level(),
            timeouts: RequestTimeouts::default(),
        }
    }
}

impl AppConfig {
    /// 使用给定的查找函数应用覆盖项 (生产环境中传入 `std::env::var`)。
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_WS_URL).filter(|v| !v.trim().is_empty()) {
            info!("[配置模块] 环境变量 {} 覆盖设备地址: {}", ENV_WS_URL, url);
            self.ws_url = url.trim().to_string();
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
            info!("[配置模块] 环境变量 {} 覆盖日志级别: {}", ENV_LOG_LEVEL, level);
            self.log_level = level.trim().to_string();
        }
    }

    /// 从进程环境变量应用覆盖项。
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// 校验配置项。
    pub fn validate(&self) -> Result<(), PanelError> {
        let url = Url::parse(&self.ws_url)
            .map_err(|e| PanelError::Config(format!("设备地址 '{}' 不是合法的 URL: {}", self.ws_url, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(PanelError::Config(format!(
                "设备地址 '{}' 必须使用 ws:// 或 wss://",
                self.ws_url
            )));
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(PanelError::Config(format!("无法识别的日志级别 '{}'", self.log_level)));
        }
        let t = &self.timeouts;
        if t.status_ms == 0 || t.network_ms == 0 || t.serial_ms == 0 {
            return Err(PanelError::Config("超时时间必须大于 0 毫秒".to_string()));
        }
        Ok(())
    }
}

/// 默认配置文件路径 `./config/app_settings.json`。
pub fn default_config_path() -> PathBuf {
    PathBuf::from(".").join("config").join(CONFIG_FILE_NAME)
}

/// 从指定路径加载配置；文件不存在时写入并返回默认配置。
pub fn load_app_config(config_file_path: &Path) -> Result<AppConfig, PanelError> {
    if config_file_path.exists() {
        let config_content = fs::read_to_string(config_file_path).map_err(|e| {
            PanelError::Config(format!("读取配置文件 '{}' 失败: {}", config_file_path.display(), e))
        })?;
        let app_config: AppConfig = serde_json::from_str(&config_content).map_err(|e| {
            PanelError::Config(format!("解析配置文件 '{}' 的内容失败: {}", config_file_path.display(), e))
        })?;
        Ok(app_config)
    } else {
        info!(
            "[配置模块] 配置文件 '{}' 未找到，将使用默认配置参数创建新文件。",
            config_file_path.display()
        );
        let default_config = AppConfig::default();
        save_app_config(config_file_path, &default_config)?;
        Ok(default_config)
    }
}

/// 将配置以格式化 JSON 写入指定路径，必要时创建父目录。
pub fn save_app_config(config_file_path: &Path, app_config: &AppConfig) -> Result<(), PanelError> {
    if let Some(parent_dir) = config_file_path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            fs::create_dir_all(parent_dir).map_err(|e| {
                PanelError::Config(format!("创建配置目录 '{}' 失败: {}", parent_dir.display(), e))
            })?;
        }
    }

    let config_content = serde_json::to_string_pretty(app_config)?;
    fs::write(config_file_path, config_content).map_err(|e| {
        PanelError::Config(format!("写入配置文件 '{}' 失败: {}", config_file_path.display(), e))
    })?;

    info!("[配置模块] 应用配置已成功保存至: '{}'", config_file_path.display());
    Ok(())
}

/// 初始化配置：加载 (失败时退回默认值)、应用环境变量覆盖并校验。
///
/// 覆盖后的配置若校验失败，记录错误并退回默认配置，保证调用方总能拿到一份可用的配置。
pub fn init_app_config(config_file_path: &Path) -> AppConfig {
    info!("[配置模块] 开始初始化应用配置...");
    let mut config = match load_app_config(config_file_path) {
        Ok(config) => config,
        Err(e) => {
            error!("[配置模块] 从文件 {} 加载配置失败: {}。将使用默认配置。", config_file_path.display(), e);
            AppConfig::default()
        }
    };
    config.apply_env_overrides();
    if let Err(e) = config.validate() {
        warn!("[配置模块] 配置校验失败: {}。将使用默认配置。", e);
        return AppConfig::default();
    }
    info!("[配置模块] 应用配置已初始化完毕，设备地址: {}", config.ws_url);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// 为每个测试生成独立的临时配置路径。
    fn temp_config_path(test_name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("device_panel_cfg_{}_{}", test_name, std::process::id()))
            .join(CONFIG_FILE_NAME)
    }

    #[test]
    fn test_load_creates_default_file_when_missing() {
        let path = temp_config_path("missing");
        let _ = fs::remove_file(&path);

        let config = load_app_config(&path).expect("首次加载应创建默认配置");
        assert_eq!(config, AppConfig::default());
        assert!(path.exists(), "默认配置文件应已被写入");

        // 修改后保存，再次加载应读到修改后的值
        let mut modified = config.clone();
        modified.ws_url = "ws://192.168.4.1/ws".to_string();
        modified.timeouts.serial_ms = 1_500;
        save_app_config(&path, &modified).expect("保存配置失败");
        let reloaded = load_app_config(&path).expect("重新加载配置失败");
        assert_eq!(reloaded, modified);
        assert_eq!(reloaded.timeouts.serial(), Duration::from_millis(1_500));

        let _ = fs::remove_dir_all(path.parent().expect("配置路径应有父目录"));
    }

    #[test]
    fn test_corrupt_file_is_reported_and_init_falls_back() {
        let path = temp_config_path("corrupt");
        fs::create_dir_all(path.parent().expect("配置路径应有父目录")).expect("创建目录失败");
        fs::write(&path, "{ this is not json").expect("写入损坏文件失败");

        assert!(matches!(load_app_config(&path), Err(PanelError::Config(_))));
        let config = init_app_config(&path);
        assert_eq!(config.timeouts, RequestTimeouts::default());

        let _ = fs::remove_dir_all(path.parent().expect("配置路径应有父目录"));
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"ws_url":"ws://10.0.0.2:81","timeouts":{"network_ms":30000}}"#).unwrap();
        assert_eq!(config.ws_url, "ws://10.0.0.2:81");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.timeouts.network(), Duration::from_secs(30));
        assert_eq!(config.timeouts.status(), Duration::from_secs(5));
        assert_eq!(config.timeouts.serial(), Duration::from_secs(3));
    }

    #[test]
    fn test_overrides_and_validation() {
        let vars: HashMap<&str, &str> = [(ENV_WS_URL, " wss://device.local/ws "), (ENV_LOG_LEVEL, "debug")]
            .into_iter()
            .collect();
        let mut config = AppConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.ws_url, "wss://device.local/ws");
        assert_eq!(config.log_level, "debug");
        assert!(config.validate().is_ok());

        config.ws_url = "http://device.local".to_string();
        assert!(matches!(config.validate(), Err(PanelError::Config(_))));

        let mut bad_level = AppConfig::default();
        bad_level.log_level = "loud".to_string();
        assert!(bad_level.validate().is_err());

        let mut zero_timeout = AppConfig::default();
        zero_timeout.timeouts.status_ms = 0;
        assert!(zero_timeout.validate().is_err());
    }
}
