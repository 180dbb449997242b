// DevicePanel/src/services/wlan.rs

//! WLAN 助手 (`system/wifi`)。

use common_models::enums::{CommandKind, ResponseStatus};
use common_models::ws_payloads::{DeviceCommand, WifiCredentials, WifiNetwork, TAG_SYSTEM_WIFI};
use log::{info, warn};
use rust_websocket_utils::message::Payload;
use serde::Serialize;
use serde_json::Value;

use super::PanelContext;
use crate::error::PanelError;
use crate::ws_client::request::failure_reason;
use crate::ws_client::{RequestSpec, Verdict};

/// 设备报告的 WLAN 状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WlanStatus {
    pub enabled: bool,
    pub connected: bool,
}

impl WlanStatus {
    /// 由 `details` 字符串推导：`"disabled"` 表示关闭，`"connected"` 表示已连接。
    pub fn from_details(details: &str) -> Self {
        Self {
            enabled: details != "disabled",
            connected: details == "connected",
        }
    }
}

fn wifi_command(key: &str) -> DeviceCommand {
    DeviceCommand::new(CommandKind::System, TAG_SYSTEM_WIFI.1).with_key(key)
}

/// 网络列表应答：`terminal` 状态 (list/scan)，或 `success` 且 details 为数组。
fn network_list_verdict(payload: &Payload, terminal: &ResponseStatus) -> Verdict<Vec<WifiNetwork>> {
    let Some(status) = payload.status() else {
        return Verdict::Pending;
    };
    if status.is_failure() {
        return Verdict::Failed(failure_reason(payload));
    }
    let is_list = &status == terminal
        || (status == ResponseStatus::Success && payload.details().is_some_and(Value::is_array));
    if !is_list {
        return Verdict::Pending;
    }
    match payload.details_as::<Vec<WifiNetwork>>() {
        Ok(networks) => Verdict::Done(networks),
        Err(e) => Verdict::Failed(e.to_string()),
    }
}

/// 查询 WLAN 状态并写入共享状态；失败时开关与连接标志都置为 `false`。
pub async fn fetch_status(ctx: &PanelContext) -> Result<WlanStatus, PanelError> {
    ctx.state.write().await.wlan.loading = true;
    let result = ctx
        .socket
        .request(RequestSpec::command(wifi_command("status"), ctx.timeouts.status()), |p: &Payload| {
            Verdict::on_success(p, |p| Ok(WlanStatus::from_details(p.details_str().unwrap_or_default())))
        })
        .await;

    let mut state = ctx.state.write().await;
    state.wlan.loading = false;
    match &result {
        Ok(status) => {
            state.wlan.enabled = status.enabled;
            state.wlan.connected = status.connected;
        }
        Err(e) => {
            warn!("[WLAN] WLAN 状态无法获取: {}", e);
            state.wlan.enabled = false;
            state.wlan.connected = false;
        }
    }
    result
}

/// 读取设备上保存的网络列表，成功后写入共享状态。
pub async fn saved_networks(ctx: &PanelContext) -> Result<Vec<WifiNetwork>, PanelError> {
    ctx.state.write().await.wlan.loading = true;
    let spec = RequestSpec::command(wifi_command("list").with_value(""), ctx.timeouts.network());
    let result = ctx
        .socket
        .request(spec, |p: &Payload| network_list_verdict(p, &ResponseStatus::List))
        .await;

    let mut state = ctx.state.write().await;
    state.wlan.loading = false;
    match &result {
        Ok(networks) => state.wlan.saved_networks = networks.clone(),
        Err(e) => warn!("[WLAN] 读取保存的网络失败: {}", e),
    }
    result
}

/// 扫描周围的网络。结果不写入共享状态。
pub async fn scan_networks(ctx: &PanelContext) -> Result<Vec<WifiNetwork>, PanelError> {
    ctx.state.write().await.wlan.loading = true;
    let spec = RequestSpec::command(wifi_command("scan").with_value(""), ctx.timeouts.network());
    let result = ctx
        .socket
        .request(spec, |p: &Payload| network_list_verdict(p, &ResponseStatus::Scan))
        .await;
    ctx.state.write().await.wlan.loading = false;
    if let Err(e) = &result {
        warn!("[WLAN] 扫描网络失败: {}", e);
    }
    result
}

/// 打开或关闭 WLAN。
///
/// 先乐观地更新共享状态；设备拒绝或超时时回滚到调用前的值并返回错误。
pub async fn set_enabled(ctx: &PanelContext, enabled: bool) -> Result<(), PanelError> {
    let previous = {
        let mut state = ctx.state.write().await;
        state.wlan.loading = true;
        std::mem::replace(&mut state.wlan.enabled, enabled)
    };

    let key = if enabled { "enable" } else { "disable" };
    let result = ctx
        .socket
        .request(RequestSpec::command(wifi_command(key), ctx.timeouts.network()), |p: &Payload| {
            Verdict::on_success(p, |_| Ok(()))
        })
        .await;

    let mut state = ctx.state.write().await;
    state.wlan.loading = false;
    match &result {
        Ok(()) => {
            info!("[WLAN] WLAN 已{}", if enabled { "开启" } else { "关闭" });
            if !enabled {
                state.wlan.connected = false;
            }
        }
        Err(e) => {
            warn!("[WLAN] 切换 WLAN 失败，回滚本地状态: {}", e);
            state.wlan.enabled = previous;
        }
    }
    result
}

/// 连接到指定网络。
///
/// 提供密码时以 `set` 保存并连接，否则以 `connect` 连接已保存的网络。凭据编码为 JSON 字符串放入 `value`。
pub async fn connect_network(ctx: &PanelContext, ssid: &str, password: Option<&str>) -> Result<(), PanelError> {
    let ssid = ssid.trim();
    if ssid.is_empty() {
        return Err(PanelError::InvalidArgument("SSID 不能为空".to_string()));
    }
    let password = password.filter(|p| !p.is_empty());
    let credentials = WifiCredentials {
        ssid: ssid.to_string(),
        password: password.map(str::to_string),
    };
    let key = if password.is_some() { "set" } else { "connect" };
    let command = wifi_command(key).with_value(serde_json::to_string(&credentials)?);

    ctx.state.write().await.wlan.loading = true;
    let result = ctx
        .socket
        .request(RequestSpec::command(command, ctx.timeouts.network()), |p: &Payload| {
            Verdict::on_success(p, |_| Ok(()))
        })
        .await;

    let mut state = ctx.state.write().await;
    state.wlan.loading = false;
    match &result {
        Ok(()) => {
            info!("[WLAN] 已连接到网络 '{}'", ssid);
            state.wlan.enabled = true;
            state.wlan.connected = true;
            state.wlan.connected_ssid = Some(ssid.to_string());
        }
        Err(e) => warn!("[WLAN] 连接网络 '{}' 失败: {}", ssid, e),
    }
    result
}
