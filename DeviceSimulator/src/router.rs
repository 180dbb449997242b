// DeviceSimulator/src/router.rs

//! 指令路由：把一条出站指令变成零到多条应答帧。
//!
//! 应答使用指令的 `(type, command)` 作为标签并回传指令的 `id`。
//! 例外：设置波特率 (`setBaud`) 以一帧 `serial/status` 确认；向串口发送数据后，
//! 除 `serial/send` 应答外还会推送一帧 `serial/incoming` 作为设备回显。

use anyhow::{anyhow, Context, Result};
use common_models::enums::{CommandKind, ResponseStatus};
use common_models::ws_payloads::{DeviceCommand, WifiCredentials, SUPPORTED_BAUD_RATES, TAG_SERIAL_INCOMING, TAG_SERIAL_STATUS};
use log::{debug, info};
use rust_websocket_utils::message::InboundFrame;
use serde_json::{json, Value};

use crate::device::DeviceState;

/// 解析一条文本指令 (规范格式或旧格式) 并生成应答帧。
pub fn handle_text(device: &mut DeviceState, text: &str) -> Result<Vec<InboundFrame>> {
    let command = DeviceCommand::parse_any(text).ok_or_else(|| anyhow!("无法识别的指令: {}", text))?;
    debug!("[路由] 处理指令 {}/{} key={:?}", command.kind.as_str(), command.command, command.key);
    Ok(route(device, &command))
}

/// 按指令类别分发。
pub fn route(device: &mut DeviceState, command: &DeviceCommand) -> Vec<InboundFrame> {
    let id = command.id.as_deref();
    let frames = match command.kind {
        CommandKind::System => handle_system(device, command),
        CommandKind::Log => handle_log(device, command),
        CommandKind::Serial => handle_serial(device, command),
    };
    frames.into_iter().map(|f| f.with_request_id(id)).collect()
}

fn reply(command: &DeviceCommand, status: ResponseStatus, details: impl Into<Value>) -> InboundFrame {
    InboundFrame::response(command.response_tag(), status, details)
}

fn reject(command: &DeviceCommand, reason: &str) -> InboundFrame {
    reply(command, ResponseStatus::Error, "").with_error(reason)
}

fn handle_system(device: &mut DeviceState, command: &DeviceCommand) -> Vec<InboundFrame> {
    match command.command.as_str() {
        "wifi" => vec![handle_wifi(device, command)],
        "version" => vec![reply(command, ResponseStatus::Success, device.firmware_version.clone())],
        _ => vec![reject(command, "Unknown command")],
    }
}

fn parse_credentials(command: &DeviceCommand) -> Result<WifiCredentials> {
    let value = command.value_as_string().context("缺少网络凭据")?;
    serde_json::from_str(&value).context("网络凭据不是合法的 JSON")
}

fn handle_wifi(device: &mut DeviceState, command: &DeviceCommand) -> InboundFrame {
    match command.key.as_deref().unwrap_or_default() {
        "status" => reply(command, ResponseStatus::Success, device.wlan_status()),
        "enable" => {
            device.wlan_enabled = true;
            reply(command, ResponseStatus::Success, "true")
        }
        "disable" => {
            device.wlan_enabled = false;
            device.connected_ssid = None;
            reply(command, ResponseStatus::Success, "true")
        }
        "list" => reply(command, ResponseStatus::List, json!(device.saved_networks)),
        "scan" if !device.wlan_enabled => reject(command, "WLAN deaktiviert"),
        "scan" => reply(command, ResponseStatus::Scan, json!(device.visible_networks)),
        "set" => match parse_credentials(command) {
            Ok(credentials) if device.wlan_enabled && device.is_visible(&credentials.ssid) => {
                info!("[路由] 保存并连接网络 '{}'", credentials.ssid);
                if !device.is_saved(&credentials.ssid) {
                    if let Some(network) = device.visible_networks.iter().find(|n| n.ssid == credentials.ssid) {
                        device.saved_networks.push(network.clone());
                    }
                }
                device.connected_ssid = Some(credentials.ssid);
                reply(command, ResponseStatus::Success, "Network saved & connected")
            }
            Ok(_) => reject(command, "Connect failed"),
            Err(e) => reject(command, &format!("Invalid JSON: {:#}", e)),
        },
        "connect" => match parse_credentials(command) {
            Ok(credentials) if device.wlan_enabled && device.is_saved(&credentials.ssid) => {
                device.connected_ssid = Some(credentials.ssid);
                reply(command, ResponseStatus::Success, "true")
            }
            Ok(_) => reject(command, "No saved network in range"),
            Err(e) => reject(command, &format!("Invalid JSON: {:#}", e)),
        },
        _ => reject(command, "Unknown key"),
    }
}

fn debug_details(device: &DeviceState) -> Value {
    let detail = if device.file_logging {
        "File-Logging aktiviert"
    } else {
        "File-Logging deaktiviert"
    };
    json!({ "activate": device.file_logging, "detail": detail })
}

fn handle_log(device: &mut DeviceState, command: &DeviceCommand) -> Vec<InboundFrame> {
    let frame = match (command.command.as_str(), command.key.as_deref().unwrap_or_default()) {
        ("debug", "activate") => {
            device.file_logging = true;
            reply(command, ResponseStatus::Success, debug_details(device))
        }
        ("debug", "deactivate") => {
            device.file_logging = false;
            reply(command, ResponseStatus::Success, debug_details(device))
        }
        ("debug", "status") => reply(command, ResponseStatus::Success, debug_details(device)),
        ("debug", _) => reject(command, "Unbekannter Key für 'debug'"),
        ("list", _) => reply(command, ResponseStatus::Success, json!(device.log_files)),
        _ => reject(command, "Unbekannter Command bei 'log'"),
    };
    vec![frame]
}

fn status_frame(device: &DeviceState) -> InboundFrame {
    InboundFrame::response(TAG_SERIAL_STATUS, ResponseStatus::Success, json!(device.serial_status()))
}

fn apply_baud(device: &mut DeviceState, command: &DeviceCommand) -> Result<(), String> {
    let baud_rate: u32 = command
        .value_as_string()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| "Ungültige Baud-Rate".to_string())?;
    if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
        return Err("Ungültige Baud-Rate".to_string());
    }
    device.baud_rate = baud_rate;
    device.serial_open = device.serial_attached;
    info!("[路由] 串口波特率设置为 {}", baud_rate);
    Ok(())
}

fn handle_serial(device: &mut DeviceState, command: &DeviceCommand) -> Vec<InboundFrame> {
    match command.command.as_str() {
        "status" => vec![status_frame(device)],
        "setBaud" => match apply_baud(device, command) {
            Ok(()) => vec![status_frame(device)],
            Err(reason) => vec![reject(command, &reason)],
        },
        // 旧格式 {command: serial, setting: set}
        "set" => match apply_baud(device, command) {
            Ok(()) => vec![
                reply(command, ResponseStatus::Success, device.baud_rate.to_string()),
                status_frame(device),
            ],
            Err(reason) => vec![reject(command, &reason)],
        },
        "send" if device.serial_attached => {
            let line = command.value_as_string().unwrap_or_default().replace('\n', "\r\n");
            let echo = InboundFrame::response(TAG_SERIAL_INCOMING, ResponseStatus::Data, format!("echo: {}", line.trim_end()));
            vec![reply(command, ResponseStatus::Success, line), echo]
        }
        "send" => vec![reject(command, "Serial2 nicht verbunden")],
        "disconnect" => {
            device.serial_open = false;
            vec![reply(command, ResponseStatus::Success, "true")]
        }
        _ => vec![reject(command, "Not implemented")],
    }
}
