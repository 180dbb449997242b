// DevicePanel/src/services/serial.rs

//! 串口桥助手 (`serial/*`)。
//!
//! 设备在客户端连接后以及波特率变化后主动推送 `serial/status`；串口收到的数据以 `serial/incoming` 推送。

use common_models::enums::{CommandKind, ResponseStatus};
use common_models::ws_payloads::{
    DeviceCommand, SerialStatusDetails, SUPPORTED_BAUD_RATES, TAG_SERIAL_DISCONNECT, TAG_SERIAL_INCOMING,
    TAG_SERIAL_SEND, TAG_SERIAL_SET_BAUD, TAG_SERIAL_STATUS,
};
use log::{info, warn};
use rust_websocket_utils::message::Payload;

use super::PanelContext;
use crate::error::PanelError;
use crate::ws_client::request::failure_reason;
use crate::ws_client::{ListenerGuard, RequestSpec, Verdict};

fn status_details_verdict(payload: &Payload) -> Verdict<SerialStatusDetails> {
    Verdict::from_status(payload, |p| p.details_as::<SerialStatusDetails>().ok())
}

/// 设置波特率的分类：`serial/setBaud` 上的错误或 `available` 为假的 `serial/status` 立即失败，
/// 波特率不一致的状态帧继续等待。
fn set_baud_verdict(payload: &Payload, baud_rate: u32) -> Verdict<SerialStatusDetails> {
    if payload.status().is_some_and(|s| s.is_failure()) {
        return Verdict::Failed(failure_reason(payload));
    }
    match payload.details_as::<SerialStatusDetails>() {
        Ok(details) if !details.available => Verdict::Failed("串口上未检测到设备".to_string()),
        Ok(details) if details.baud_rate == baud_rate => Verdict::Done(details),
        _ => Verdict::Pending,
    }
}

/// 把 `serial/incoming` 负载转换为一行终端文本：`data` 状态原样输出，其他状态输出 `Error: …`。
pub fn incoming_line(payload: &Payload) -> String {
    match payload.status() {
        Some(ResponseStatus::Data) => payload.details_str().unwrap_or_default().to_string(),
        _ => format!("Error: {}", payload.error_text().unwrap_or("unbekannter Fehler")),
    }
}

async fn store_status(ctx: &PanelContext, result: &Result<SerialStatusDetails, PanelError>) {
    let mut state = ctx.state.write().await;
    state.serial.loading = false;
    match result {
        Ok(details) => state.serial.apply_details(*details),
        Err(e) => {
            warn!("[串口] 串口状态无法获取: {}", e);
            state.serial.available = false;
            state.serial.baud_rate = 0;
            state.serial.connected = false;
        }
    }
}

/// 主动查询串口状态 (设备以 `serial/status` 应答)。
pub async fn fetch_status(ctx: &PanelContext) -> Result<SerialStatusDetails, PanelError> {
    ctx.state.write().await.serial.loading = true;
    let command = DeviceCommand::new(CommandKind::Serial, TAG_SERIAL_STATUS.1).with_key("get");
    let result = ctx
        .socket
        .request(RequestSpec::command(command, ctx.timeouts.status()), status_details_verdict)
        .await;
    store_status(ctx, &result).await;
    result
}

/// 不发送指令，仅等待下一帧 `serial/status` 推送。
pub async fn await_status(ctx: &PanelContext) -> Result<SerialStatusDetails, PanelError> {
    ctx.state.write().await.serial.loading = true;
    let result = ctx
        .socket
        .request(RequestSpec::listen(TAG_SERIAL_STATUS, ctx.timeouts.status()), status_details_verdict)
        .await;
    store_status(ctx, &result).await;
    result
}

/// 设置波特率。
///
/// 设备以 `serial/status` 确认；只有 `available` 为真且波特率与请求一致的帧才算成功，
/// 波特率不一致的 `serial/status` 帧 (例如先前排队的推送) 被忽略。
/// 设备在 `serial/setBaud` 上报告的错误以及 `available` 为假的状态帧立即结束请求。
pub async fn set_baud_rate(ctx: &PanelContext, baud_rate: u32) -> Result<SerialStatusDetails, PanelError> {
    if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
        return Err(PanelError::InvalidArgument(format!(
            "不支持的波特率 {} (可选: {:?})",
            baud_rate, SUPPORTED_BAUD_RATES
        )));
    }
    ctx.state.write().await.serial.loading = true;
    let command = DeviceCommand::new(CommandKind::Serial, TAG_SERIAL_SET_BAUD.1).with_value(baud_rate.to_string());
    let spec = RequestSpec::command(command, ctx.timeouts.serial())
        .expect_on(TAG_SERIAL_STATUS)
        .also_on(TAG_SERIAL_SET_BAUD);
    let result = ctx
        .socket
        .request(spec, move |p: &Payload| set_baud_verdict(p, baud_rate))
        .await;

    let mut state = ctx.state.write().await;
    state.serial.loading = false;
    match &result {
        Ok(details) => {
            info!("[串口] 串口已以 {} 波特连接", details.baud_rate);
            state.serial.apply_details(*details);
            state.serial.connected = true;
        }
        Err(e) => {
            warn!("[串口] 设置波特率 {} 失败: {}", baud_rate, e);
            state.serial.connected = false;
        }
    }
    result
}

/// 向串口写入一行文本，返回设备的确认说明。
pub async fn send_line(ctx: &PanelContext, line: &str) -> Result<String, PanelError> {
    if line.is_empty() {
        return Err(PanelError::InvalidArgument("不能发送空行".to_string()));
    }
    let command = DeviceCommand::new(CommandKind::Serial, TAG_SERIAL_SEND.1).with_value(line);
    ctx.socket
        .request(RequestSpec::command(command, ctx.timeouts.serial()), |p: &Payload| {
            Verdict::on_success(p, |p| Ok(p.details_str().unwrap_or_default().to_string()))
        })
        .await
}

/// 关闭串口。
pub async fn disconnect(ctx: &PanelContext) -> Result<(), PanelError> {
    let command = DeviceCommand::new(CommandKind::Serial, TAG_SERIAL_DISCONNECT.1);
    let result = ctx
        .socket
        .request(RequestSpec::command(command, ctx.timeouts.serial()), |p: &Payload| {
            Verdict::on_success(p, |_| Ok(()))
        })
        .await;
    if result.is_ok() {
        ctx.state.write().await.serial.connected = false;
    }
    result
}

/// 订阅串口收到的数据。每帧转换为一行文本交给 `on_line`；返回的守卫被丢弃时订阅结束。
pub async fn subscribe_incoming<F>(ctx: &PanelContext, on_line: F) -> ListenerGuard
where
    F: Fn(String) + Send + Sync + 'static,
{
    ctx.socket
        .subscribe(TAG_SERIAL_INCOMING, move |p: &Payload| on_line(incoming_line(p)))
        .await
}
