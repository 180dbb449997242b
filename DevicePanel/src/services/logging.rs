// DevicePanel/src/services/logging.rs

//! 设备文件日志助手 (`log/debug`、`log/list`)。

use common_models::enums::{CommandKind, ResponseStatus};
use common_models::ws_payloads::{DeviceCommand, LogFileEntry, LoggingDetails, TAG_LOG_DEBUG, TAG_LOG_LIST};
use log::{info, warn};
use rust_websocket_utils::message::Payload;
use serde_json::Value;

use super::PanelContext;
use crate::error::PanelError;
use crate::ws_client::request::failure_reason;
use crate::ws_client::{RequestSpec, Verdict};

/// 从 `log/debug` 应答中读出日志开关。
///
/// 固件在不同版本中使用过三种形状：`"true"`/`"false"` 字符串、布尔值、`{activate, detail}` 对象。
/// 无法识别的形状返回 `None`。
pub fn logging_enabled_from(payload: &Payload) -> Option<bool> {
    match payload.details()? {
        Value::String(s) => Some(s == "true"),
        Value::Bool(b) => Some(*b),
        Value::Object(_) => payload.details_as::<LoggingDetails>().ok().map(|d| d.activate),
        _ => None,
    }
}

fn debug_command(key: &str) -> DeviceCommand {
    DeviceCommand::new(CommandKind::Log, TAG_LOG_DEBUG.1).with_key(key)
}

/// 查询文件日志是否开启；失败时视为关闭。
pub async fn fetch_status(ctx: &PanelContext) -> Result<bool, PanelError> {
    ctx.state.write().await.logging.loading = true;
    let result = ctx
        .socket
        .request(RequestSpec::command(debug_command("status"), ctx.timeouts.status()), |p: &Payload| {
            Verdict::on_success(p, |p| Ok(logging_enabled_from(p).unwrap_or(false)))
        })
        .await;

    let mut state = ctx.state.write().await;
    state.logging.loading = false;
    match &result {
        Ok(enabled) => state.logging.enabled = *enabled,
        Err(e) => {
            warn!("[日志] 日志状态无法获取: {}", e);
            state.logging.enabled = false;
        }
    }
    result
}

/// 开启或关闭文件日志，返回设备确认后的状态。
///
/// 乐观更新共享状态；失败时回滚到调用前的值。
pub async fn set_enabled(ctx: &PanelContext, enabled: bool) -> Result<bool, PanelError> {
    let previous = {
        let mut state = ctx.state.write().await;
        state.logging.loading = true;
        std::mem::replace(&mut state.logging.enabled, enabled)
    };

    let key = if enabled { "activate" } else { "deactivate" };
    let result = ctx
        .socket
        .request(RequestSpec::command(debug_command(key), ctx.timeouts.network()), move |p: &Payload| {
            Verdict::on_success(p, |p| Ok(logging_enabled_from(p).unwrap_or(enabled)))
        })
        .await;

    let mut state = ctx.state.write().await;
    state.logging.loading = false;
    match &result {
        Ok(confirmed) => {
            info!("[日志] 设备确认文件日志状态: {}", confirmed);
            state.logging.enabled = *confirmed;
        }
        Err(e) => {
            warn!("[日志] 切换文件日志失败，回滚本地状态: {}", e);
            state.logging.enabled = previous;
        }
    }
    result
}

/// 列出设备上的日志文件。
pub async fn list_files(ctx: &PanelContext) -> Result<Vec<LogFileEntry>, PanelError> {
    let command = DeviceCommand::new(CommandKind::Log, TAG_LOG_LIST.1);
    ctx.socket
        .request(RequestSpec::command(command, ctx.timeouts.status()), |p: &Payload| {
            match p.status() {
                Some(ResponseStatus::Error) => Verdict::Failed(failure_reason(p)),
                Some(ResponseStatus::Success) | Some(ResponseStatus::List) => {
                    match p.details_as::<Vec<LogFileEntry>>() {
                        Ok(files) => Verdict::Done(files),
                        Err(e) => Verdict::Failed(e.to_string()),
                    }
                }
                _ => Verdict::Pending,
            }
        })
        .await
}
