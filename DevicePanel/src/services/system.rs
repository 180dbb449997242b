// DevicePanel/src/services/system.rs

//! 固件版本助手 (`system/version`)。

use common_models::enums::CommandKind;
use common_models::ws_payloads::{DeviceCommand, TAG_SYSTEM_VERSION};
use log::warn;
use rust_websocket_utils::message::Payload;

use super::PanelContext;
use crate::error::PanelError;
use crate::state::UNKNOWN_VERSION;
use crate::ws_client::{RequestSpec, Verdict};

/// 查询固件版本；失败时共享状态中的版本退回 [`UNKNOWN_VERSION`]。
pub async fn fetch_version(ctx: &PanelContext) -> Result<String, PanelError> {
    ctx.state.write().await.version.loading = true;
    let command = DeviceCommand::new(CommandKind::System, TAG_SYSTEM_VERSION.1).with_key("get");
    let result = ctx
        .socket
        .request(RequestSpec::command(command, ctx.timeouts.status()), |p: &Payload| {
            Verdict::on_success(p, |p| match p.details_str() {
                Some(version) if !version.is_empty() => Ok(version.to_string()),
                _ => Err("版本应答中缺少版本号".to_string()),
            })
        })
        .await;

    let mut state = ctx.state.write().await;
    state.version.loading = false;
    match &result {
        Ok(version) => state.version.value = version.clone(),
        Err(e) => {
            warn!("[系统] 固件版本无法获取: {}", e);
            state.version.value = UNKNOWN_VERSION.to_string();
        }
    }
    result
}
