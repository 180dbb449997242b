// DevicePanel/src/services/status.rs

//! 系统状态刷新与设备推送跟踪。

use std::fmt;

use common_models::ws_payloads::{SerialStatusDetails, SystemInitDetails, TAG_SERIAL_STATUS, TAG_SYSTEM_INIT};
use log::{debug, info, warn};
use rust_websocket_utils::message::Payload;
use tokio::sync::mpsc;

use super::{logging, serial, system, wlan, PanelContext};
use crate::error::PanelError;
use crate::state::{SharedSystemState, SystemState};
use crate::ws_client::ListenerGuard;

/// 刷新中的各项查询。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFeature {
    Wlan,
    Logging,
    Version,
    Serial,
}

impl fmt::Display for StatusFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusFeature::Wlan => "wlan",
            StatusFeature::Logging => "logging",
            StatusFeature::Version => "version",
            StatusFeature::Serial => "serial",
        };
        f.write_str(name)
    }
}

/// 一次刷新的结果。
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// 因网络不可达而跳过 (未发起任何传输层操作，状态未被修改)。
    pub skipped_offline: bool,
    /// 失败的查询及其错误；其余查询均已成功并写入共享状态。
    pub failures: Vec<(StatusFeature, PanelError)>,
}

impl RefreshReport {
    /// 所有查询都已成功。
    pub fn is_complete(&self) -> bool {
        !self.skipped_offline && self.failures.is_empty()
    }
}

/// 刷新全部系统状态。
///
/// 离线时立即返回 (`skipped_offline`)。否则先建立连接 (连接失败直接返回错误)，
/// 再并发执行 WLAN、日志、版本与串口查询；各查询互不影响，全部结束后汇总为报告。
pub async fn refresh_system_status(ctx: &PanelContext) -> Result<RefreshReport, PanelError> {
    if !ctx.socket.is_online() {
        warn!("[状态刷新] 网络不可达，跳过系统状态刷新。");
        return Ok(RefreshReport {
            skipped_offline: true,
            failures: Vec::new(),
        });
    }

    ctx.socket.connect().await?;
    info!("[状态刷新] 开始并发查询 WLAN、日志、版本与串口状态...");
    let (wlan, logging, version, serial) = tokio::join!(
        wlan::fetch_status(ctx),
        logging::fetch_status(ctx),
        system::fetch_version(ctx),
        serial::fetch_status(ctx),
    );

    let mut report = RefreshReport::default();
    if let Err(e) = wlan {
        report.failures.push((StatusFeature::Wlan, e));
    }
    if let Err(e) = logging {
        report.failures.push((StatusFeature::Logging, e));
    }
    if let Err(e) = version {
        report.failures.push((StatusFeature::Version, e));
    }
    if let Err(e) = serial {
        report.failures.push((StatusFeature::Serial, e));
    }
    info!("[状态刷新] 刷新完成，失败 {} 项。", report.failures.len());
    Ok(report)
}

type StateUpdate = Box<dyn FnOnce(&mut SystemState) + Send>;

/// 启动唯一的状态写入任务，按推送到达的顺序依次应用更新。
///
/// 所有发送端 (随监听器一起) 被丢弃后任务结束。
fn spawn_state_writer(state: SharedSystemState) -> mpsc::UnboundedSender<StateUpdate> {
    let (tx, mut rx) = mpsc::unbounded_channel::<StateUpdate>();
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            update(&mut *state.write().await);
        }
        debug!("[状态跟踪] 推送跟踪已停止。");
    });
    tx
}

fn queue_update(updates: &mpsc::UnboundedSender<StateUpdate>, update: StateUpdate) {
    if updates.send(update).is_err() {
        warn!("[状态跟踪] 状态写入任务已退出，推送帧未写入状态。");
    }
}

/// 安装持久监听器，把设备主动推送的 `system/init` 与 `serial/status` 写入共享状态。
///
/// 更新按帧到达的顺序写入。返回的守卫全部被丢弃时停止跟踪。
pub async fn track_device_pushes(ctx: &PanelContext) -> Vec<ListenerGuard> {
    let updates = spawn_state_writer(ctx.state.clone());

    let init_updates = updates.clone();
    let init_guard = ctx
        .socket
        .subscribe(TAG_SYSTEM_INIT, move |p: &Payload| match p.details_as::<SystemInitDetails>() {
            Ok(init) => {
                debug!("[状态跟踪] 收到设备问候: {:?}", init);
                queue_update(&init_updates, Box::new(move |state| state.apply_init(&init)));
            }
            Err(e) => warn!("[状态跟踪] 忽略无法解析的 system/init 帧: {}", e),
        })
        .await;

    let serial_guard = ctx
        .socket
        .subscribe(TAG_SERIAL_STATUS, move |p: &Payload| {
            if p.status().is_some_and(|s| s.is_failure()) {
                return;
            }
            if let Ok(details) = p.details_as::<SerialStatusDetails>() {
                queue_update(&updates, Box::new(move |state| state.serial.apply_details(details)));
            }
        })
        .await;

    vec![init_guard, serial_guard]
}
