// DeviceSimulator/src/server.rs

//! 模拟器服务端：监听、共享状态与测试句柄。

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use common_models::enums::ResponseStatus;
use common_models::ws_payloads::{DeviceCommand, TAG_SERIAL_INCOMING};
use log::{info, warn};
use rust_websocket_utils::message::InboundFrame;
use rust_websocket_utils::server::transport::{ServerTransport, WsStream};
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tokio::task::JoinHandle;

use crate::device::DeviceState;
use crate::error::SimulatorError;
use crate::session::run_session;

/// 广播给所有会话的事件。
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// 向每个客户端推送一帧文本。
    Push(String),
    /// 断开所有客户端。
    Kick,
}

/// 所有会话共享的模拟器状态。
pub struct SimulatorShared {
    pub device: TokioMutex<DeviceState>,
    /// 按到达顺序记录的全部入站文本。
    received: Mutex<Vec<String>>,
    /// 累计接受的连接数。
    pub accepted: AtomicUsize,
    /// 当前活跃的连接数。
    pub active: AtomicUsize,
    pub events: broadcast::Sender<SessionEvent>,
}

impl SimulatorShared {
    pub fn new(device: DeviceState) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            device: TokioMutex::new(device),
            received: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            events,
        }
    }

    pub fn record(&self, text: &str) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// 在前台运行模拟器，直到监听失败。
pub async fn run(bind_addr: &str, device: DeviceState) -> Result<(), SimulatorError> {
    let transport = ServerTransport::bind(bind_addr).await?;
    info!("[模拟器] 正在监听 ws://{}", transport.local_addr()?);
    let shared = Arc::new(SimulatorShared::new(device));
    transport
        .serve(move |ws_stream: WsStream, peer_addr: SocketAddr| run_session(ws_stream, peer_addr, shared.clone()))
        .await?;
    Ok(())
}

/// 在后台任务中启动模拟器，返回用于观察与操纵的句柄。
///
/// 测试中通常绑定 `127.0.0.1:0`，再通过 [`SimulatorHandle::url`] 取得实际地址。
pub async fn spawn(bind_addr: &str, device: DeviceState) -> Result<SimulatorHandle, SimulatorError> {
    let transport = ServerTransport::bind(bind_addr).await?;
    let local_addr = transport.local_addr()?;
    let shared = Arc::new(SimulatorShared::new(device));
    let session_shared = shared.clone();
    let task = tokio::spawn(async move {
        let result = transport
            .serve(move |ws_stream: WsStream, peer_addr: SocketAddr| {
                run_session(ws_stream, peer_addr, session_shared.clone())
            })
            .await;
        if let Err(e) = result {
            warn!("[模拟器] 服务任务结束: {}", e);
        }
    });
    info!("[模拟器] 已在后台启动，地址 ws://{}", local_addr);
    Ok(SimulatorHandle { local_addr, shared, task })
}

/// 后台模拟器的句柄。被丢弃时停止接受新连接。
pub struct SimulatorHandle {
    local_addr: SocketAddr,
    shared: Arc<SimulatorShared>,
    task: JoinHandle<()>,
}

impl SimulatorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 面板可直接使用的 `ws://` 地址。
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// 迄今收到的全部原始文本帧。
    pub fn received_frames(&self) -> Vec<String> {
        self.shared.received()
    }

    /// 迄今收到的全部指令 (统一为规范格式)，无法识别的帧被跳过。
    pub fn received_commands(&self) -> Vec<DeviceCommand> {
        self.shared
            .received()
            .iter()
            .filter_map(|text| DeviceCommand::parse_any(text))
            .collect()
    }

    pub fn accepted_connections(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    pub fn active_connections(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// 当前设备状态的快照。
    pub async fn device(&self) -> DeviceState {
        self.shared.device.lock().await.clone()
    }

    /// 修改设备状态。
    pub async fn update_device<F: FnOnce(&mut DeviceState)>(&self, update: F) {
        update(&mut *self.shared.device.lock().await);
    }

    /// 模拟串口设备输出一行数据，推送给所有客户端。
    pub fn push_serial_line(&self, line: &str) {
        let frame = InboundFrame::response(TAG_SERIAL_INCOMING, ResponseStatus::Data, line);
        match frame.to_json() {
            Ok(text) => {
                let _ = self.shared.events.send(SessionEvent::Push(text));
            }
            Err(e) => warn!("[模拟器] 序列化串口数据失败: {}", e),
        }
    }

    /// 断开所有当前客户端 (模拟设备重启或网络中断)。
    pub fn kick_clients(&self) {
        let _ = self.shared.events.send(SessionEvent::Kick);
    }

    /// 轮询直到满足条件或超时，返回最终是否满足。
    pub async fn wait_until<F: Fn(&SimulatorHandle) -> bool>(&self, within: Duration, condition: F) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if condition(self) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for SimulatorHandle {
    fn drop(&mut self) {
        self.task.abort();
        let _ = self.shared.events.send(SessionEvent::Kick);
    }
}
