// DeviceSimulator/src/session.rs

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common_models::enums::ResponseStatus;
use common_models::ws_payloads::{TAG_SERIAL_STATUS, TAG_SYSTEM_INIT};
use futures_util::StreamExt;
use log::{debug, info, warn};
use rust_websocket_utils::client::transport::{close_sink, receive_text, send_text};
use rust_websocket_utils::message::InboundFrame;
use rust_websocket_utils::server::transport::WsStream;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::router;
use crate::server::{SessionEvent, SimulatorShared};

/// 出站队列容量。
const OUTBOUND_CAPACITY: usize = 64;

/// 一个已连接客户端的会话。
///
/// 出站帧经 `sender` 进入队列，由该连接专用的写任务依次写入 WebSocket。
#[derive(Debug)]
pub struct ClientSession {
    /// 服务端为该连接生成的唯一标识 (UUID v4)。
    pub session_id: Uuid,
    pub addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub sender: mpsc::Sender<String>,
}

impl ClientSession {
    pub fn new(addr: SocketAddr, sender: mpsc::Sender<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            addr,
            connected_at: Utc::now(),
            sender,
        }
    }

    /// 把一帧放入出站队列。写任务已退出时返回 `false`。
    pub async fn send_frame(&self, frame: &InboundFrame) -> bool {
        match frame.to_json() {
            Ok(text) => self.send_text(text).await,
            Err(e) => {
                warn!("[会话 {}] 序列化应答帧失败: {}", self.session_id, e);
                true
            }
        }
    }

    pub async fn send_text(&self, text: String) -> bool {
        self.sender.send(text).await.is_ok()
    }
}

/// 处理一个客户端连接直到其断开或被服务端踢出。
///
/// 连接建立后先推送 `system/init` 与 `serial/status`，随后循环处理指令与广播事件。
pub async fn run_session(ws_stream: WsStream, addr: SocketAddr, shared: Arc<SimulatorShared>) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let session = ClientSession::new(addr, tx);
    let mut events = shared.events.subscribe();
    shared.accepted.fetch_add(1, Ordering::SeqCst);
    shared.active.fetch_add(1, Ordering::SeqCst);
    info!(
        "[会话 {}] 客户端 {} 已连接 (时间 {})",
        session.session_id,
        addr,
        session.connected_at.to_rfc3339()
    );

    let session_id = session.session_id;
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = send_text(&mut ws_sender, text).await {
                warn!("[会话 {}] 写入失败，结束写任务: {}", session_id, e);
                break;
            }
        }
        let _ = close_sink(&mut ws_sender).await;
    });

    let greeting = {
        let device = shared.device.lock().await;
        vec![
            InboundFrame::response(TAG_SYSTEM_INIT, ResponseStatus::Success, json!(device.init_details())),
            InboundFrame::response(TAG_SERIAL_STATUS, ResponseStatus::Success, json!(device.serial_status())),
        ]
    };
    for frame in &greeting {
        session.send_frame(frame).await;
    }

    loop {
        tokio::select! {
            incoming = receive_text(&mut ws_receiver) => match incoming {
                Some(Ok(text)) => {
                    debug!("[会话 {}] 收到: {}", session.session_id, text);
                    shared.record(&text);
                    let routed = {
                        let mut device = shared.device.lock().await;
                        router::handle_text(&mut device, &text)
                    };
                    match routed {
                        Ok(frames) => {
                            for frame in &frames {
                                if !session.send_frame(frame).await {
                                    break;
                                }
                            }
                        }
                        Err(e) => warn!("[会话 {}] 忽略指令: {:#}", session.session_id, e),
                    }
                }
                Some(Err(e)) => {
                    warn!("[会话 {}] 读取失败: {}", session.session_id, e);
                    break;
                }
                None => {
                    info!("[会话 {}] 客户端关闭了连接", session.session_id);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(SessionEvent::Push(text)) => {
                    session.send_text(text).await;
                }
                Ok(SessionEvent::Kick) => {
                    info!("[会话 {}] 服务端主动断开客户端 {}", session.session_id, addr);
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("[会话 {}] 落后 {} 条广播事件", session.session_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    drop(session);
    let _ = writer.await;
    shared.active.fetch_sub(1, Ordering::SeqCst);
    info!("[会话 {}] 会话结束", session_id);
}
