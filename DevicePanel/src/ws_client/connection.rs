// DevicePanel/src/ws_client/connection.rs

//! 连接管理器：面板与设备之间唯一的 WebSocket 连接。
//!
//! `SocketService` 是一个可廉价克隆的句柄 (内部为 `Arc`)，由应用的组合根显式构造并注入到需要它的地方；
//! 互相独立的实例不共享任何状态。
//!
//! 连接状态机：
//! - `Closed → Connecting`: 可达时的首次发送/监听，或显式调用 `connect()`
//! - `Connecting → Open`: 握手完成
//! - `Open → Closed`: 传输层关闭或出错。不会自动重连，下一次出站调用时按需重连。
//!
//! 不变量：
//! - 任意时刻最多只有一个活动连接 (连接过程由 `connect_lock` 串行化)。
//! - 连接未处于 `Open` 时不写出任何帧，帧进入发送队列。
//! - 发送队列只在 `Open` 时按 FIFO 顺序清空；发送端存在时队列必为空。
//! - 监听器属于服务而非连接，重连后仍然有效。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use common_models::ws_payloads::{DeviceCommand, LegacyCommand};
use log::{debug, error, info, trace, warn};
use rust_websocket_utils::client::transport::{self, ClientReceiver, ClientSink};
use rust_websocket_utils::message::{InboundFrame, Payload, Tag};
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;

use super::registry::{ListenerCallback, ListenerGuard, ListenerId, ListenerRegistry};
use crate::error::PanelError;
use crate::reachability::Reachability;

/// 连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// `send_message` 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 已立即写出。
    Sent,
    /// 连接未打开，已进入发送队列。
    Queued,
}

/// 可被 `send_message` 接受的出站数据。
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// 已序列化的文本，原样发送。
    Text(String),
    /// 任意 JSON 值。
    Json(Value),
    /// 规范格式指令。
    Command(DeviceCommand),
    /// 旧格式指令。
    Legacy(LegacyCommand),
}

impl OutboundFrame {
    fn into_text(self) -> Result<String, PanelError> {
        Ok(match self {
            OutboundFrame::Text(text) => text,
            OutboundFrame::Json(value) => serde_json::to_string(&value)?,
            OutboundFrame::Command(command) => serde_json::to_string(&command)?,
            OutboundFrame::Legacy(command) => serde_json::to_string(&command)?,
        })
    }
}

impl From<String> for OutboundFrame {
    fn from(value: String) -> Self {
        OutboundFrame::Text(value)
    }
}

impl From<&str> for OutboundFrame {
    fn from(value: &str) -> Self {
        OutboundFrame::Text(value.to_string())
    }
}

impl From<Value> for OutboundFrame {
    fn from(value: Value) -> Self {
        OutboundFrame::Json(value)
    }
}

impl From<DeviceCommand> for OutboundFrame {
    fn from(value: DeviceCommand) -> Self {
        OutboundFrame::Command(value)
    }
}

impl From<LegacyCommand> for OutboundFrame {
    fn from(value: LegacyCommand) -> Self {
        OutboundFrame::Legacy(value)
    }
}

/// 连接槽位：状态、发送端与发送队列放在同一把锁下，保证队列清空与直接发送之间的顺序。
struct Link {
    state: ConnectionState,
    sink: Option<ClientSink>,
    queue: VecDeque<String>,
    /// 当前连接的代数，读取任务退出时据此判断自己是否仍代表当前连接。
    epoch: u64,
}

struct Inner {
    url: StdMutex<String>,
    reachability: Arc<dyn Reachability>,
    link: TokioMutex<Link>,
    connect_lock: TokioMutex<()>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    registry: Arc<ListenerRegistry>,
    /// 成功建立的连接次数 (诊断用)。
    connections_opened: AtomicU64,
}

/// 面板到设备的 WebSocket 服务。
#[derive(Clone)]
pub struct SocketService {
    inner: Arc<Inner>,
}

impl SocketService {
    /// 创建服务。此时不会发起任何连接。
    pub fn new(url: impl Into<String>, reachability: Arc<dyn Reachability>) -> Self {
        let url = url.into();
        info!("[连接管理] SocketService 正在初始化，设备地址: {}", url);
        Self {
            inner: Arc::new(Inner {
                url: StdMutex::new(url),
                reachability,
                link: TokioMutex::new(Link {
                    state: ConnectionState::Closed,
                    sink: None,
                    queue: VecDeque::new(),
                    epoch: 0,
                }),
                connect_lock: TokioMutex::new(()),
                reader_task: StdMutex::new(None),
                registry: Arc::new(ListenerRegistry::new()),
                connections_opened: AtomicU64::new(0),
            }),
        }
    }

    /// 当前配置的设备地址。
    pub fn url(&self) -> String {
        self.inner.url.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 当前连接状态。
    pub async fn state(&self) -> ConnectionState {
        self.inner.link.lock().await.state
    }

    /// 发送队列中等待的帧数。
    pub async fn queued_len(&self) -> usize {
        self.inner.link.lock().await.queue.len()
    }

    /// 自创建以来成功建立连接的次数。
    pub fn connections_opened(&self) -> u64 {
        self.inner.connections_opened.load(Ordering::SeqCst)
    }

    /// 网络是否被判断为可达。
    pub fn is_online(&self) -> bool {
        self.inner.reachability.is_online()
    }

    /// 确保连接可用。
    ///
    /// - 判断为离线时什么也不做 (不发起任何传输层操作)。
    /// - 已打开时立即返回。
    /// - 否则向配置的地址发起连接并等待其打开。
    pub async fn ensure_connection(&self) -> Result<(), PanelError> {
        if !self.is_online() {
            debug!("[连接管理] 网络不可达，跳过建立 WebSocket 连接。");
            return Ok(());
        }
        if self.state().await == ConnectionState::Open {
            return Ok(());
        }
        self.connect().await
    }

    /// 连接到配置的设备地址。
    pub async fn connect(&self) -> Result<(), PanelError> {
        let url = self.url();
        self.connect_to(&url).await
    }

    /// 连接到指定地址，并将其记为后续按需重连使用的地址。
    ///
    /// 已打开时直接返回；并发调用被串行化，因此同一时刻最多只有一个连接。
    /// 打开后先按 FIFO 顺序清空发送队列再返回。连接失败时状态回到 `Closed` 并返回错误。
    pub async fn connect_to(&self, url: &str) -> Result<(), PanelError> {
        let _connect_guard = self.inner.connect_lock.lock().await;

        {
            let mut link = self.inner.link.lock().await;
            if link.state == ConnectionState::Open {
                debug!("[连接管理] WebSocket 已连接，无需重复连接。");
                return Ok(());
            }
            link.state = ConnectionState::Connecting;
        }
        *self.inner.url.lock().unwrap_or_else(PoisonError::into_inner) = url.to_string();

        info!("[连接管理] 正在连接设备: {}", url);
        let connection = match transport::connect_client(url).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("[连接管理] 连接 {} 失败: {}", url, e);
                self.inner.link.lock().await.state = ConnectionState::Closed;
                return Err(PanelError::Connect(e));
            }
        };
        let (sink, receiver) = connection.split();

        let mut link = self.inner.link.lock().await;
        link.epoch += 1;
        let epoch = link.epoch;
        link.sink = Some(sink);
        link.state = ConnectionState::Open;
        self.inner.connections_opened.fetch_add(1, Ordering::SeqCst);
        info!("[连接管理] WebSocket 已连接 (第 {} 代)，待发送队列: {} 帧", epoch, link.queue.len());

        self.spawn_reader(receiver, epoch);
        self.flush_queue(&mut link).await
    }

    /// 关闭连接并丢弃句柄。未连接时调用不产生任何效果。
    pub async fn disconnect(&self) {
        let sink = {
            let mut link = self.inner.link.lock().await;
            link.epoch += 1;
            link.state = ConnectionState::Closed;
            link.sink.take()
        };
        if let Some(handle) = self.take_reader_task() {
            handle.abort();
        }
        if let Some(mut sink) = sink {
            if let Err(e) = transport::close_sink(&mut sink).await {
                warn!("[连接管理] 关闭 WebSocket 时发生错误: {}", e);
            }
            info!("[连接管理] WebSocket 连接已关闭。");
        }
    }

    /// 发送一帧。
    ///
    /// 先等待 `ensure_connection()`；连接打开则立即写出，否则进入发送队列。
    /// "尚未打开" 不视为错误：连接尝试失败会被记录，帧仍然排队等待下一次连接。
    /// 只有出站数据无法序列化时才返回错误。
    pub async fn send_message(&self, data: impl Into<OutboundFrame>) -> Result<SendOutcome, PanelError> {
        let text = data.into().into_text()?;
        if let Err(e) = self.ensure_connection().await {
            warn!("[连接管理] 连接不可用，帧已排队等待下次连接: {}", e);
        }

        let mut link = self.inner.link.lock().await;
        if link.state == ConnectionState::Open {
            if let Some(sink) = link.sink.as_mut() {
                match transport::send_text(sink, text.clone()).await {
                    Ok(()) => {
                        trace!("[连接管理] 已发送: {}", text);
                        return Ok(SendOutcome::Sent);
                    }
                    Err(e) => {
                        warn!("[连接管理] 写出失败，丢弃当前连接并排队: {}", e);
                        self.drop_link(&mut link);
                    }
                }
            }
        }
        debug!("[连接管理] 连接未打开，帧进入发送队列 (当前 {} 帧)", link.queue.len() + 1);
        link.queue.push_back(text);
        Ok(SendOutcome::Queued)
    }

    /// 注册持久监听器。注册前先调用 `ensure_connection()`，连接失败只记录日志，监听器照常注册。
    pub async fn on_message<F>(&self, tag: impl Into<Tag>, callback: F) -> ListenerId
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.ensure_before_listen().await;
        self.inner.registry.add(tag.into(), Arc::new(callback) as ListenerCallback)
    }

    /// 注册一次性监听器：第一次匹配的帧到达后自动移除。
    pub async fn once<F>(&self, tag: impl Into<Tag>, callback: F) -> ListenerId
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.ensure_before_listen().await;
        self.inner.registry.add_once(tag.into(), Arc::new(callback) as ListenerCallback)
    }

    /// 注册持久监听器，并返回在离开作用域时自动移除它的守卫。
    pub async fn subscribe<F>(&self, tag: impl Into<Tag>, callback: F) -> ListenerGuard
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let tag = tag.into();
        let id = self.on_message(tag.clone(), callback).await;
        ListenerGuard::new(self.inner.registry.clone(), tag, id)
    }

    /// 移除监听器；不存在时返回 `false`。
    pub fn remove_listener(&self, tag: impl Into<Tag>, id: ListenerId) -> bool {
        self.inner.registry.remove(&tag.into(), id)
    }

    /// 某个标签上当前注册的监听器数量。
    pub fn listener_count(&self, tag: impl Into<Tag>) -> usize {
        self.inner.registry.listener_count(&tag.into())
    }

    /// 所有标签上的监听器总数。
    pub fn total_listeners(&self) -> usize {
        self.inner.registry.total_listeners()
    }

    /// 处理一条入站文本帧：解析、拆分信封并分发。格式错误的帧记录后丢弃。
    ///
    /// 读取任务对每条文本帧调用此方法；测试也可以直接调用它注入帧。
    pub fn handle_incoming_text(&self, text: &str) -> usize {
        self.inner.handle_incoming_text(text)
    }

    /// 发送队列中可解析为指令的帧 (按队列顺序)。
    #[cfg(test)]
    pub(crate) async fn queued_commands(&self) -> Vec<DeviceCommand> {
        self.inner
            .link
            .lock()
            .await
            .queue
            .iter()
            .filter_map(|text| DeviceCommand::parse_any(text))
            .collect()
    }

    async fn ensure_before_listen(&self) {
        if let Err(e) = self.ensure_connection().await {
            warn!("[连接管理] 注册监听器前建立连接失败，监听器仍会注册: {}", e);
        }
    }

    fn take_reader_task(&self) -> Option<JoinHandle<()>> {
        self.inner.reader_task.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn spawn_reader(&self, receiver: ClientReceiver, epoch: u64) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(run_reader(weak, receiver, epoch));
        let previous = self
            .inner
            .reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// 按 FIFO 顺序写出队列中的帧；写出失败时该帧放回队首并丢弃连接。
    async fn flush_queue(&self, link: &mut Link) -> Result<(), PanelError> {
        let mut flushed = 0usize;
        while link.state == ConnectionState::Open {
            let Some(frame) = link.queue.pop_front() else {
                break;
            };
            let Some(sink) = link.sink.as_mut() else {
                link.queue.push_front(frame);
                break;
            };
            if let Err(e) = transport::send_text(sink, frame.clone()).await {
                warn!("[连接管理] 清空发送队列时写出失败，剩余 {} 帧保留: {}", link.queue.len() + 1, e);
                link.queue.push_front(frame);
                self.drop_link(link);
                return Err(PanelError::Send(e));
            }
            flushed += 1;
        }
        if flushed > 0 {
            debug!("[连接管理] 已按顺序写出 {} 个排队帧。", flushed);
        }
        Ok(())
    }

    /// 写出失败后放弃当前连接：丢弃发送端并停止其读取任务，旧套接字上的帧不再分发。
    fn drop_link(&self, link: &mut Link) {
        link.sink = None;
        link.state = ConnectionState::Closed;
        link.epoch += 1;
        if let Some(handle) = self.take_reader_task() {
            handle.abort();
        }
    }
}

impl Inner {
    fn handle_incoming_text(&self, text: &str) -> usize {
        match InboundFrame::parse(text) {
            Ok(frame) => {
                trace!("[连接管理] 收到 {} 帧", frame.tag);
                self.registry.dispatch(&frame.tag, &frame.payload)
            }
            Err(e) => {
                warn!("[连接管理] 丢弃无法解析的入站帧: {} (原始文本: '{}')", e, text);
                0
            }
        }
    }

    /// 读取任务退出：若仍代表当前连接，则清理发送端并回到 `Closed`。
    async fn on_transport_closed(&self, epoch: u64) {
        let mut link = self.link.lock().await;
        if link.epoch == epoch {
            link.sink = None;
            link.state = ConnectionState::Closed;
            info!("[连接管理] WebSocket 连接已断开 (第 {} 代)，将在下次使用时重连。", epoch);
        } else {
            debug!("[连接管理] 第 {} 代连接的读取任务结束，连接已被替换。", epoch);
        }
    }
}

async fn run_reader(weak: Weak<Inner>, mut receiver: ClientReceiver, epoch: u64) {
    loop {
        match transport::receive_text(&mut receiver).await {
            Some(Ok(text)) => {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.handle_incoming_text(&text);
            }
            Some(Err(e)) if e.is_connection_lost() => {
                warn!("[连接管理] 读取时连接中断: {}", e);
                break;
            }
            Some(Err(e)) => {
                warn!("[连接管理] 丢弃无法处理的入站消息: {}", e);
            }
            None => break,
        }
    }
    if let Some(inner) = weak.upgrade() {
        inner.on_transport_closed(epoch).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::ManualReachability;
    use std::sync::atomic::AtomicUsize;

    fn offline_service() -> (SocketService, Arc<ManualReachability>) {
        let reachability = Arc::new(ManualReachability::new(false));
        // 端口 9 (discard) 上不会有 WebSocket 服务；离线时也不会真正去连
        let service = SocketService::new("ws://127.0.0.1:9", reachability.clone());
        (service, reachability)
    }

    #[tokio::test]
    async fn test_send_while_offline_queues_without_transport() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (service, _reachability) = offline_service();

        let first = service
            .send_message(DeviceCommand::new(common_models::enums::CommandKind::System, "version"))
            .await
            .expect("离线发送不应失败");
        let second = service.send_message(serde_json::json!({"type": "log"})).await.unwrap();
        let third = service.send_message("raw text").await.unwrap();

        assert_eq!((first, second, third), (SendOutcome::Queued, SendOutcome::Queued, SendOutcome::Queued));
        assert_eq!(service.queued_len().await, 3);
        assert_eq!(service.state().await, ConnectionState::Closed);
        assert_eq!(service.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frames_never_reach_listeners() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (service, _reachability) = offline_service();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in_cb = hits.clone();
        service
            .on_message(("system", "wifi"), move |_p| {
                hits_in_cb.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        for text in ["{not json", "", "42", r#"{"event":"system"}"#, r#"["system","wifi"]"#] {
            assert_eq!(service.handle_incoming_text(text), 0);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert_eq!(service.handle_incoming_text(r#"{"event":"system","action":"wifi","status":"success"}"#), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_payload_has_envelope_stripped() {
        let (service, _reachability) = offline_service();
        let seen: Arc<StdMutex<Vec<Payload>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_in_cb = seen.clone();
        let id = service
            .on_message(("log", "debug"), move |p| seen_in_cb.lock().unwrap().push(p.clone()))
            .await;

        service.handle_incoming_text(r#"{"event":"log","action":"debug","status":"success","details":"true"}"#);
        let payloads = seen.lock().unwrap().clone();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].get("event").is_none() && payloads[0].get("action").is_none());
        assert_eq!(payloads[0].details_str(), Some("true"));

        assert!(service.remove_listener(("log", "debug"), id));
        assert!(!service.remove_listener(("log", "debug"), id));
        assert_eq!(service.handle_incoming_text(r#"{"event":"log","action":"debug"}"#), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_when_never_connected() {
        let (service, _reachability) = offline_service();
        service.disconnect().await;
        service.disconnect().await;
        assert_eq!(service.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_error_and_resets_state() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (service, _reachability) = offline_service();
        let result = service.connect_to("not-a-url").await;
        assert!(matches!(result, Err(PanelError::Connect(_))));
        assert_eq!(service.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_send_queues_when_online_connect_fails() {
        let _ = env_logger::builder().is_test(true).try_init();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let service = SocketService::new(format!("ws://{}", addr), Arc::new(ManualReachability::new(true)));
        let outcome = service.send_message("frame").await.expect("连接失败时发送也不应返回错误");
        assert_eq!(outcome, SendOutcome::Queued);
        assert_eq!(service.queued_len().await, 1);
        assert_eq!(service.state().await, ConnectionState::Closed);
    }

    async fn wait_for_hits(hits: &AtomicUsize, expected: usize) -> bool {
        for _ in 0..500 {
            if hits.load(Ordering::SeqCst) >= expected {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_dropped_link_stops_reading_old_socket() {
        let _ = env_logger::builder().is_test(true).try_init();
        let sim = device_simulator::spawn("127.0.0.1:0", device_simulator::device::DeviceState::default())
            .await
            .expect("启动模拟器失败");
        let reachability = Arc::new(ManualReachability::new(false));
        let service = SocketService::new(sim.url(), reachability.clone());

        let greetings = Arc::new(AtomicUsize::new(0));
        let greetings_in_cb = greetings.clone();
        service
            .on_message(("system", "init"), move |_p| {
                greetings_in_cb.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        let lines = Arc::new(AtomicUsize::new(0));
        let lines_in_cb = lines.clone();
        service
            .on_message(("serial", "incoming"), move |_p| {
                lines_in_cb.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        reachability.set_online(true);
        service.connect().await.expect("连接模拟器失败");
        assert!(wait_for_hits(&greetings, 1).await, "应收到设备问候");

        sim.push_serial_line("before");
        assert!(wait_for_hits(&lines, 1).await);

        {
            let mut link = service.inner.link.lock().await;
            service.drop_link(&mut link);
        }
        assert!(service.inner.reader_task.lock().unwrap().is_none());
        assert_eq!(service.state().await, ConnectionState::Closed);

        sim.push_serial_line("after");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(lines.load(Ordering::SeqCst), 1, "被放弃的连接上的帧不应再分发");
    }
}
