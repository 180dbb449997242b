// DevicePanel/src/ws_client/request.rs

//! 通用请求/应答助手。
//!
//! 一次请求的流程：
//! 1. 为出站指令分配唯一的请求标识 (UUID v4，写入 `id` 字段)。
//! 2. 在应答标签 (以及 `also_on` 追加的标签) 上注册监听器 (由 `ListenerGuard` 持有，任何退出路径都会移除它，包括超时与 future 被取消)。
//! 3. 发送指令。连接未打开时指令进入发送队列，监听器保持注册，连接在超时前恢复仍可完成请求。
//! 4. 应答与超时竞争。
//!
//! 关联规则：应答带有 `id` 时必须与本次请求一致；不带 `id` 的应答 (不支持该字段的旧固件) 仅按标签匹配。
//! 分类器对每个匹配的帧给出 [`Verdict`]：明确的失败状态立即拒绝，不会等到超时。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use common_models::enums::ResponseStatus;
use common_models::ws_payloads::DeviceCommand;
use log::{debug, trace, warn};
use rust_websocket_utils::message::{Payload, Tag};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::connection::SocketService;
use crate::error::PanelError;

/// 分类器对单个应答帧的判断。
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T> {
    /// 该帧不是本次请求的终结应答，继续等待。
    Pending,
    /// 请求成功完成。
    Done(T),
    /// 设备明确报告失败。
    Failed(String),
}

impl<T> Verdict<T> {
    /// 标准分类：`status` 为 `error` 时失败，否则交给 `accept` 判断该帧是否终结。
    pub fn from_status<F>(payload: &Payload, accept: F) -> Self
    where
        F: FnOnce(&Payload) -> Option<T>,
    {
        if payload.status().is_some_and(|s| s.is_failure()) {
            return Verdict::Failed(failure_reason(payload));
        }
        match accept(payload) {
            Some(value) => Verdict::Done(value),
            None => Verdict::Pending,
        }
    }

    /// 只接受 `status` 为 `success` 的帧。
    pub fn on_success<F>(payload: &Payload, map: F) -> Self
    where
        F: FnOnce(&Payload) -> Result<T, String>,
    {
        match payload.status() {
            Some(ResponseStatus::Success) => match map(payload) {
                Ok(value) => Verdict::Done(value),
                Err(reason) => Verdict::Failed(reason),
            },
            Some(ResponseStatus::Error) => Verdict::Failed(failure_reason(payload)),
            _ => Verdict::Pending,
        }
    }
}

pub(crate) fn failure_reason(payload: &Payload) -> String {
    payload
        .error_text()
        .map(str::to_string)
        .unwrap_or_else(|| "设备返回了错误状态但未给出原因".to_string())
}

/// 一次请求的描述。
#[derive(Debug, Clone)]
pub struct RequestSpec {
    tag: Tag,
    /// 同样参与分类的附加应答标签。
    also: Vec<Tag>,
    command: Option<DeviceCommand>,
    timeout: Duration,
}

impl RequestSpec {
    /// 发送指令并在其默认应答标签 `(type, command)` 上等待。
    pub fn command(command: DeviceCommand, timeout: Duration) -> Self {
        let tag = Tag::from(command.response_tag());
        Self {
            tag,
            also: Vec::new(),
            command: Some(command),
            timeout,
        }
    }

    /// 不发送任何指令，只等待推送帧。
    pub fn listen(tag: impl Into<Tag>, timeout: Duration) -> Self {
        Self {
            tag: tag.into(),
            also: Vec::new(),
            command: None,
            timeout,
        }
    }

    /// 改为在另一个标签上等待应答 (例如设置波特率后等待 `serial/status`)。
    pub fn expect_on(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = tag.into();
        self
    }

    /// 额外在另一个标签上监听 (例如设备在 `serial/setBaud` 上报告拒绝)。
    /// 所有标签上的帧交给同一个分类器，先得出结论的帧决定结果。
    pub fn also_on(mut self, tag: impl Into<Tag>) -> Self {
        let tag = tag.into();
        if tag != self.tag && !self.also.contains(&tag) {
            self.also.push(tag);
        }
        self
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl SocketService {
    /// 发送请求并等待终结应答或超时。
    pub async fn request<T, F>(&self, spec: RequestSpec, classify: F) -> Result<T, PanelError>
    where
        T: Send + 'static,
        F: Fn(&Payload) -> Verdict<T> + Send + Sync + 'static,
    {
        let RequestSpec { tag, also, command, timeout } = spec;
        let request_id = command.as_ref().map(|_| Uuid::new_v4().to_string());

        let (tx, rx) = oneshot::channel::<Result<T, String>>();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let expected_id = request_id.clone();
        let tag_for_log = tag.clone();
        let handler: Arc<dyn Fn(&Payload) + Send + Sync> = Arc::new(move |payload: &Payload| {
            if let (Some(expected), Some(actual)) = (expected_id.as_deref(), payload.request_id()) {
                if expected != actual {
                    trace!("[请求助手] {} 忽略属于其他请求 ({}) 的应答", tag_for_log, actual);
                    return;
                }
            }
            let outcome = match classify(payload) {
                Verdict::Pending => return,
                Verdict::Done(value) => Ok(value),
                Verdict::Failed(reason) => Err(reason),
            };
            let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(sender) = sender {
                let _ = sender.send(outcome);
            }
        });

        let mut guards = Vec::with_capacity(1 + also.len());
        for listen_on in std::iter::once(tag.clone()).chain(also) {
            let handler = handler.clone();
            guards.push(self.subscribe(listen_on, move |payload: &Payload| handler(payload)).await);
        }

        if let Some(command) = command {
            let command = match request_id {
                Some(id) => command.with_id(id),
                None => command,
            };
            debug!("[请求助手] 发送 {} 请求 (id: {:?})", tag, command.id);
            self.send_message(command).await?;
        }

        let result = tokio::time::timeout(timeout, rx).await;
        drop(guards);

        match result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(reason))) => {
                warn!("[请求助手] 设备拒绝了 {} 请求: {}", tag, reason);
                Err(PanelError::DeviceRejected { tag, reason })
            }
            Ok(Err(_closed)) => Err(PanelError::ChannelClosed(tag)),
            Err(_elapsed) => {
                warn!("[请求助手] 等待 {} 的应答超时 ({:?})", tag, timeout);
                Err(PanelError::Timeout { tag, after: timeout })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reachability::ManualReachability;
    use common_models::enums::CommandKind;
    use common_models::ws_payloads::TAG_SYSTEM_VERSION;

    fn offline_service() -> SocketService {
        SocketService::new("ws://127.0.0.1:9", Arc::new(ManualReachability::new(false)))
    }

    fn version_spec(timeout: Duration) -> RequestSpec {
        RequestSpec::command(
            DeviceCommand::new(CommandKind::System, "version").with_key("get"),
            timeout,
        )
    }

    fn version_classifier(payload: &Payload) -> Verdict<String> {
        Verdict::on_success(payload, |p| {
            p.details_str().map(str::to_string).ok_or_else(|| "details 不是字符串".to_string())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_before_deadline_resolves_early() {
        let service = offline_service();
        let started = tokio::time::Instant::now();
        let injector = service.clone();

        let (result, ()) = tokio::join!(
            service.request(version_spec(Duration::from_secs(5)), version_classifier),
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                injector.handle_incoming_text(
                    r#"{"event":"system","action":"version","status":"success","details":"2.1.0"}"#,
                );
            }
        );

        assert_eq!(result.expect("应在超时前完成"), "2.1.0");
        assert!(started.elapsed() < Duration::from_secs(5), "请求不应等到超时");
        assert_eq!(service.listener_count(TAG_SYSTEM_VERSION), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_listener() {
        let service = offline_service();
        let result = service.request(version_spec(Duration::from_secs(5)), version_classifier).await;
        match result {
            Err(PanelError::Timeout { tag, after }) => {
                assert_eq!(tag, Tag::from(TAG_SYSTEM_VERSION));
                assert_eq!(after, Duration::from_secs(5));
            }
            other => panic!("期望超时错误，实际为: {:?}", other),
        }
        assert_eq!(service.listener_count(TAG_SYSTEM_VERSION), 0, "超时后不应遗留监听器");
        // 指令在离线状态下进入了发送队列
        assert_eq!(service.queued_len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_rejects_without_waiting() {
        let service = offline_service();
        let started = tokio::time::Instant::now();
        let injector = service.clone();

        let (result, ()) = tokio::join!(
            service.request(version_spec(Duration::from_secs(60)), version_classifier),
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                injector.handle_incoming_text(
                    r#"{"event":"system","action":"version","status":"error","error":"nicht verfügbar"}"#,
                );
            }
        );

        match result {
            Err(PanelError::DeviceRejected { reason, .. }) => assert_eq!(reason, "nicht verfügbar"),
            other => panic!("期望设备拒绝错误，实际为: {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(service.listener_count(TAG_SYSTEM_VERSION), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_request_id_is_ignored() {
        let service = offline_service();
        let injector = service.clone();

        let (result, ()) = tokio::join!(
            service.request(version_spec(Duration::from_secs(5)), version_classifier),
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                // 属于其他请求的应答被忽略
                injector.handle_incoming_text(
                    r#"{"event":"system","action":"version","status":"success","details":"wrong","id":"someone-else"}"#,
                );
                tokio::time::sleep(Duration::from_millis(5)).await;
                // 不带 id 的旧固件应答按标签接受
                injector.handle_incoming_text(
                    r#"{"event":"system","action":"version","status":"success","details":"legacy"}"#,
                );
            }
        );
        assert_eq!(result.expect("旧固件应答应被接受"), "legacy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_on_same_tag_do_not_cross_resolve() {
        let service = offline_service();
        let injector = service.clone();

        let (first, second, ()) = tokio::join!(
            service.request(version_spec(Duration::from_secs(5)), version_classifier),
            service.request(version_spec(Duration::from_secs(5)), version_classifier),
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                // 从发送队列中读出两个请求各自的 id，按相反顺序应答
                let ids: Vec<String> =
                    injector.queued_commands().await.into_iter().filter_map(|c| c.id).collect();
                assert_eq!(ids.len(), 2);
                for (index, id) in ids.iter().enumerate().rev() {
                    injector.handle_incoming_text(&format!(
                        r#"{{"event":"system","action":"version","status":"success","details":"answer-{}","id":"{}"}}"#,
                        index, id
                    ));
                }
            }
        );
        assert_eq!(first.unwrap(), "answer-0");
        assert_eq!(second.unwrap(), "answer-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_additional_tag_feeds_the_same_request() {
        let service = offline_service();
        let injector = service.clone();
        let spec = RequestSpec::command(
            DeviceCommand::new(CommandKind::Serial, "setBaud").with_value("9600"),
            Duration::from_secs(5),
        )
        .expect_on(("serial", "status"))
        .also_on(("serial", "setBaud"))
        .also_on(("serial", "status"));
        assert_eq!(spec.tag(), &Tag::from(("serial", "status")));

        let (result, ()) = tokio::join!(
            service.request(spec, |p: &Payload| Verdict::from_status(p, |_| Some(()))),
            async move {
                while injector.listener_count(("serial", "setBaud")) == 0 {
                    tokio::task::yield_now().await;
                }
                assert_eq!(injector.listener_count(("serial", "status")), 1, "重复的标签只注册一次");
                injector.handle_incoming_text(
                    r#"{"event":"serial","action":"setBaud","status":"error","error":"Ungültige Baud-Rate"}"#,
                );
            }
        );
        match result {
            Err(PanelError::DeviceRejected { tag, reason }) => {
                assert_eq!(tag, Tag::from(("serial", "status")));
                assert_eq!(reason, "Ungültige Baud-Rate");
            }
            other => panic!("期望设备拒绝错误，实际为: {:?}", other),
        }
        assert_eq!(service.total_listeners(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_frames_are_skipped() {
        let service = offline_service();
        let injector = service.clone();
        let spec = RequestSpec::listen(("system", "wifi"), Duration::from_secs(5));
        let (result, ()) = tokio::join!(
            service.request(spec, |p: &Payload| {
                Verdict::from_status(p, |p| (p.status() == Some(ResponseStatus::Scan)).then(|| 3usize))
            }),
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                injector.handle_incoming_text(r#"{"event":"system","action":"wifi","status":"list","details":[]}"#);
                injector.handle_incoming_text(r#"{"event":"system","action":"wifi","status":"scan","details":[]}"#);
            }
        );
        assert_eq!(result.unwrap(), 3);
    }
}
