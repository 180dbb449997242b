// DevicePanel/tests/device_integration_test.rs

//! 面板与本地模拟器之间的端到端测试。

use std::sync::Arc;
use std::time::Duration;

use common_models::enums::CommandKind;
use common_models::ws_payloads::{DeviceCommand, LegacyCommand, TAG_SERIAL_STATUS, TAG_SYSTEM_WIFI};
use device_panel::config::AppConfig;
use device_panel::reachability::{AlwaysOnline, ManualReachability, Reachability};
use device_panel::services::{logging, serial, status, wlan, PanelContext};
use device_panel::ws_client::{ConnectionState, RequestSpec, SendOutcome, Verdict};
use device_simulator::device::DeviceState;
use device_simulator::{spawn, SimulatorHandle};
use rust_websocket_utils::message::Payload;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn start_simulator() -> SimulatorHandle {
    spawn("127.0.0.1:0", DeviceState::default()).await.expect("启动模拟器失败")
}

fn context_for(sim: &SimulatorHandle, reachability: Arc<dyn Reachability>) -> PanelContext {
    let config = AppConfig {
        ws_url: sim.url(),
        ..AppConfig::default()
    };
    PanelContext::from_config(&config, reachability)
}

async fn wait_for_state(ctx: &PanelContext, expected: ConnectionState) -> bool {
    for _ in 0..500 {
        if ctx.socket.state().await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_queued_frames_are_flushed_in_order_after_connect() {
    init_test_logger();
    let sim = start_simulator().await;
    let reachability = Arc::new(ManualReachability::new(false));
    let ctx = context_for(&sim, reachability.clone());

    let commands: Vec<DeviceCommand> = ["status", "list", "scan"]
        .iter()
        .map(|key| DeviceCommand::new(CommandKind::System, "wifi").with_key(*key))
        .collect();
    for command in &commands {
        assert_eq!(ctx.socket.send_message(command.clone()).await.unwrap(), SendOutcome::Queued);
    }
    assert_eq!(ctx.socket.queued_len().await, 3);
    assert_eq!(sim.accepted_connections(), 0, "离线时不应发起连接");

    reachability.set_online(true);
    ctx.socket.connect().await.expect("连接模拟器失败");
    assert_eq!(ctx.socket.queued_len().await, 0);

    assert!(sim.wait_until(Duration::from_secs(5), |s| s.received_frames().len() == 3).await);
    assert_eq!(sim.received_commands(), commands);
}

#[tokio::test]
async fn test_request_issued_offline_resolves_after_reconnect() {
    init_test_logger();
    let sim = start_simulator().await;
    let reachability = Arc::new(ManualReachability::new(false));
    let ctx = context_for(&sim, reachability.clone());

    let (status, ()) = tokio::join!(wlan::fetch_status(&ctx), async {
        // 指令已排队、监听器已注册后才恢复网络
        while ctx.socket.listener_count(TAG_SYSTEM_WIFI) == 0 || ctx.socket.queued_len().await == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(sim.accepted_connections(), 0);
        reachability.set_online(true);
        ctx.socket.connect().await.expect("连接模拟器失败");
    });

    let status = status.expect("连接在超时前恢复，请求应完成");
    assert!(status.enabled && status.connected);
    assert_eq!(ctx.socket.total_listeners(), 0, "请求结束后不应残留监听器");
    assert_eq!(ctx.socket.queued_len().await, 0);
    assert_eq!(ctx.socket.connections_opened(), 1);

    let commands = sim.received_commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].key.as_deref(), Some("status"));
    assert!(commands[0].id.is_some(), "排队的指令应保留请求标识");
}

#[tokio::test]
async fn test_concurrent_connects_open_a_single_connection() {
    init_test_logger();
    let sim = start_simulator().await;
    let ctx = context_for(&sim, Arc::new(AlwaysOnline));

    let (a, b) = tokio::join!(ctx.socket.connect(), ctx.socket.connect());
    a.unwrap();
    b.unwrap();
    ctx.socket.connect().await.unwrap();
    ctx.socket.ensure_connection().await.unwrap();

    assert_eq!(ctx.socket.connections_opened(), 1);
    assert!(sim.wait_until(Duration::from_secs(5), |s| s.accepted_connections() == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sim.accepted_connections(), 1);
}

#[tokio::test]
async fn test_refresh_system_status_against_simulator() {
    init_test_logger();
    let sim = start_simulator().await;
    sim.update_device(|device| device.file_logging = true).await;
    let ctx = context_for(&sim, Arc::new(AlwaysOnline));

    let report = status::refresh_system_status(&ctx).await.expect("刷新失败");
    assert!(report.is_complete(), "存在失败项: {:?}", report.failures);

    let state = ctx.state.read().await;
    assert!(state.wlan.enabled && state.wlan.connected);
    assert!(state.logging.enabled);
    assert_eq!(state.version.value, "1.0.0-sim");
    assert!(state.serial.available);
    assert_eq!(state.serial.baud_rate, 115200);
    drop(state);

    assert_eq!(ctx.socket.total_listeners(), 0, "所有请求结束后不应残留监听器");
}

#[tokio::test]
async fn test_wlan_flow_against_simulator() {
    init_test_logger();
    let sim = start_simulator().await;
    let ctx = context_for(&sim, Arc::new(AlwaysOnline));

    let visible = wlan::scan_networks(&ctx).await.unwrap();
    assert_eq!(visible.len(), 3);

    wlan::connect_network(&ctx, "Lager", Some("geheim")).await.unwrap();
    let saved = wlan::saved_networks(&ctx).await.unwrap();
    assert!(saved.iter().any(|n| n.ssid == "Lager"));
    assert_eq!(ctx.state.read().await.wlan.saved_networks, saved);

    let err = wlan::connect_network(&ctx, "Nirgendwo", None).await.unwrap_err();
    assert!(err.to_string().contains("No saved network in range"), "实际错误: {}", err);

    wlan::set_enabled(&ctx, false).await.unwrap();
    let status = wlan::fetch_status(&ctx).await.unwrap();
    assert!(!status.enabled && !status.connected);
    assert!(!sim.device().await.wlan_enabled);
}

#[tokio::test]
async fn test_logging_toggle_and_file_list() {
    init_test_logger();
    let sim = start_simulator().await;
    let ctx = context_for(&sim, Arc::new(AlwaysOnline));

    assert!(logging::set_enabled(&ctx, true).await.unwrap());
    assert!(sim.device().await.file_logging);
    assert!(!logging::set_enabled(&ctx, false).await.unwrap());

    let files = logging::list_files(&ctx).await.unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|f| f.name.starts_with("log_")));
}

#[tokio::test]
async fn test_serial_session_against_simulator() {
    init_test_logger();
    let sim = start_simulator().await;
    let ctx = context_for(&sim, Arc::new(AlwaysOnline));

    let details = serial::set_baud_rate(&ctx, 9600).await.unwrap();
    assert_eq!(details.baud_rate, 9600);
    assert!(ctx.state.read().await.serial.connected);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let guard = serial::subscribe_incoming(&ctx, move |line| {
        let _ = tx.send(line);
    })
    .await;

    let ack = serial::send_line(&ctx, "AT\n").await.unwrap();
    assert_eq!(ack, "AT\r\n");
    let echoed = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(echoed, "echo: AT");

    sim.push_serial_line("READY");
    let pushed = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(pushed, "READY");

    drop(guard);
    serial::disconnect(&ctx).await.unwrap();
    assert!(!ctx.state.read().await.serial.connected);
    assert_eq!(ctx.socket.total_listeners(), 0);
}

#[tokio::test]
async fn test_legacy_serial_command_is_answered() {
    init_test_logger();
    let sim = start_simulator().await;
    let ctx = context_for(&sim, Arc::new(AlwaysOnline));
    ctx.socket.connect().await.unwrap();

    let listener = ctx.socket.clone();
    let (result, sent) = tokio::join!(
        listener.request(RequestSpec::listen(("serial", "set"), Duration::from_secs(5)), |p: &Payload| {
            Verdict::on_success(p, |p| Ok(p.details_str().unwrap_or_default().to_string()))
        }),
        async {
            // 等监听器注册后再发送
            while ctx.socket.listener_count(("serial", "set")) == 0 {
                tokio::task::yield_now().await;
            }
            ctx.socket
                .send_message(LegacyCommand {
                    command: "serial".to_string(),
                    setting: "set".to_string(),
                    value: Some("19200".into()),
                })
                .await
        }
    );
    assert_eq!(sent.unwrap(), SendOutcome::Sent);
    assert_eq!(result.unwrap(), "19200");
    assert_eq!(sim.device().await.baud_rate, 19200);
    assert_eq!(ctx.socket.listener_count(TAG_SERIAL_STATUS), 0);
}

#[tokio::test]
async fn test_reconnects_after_device_drops_connection() {
    init_test_logger();
    let sim = start_simulator().await;
    let ctx = context_for(&sim, Arc::new(AlwaysOnline));
    ctx.socket.connect().await.unwrap();
    assert!(wait_for_state(&ctx, ConnectionState::Open).await);

    sim.kick_clients();
    assert!(wait_for_state(&ctx, ConnectionState::Closed).await, "连接断开后状态应回到 Closed");

    // 下一次请求按需重连
    let status = wlan::fetch_status(&ctx).await.expect("重连后请求失败");
    assert!(status.enabled);
    assert_eq!(ctx.socket.connections_opened(), 2);
    assert!(sim.wait_until(Duration::from_secs(5), |s| s.accepted_connections() == 2).await);
}

#[tokio::test]
async fn test_connect_failure_is_reported_and_frames_stay_queued() {
    init_test_logger();
    let sim = start_simulator().await;
    let url = sim.url();
    drop(sim);
    // 等待监听任务真正退出
    tokio::time::sleep(Duration::from_millis(50)).await;

    let config = AppConfig {
        ws_url: url,
        ..AppConfig::default()
    };
    let ctx = PanelContext::from_config(&config, Arc::new(AlwaysOnline));
    let err = status::refresh_system_status(&ctx).await.unwrap_err();
    assert!(matches!(err, device_panel::error::PanelError::Connect(_)));
    assert_eq!(ctx.socket.state().await, ConnectionState::Closed);

    let outcome = ctx
        .socket
        .send_message(DeviceCommand::new(CommandKind::System, "version").with_key("get"))
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Queued);
    assert_eq!(ctx.socket.queued_len().await, 1);
}
