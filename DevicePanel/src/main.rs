// DevicePanel/src/main.rs

//! `device_panel` 命令行前端。
//!
//! 用法示例：
//!   device_panel status
//!   device_panel --url ws://192.168.4.1:80 wifi-scan
//!   device_panel wifi-connect --ssid Werkstatt --password geheim
//!   device_panel logging on
//!   device_panel serial --baud 115200 --send "AT" --listen-ms 2000

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn, LevelFilter};

use device_panel::config::{default_config_path, init_app_config, AppConfig};
use device_panel::reachability::ManualReachability;
use device_panel::services::{logging, serial, status, system, wlan, PanelContext};

/// 设备控制面板：通过 WebSocket 查询与控制设备。
#[derive(Parser)]
#[command(name = "device_panel", version, about)]
struct Cli {
    /// 设备 WebSocket 地址，覆盖配置文件与环境变量。
    #[arg(long, global = true)]
    url: Option<String>,

    /// 配置文件路径 (默认 ./config/app_settings.json)。
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 视为离线：不发起任何连接，指令只进入发送队列。
    #[arg(long, global = true)]
    offline: bool,

    /// 以 JSON 输出结果。
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn enabled(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[derive(Subcommand)]
enum Command {
    /// 刷新并显示全部系统状态。
    Status,
    /// 扫描周围的 WLAN 网络。
    WifiScan,
    /// 列出设备上保存的 WLAN 网络。
    WifiList,
    /// 开启或关闭 WLAN。
    WifiPower { state: Switch },
    /// 连接 WLAN 网络。
    WifiConnect {
        #[arg(long)]
        ssid: String,
        /// 省略时连接已保存的网络。
        #[arg(long)]
        password: Option<String>,
    },
    /// 开启或关闭文件日志。
    Logging { state: Switch },
    /// 列出设备上的日志文件。
    LogFiles,
    /// 查询固件版本。
    Version,
    /// 设置串口波特率，可选发送一行并打印收到的数据。
    Serial {
        #[arg(long)]
        baud: u32,
        #[arg(long)]
        send: Option<String>,
        /// 发送后等待串口数据的时间 (毫秒)。
        #[arg(long, default_value_t = 1000)]
        listen_ms: u64,
        /// 结束时关闭串口。
        #[arg(long)]
        close: bool,
    },
}

fn init_logger(config: &AppConfig) {
    let level = config.log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init();
    info!("[主程序] 日志系统已初始化，级别: {}", level);
}

fn print_value<T: serde::Serialize + std::fmt::Debug>(as_json: bool, value: &T) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{:#?}", value);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = init_app_config(&config_path);
    if let Some(url) = &cli.url {
        config.ws_url = url.clone();
        config.validate().context("命令行指定的设备地址无效")?;
    }
    init_logger(&config);

    let reachability = Arc::new(ManualReachability::new(!cli.offline));
    let ctx = PanelContext::from_config(&config, reachability);
    info!("[主程序] 设备地址: {}", ctx.socket.url());

    let outcome = run(&ctx, &cli).await;
    let queued = ctx.socket.queued_len().await;
    if queued > 0 {
        warn!("[主程序] 退出时仍有 {} 条指令未发送。", queued);
    }
    ctx.socket.disconnect().await;
    outcome
}

async fn run(ctx: &PanelContext, cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Status => {
            let _pushes = status::track_device_pushes(ctx).await;
            let report = status::refresh_system_status(ctx).await?;
            if report.skipped_offline {
                println!("离线：未刷新。");
            }
            for (feature, error) in &report.failures {
                eprintln!("{}: {}", feature, error);
            }
            print_value(cli.json, &*ctx.state.read().await)?;
        }
        Command::WifiScan => print_value(cli.json, &wlan::scan_networks(ctx).await?)?,
        Command::WifiList => print_value(cli.json, &wlan::saved_networks(ctx).await?)?,
        Command::WifiPower { state } => {
            wlan::set_enabled(ctx, state.enabled()).await?;
            print_value(cli.json, &ctx.state.read().await.wlan)?;
        }
        Command::WifiConnect { ssid, password } => {
            wlan::connect_network(ctx, ssid, password.as_deref()).await?;
            println!("已连接到 {}", ssid);
        }
        Command::Logging { state } => {
            let enabled = logging::set_enabled(ctx, state.enabled()).await?;
            print_value(cli.json, &enabled)?;
        }
        Command::LogFiles => print_value(cli.json, &logging::list_files(ctx).await?)?,
        Command::Version => println!("{}", system::fetch_version(ctx).await?),
        Command::Serial { baud, send, listen_ms, close } => {
            let details = serial::set_baud_rate(ctx, *baud).await?;
            print_value(cli.json, &details)?;
            if let Some(line) = send {
                let _incoming = serial::subscribe_incoming(ctx, |line| println!("< {}", line)).await;
                let ack = serial::send_line(ctx, line).await?;
                info!("[主程序] 设备确认: {}", ack);
                tokio::time::sleep(Duration::from_millis(*listen_ms)).await;
            }
            if *close {
                serial::disconnect(ctx).await?;
            }
        }
    }
    Ok(())
}
