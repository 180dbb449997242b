use anyhow::Result;
use log::{info, LevelFilter};

use device_simulator::config::{default_config_path, load_or_create_config};
use device_simulator::device::DeviceState;
use device_simulator::server;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志记录器；RUST_LOG 可覆盖默认级别
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
    info!("[主程序] 日志系统已成功初始化 (env_logger)，默认级别: Info。");

    let mut config = load_or_create_config(&default_config_path());
    config.apply_overrides_from(|key| std::env::var(key).ok())?;
    info!(
        "[主程序] 模拟固件版本 {}，串口{}接入设备。",
        config.firmware_version,
        if config.serial_attached { "已" } else { "未" }
    );

    let device = DeviceState::from_config(&config);
    server::run(&config.bind_addr(), device).await?;
    Ok(())
}
