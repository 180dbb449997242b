// DevicePanel/src/services/mod.rs

//! 各功能的请求助手。
//!
//! 每个助手都建立在 [`SocketService::request`] 之上：先按 `status` 判断应答是否终结，
//! 成功后才写入共享状态；失败时把状态退回默认值/错误值，并把错误返回给调用方。

pub mod logging;
pub mod serial;
pub mod status;
pub mod system;
pub mod wlan;

use std::sync::Arc;

use crate::config::{AppConfig, RequestTimeouts};
use crate::reachability::Reachability;
use crate::state::{new_shared_state, SharedSystemState};
use crate::ws_client::SocketService;

/// 功能助手共用的上下文：连接服务、共享状态与超时配置。
#[derive(Clone)]
pub struct PanelContext {
    pub socket: SocketService,
    pub state: SharedSystemState,
    pub timeouts: RequestTimeouts,
}

impl PanelContext {
    pub fn new(socket: SocketService, state: SharedSystemState, timeouts: RequestTimeouts) -> Self {
        Self { socket, state, timeouts }
    }

    /// 按配置构造一套全新的上下文 (新的连接服务与默认状态)。
    pub fn from_config(config: &AppConfig, reachability: Arc<dyn Reachability>) -> Self {
        Self::new(
            SocketService::new(config.ws_url.clone(), reachability),
            new_shared_state(),
            config.timeouts,
        )
    }
}
