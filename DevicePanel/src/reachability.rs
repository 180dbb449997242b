// DevicePanel/src/reachability.rs

//! 网络可达性判断。
//!
//! 可达性只是建议性的：报告在线并不保证连接一定成功，连接失败仍以错误形式返回给调用方；
//! 报告离线时，连接管理器不会发起任何传输层操作。

use std::sync::atomic::{AtomicBool, Ordering};

/// 网络可达性来源。
pub trait Reachability: Send + Sync {
    /// 当前是否认为网络可达。
    fn is_online(&self) -> bool;
}

/// 始终报告在线。
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl Reachability for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// 可由外部切换的可达性标志 (命令行 `--offline` 与测试使用)。
#[derive(Debug)]
pub struct ManualReachability {
    online: AtomicBool,
}

impl ManualReachability {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ManualReachability {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Reachability for ManualReachability {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
