// rust_websocket_utils/src/server/mod.rs

//! WebSocket 服务端模块。
//!
//! 提供监听、握手并把每个新连接交给回调处理的最小传输层。设备模拟器与集成测试使用它扮演设备端。

pub mod transport;
