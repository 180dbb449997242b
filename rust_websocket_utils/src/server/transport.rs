// rust_websocket_utils/src/server/transport.rs

use std::net::SocketAddr;

use log::{error, info};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_tungstenite::{accept_async, WebSocketStream};

use crate::error::WsError;

/// 服务端 WebSocket 流的类型别名。
pub type WsStream = WebSocketStream<TcpStream>;

/// 已绑定监听地址的服务端传输层。
///
/// 绑定与服务分为两步，调用方可以在开始接受连接之前读取实际端口 (绑定 `:0` 时尤其需要)。
pub struct ServerTransport {
    listener: TcpListener,
}

impl ServerTransport {
    /// 绑定监听地址。
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, WsError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// 实际监听地址。
    pub fn local_addr(&self) -> Result<SocketAddr, WsError> {
        Ok(self.listener.local_addr()?)
    }

    /// 循环接受连接。每个连接在独立任务中完成握手后交给 `on_connect`。
    ///
    /// 单个连接的握手失败只记录日志，不会终止服务。
    pub async fn serve<F, Fut>(self, on_connect: F) -> Result<(), WsError>
    where
        F: Fn(WsStream, SocketAddr) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        info!("WebSocket 服务器正在监听地址: {}", self.local_addr()?);
        loop {
            match self.listener.accept().await {
                Ok((tcp_stream, peer_addr)) => {
                    info!("从 {} 接受了新的 TCP 连接", peer_addr);
                    let on_connect_callback = on_connect.clone();
                    tokio::spawn(async move {
                        match accept_async(tcp_stream).await {
                            Ok(ws_stream) => {
                                info!("与 {} 的 WebSocket 握手成功", peer_addr);
                                on_connect_callback(ws_stream, peer_addr).await;
                            }
                            Err(e) => {
                                error!("与 {} 的 WebSocket 握手失败: {}", peer_addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("接受 TCP 连接失败: {}。服务器将继续运行。", e);
                }
            }
        }
    }
}
