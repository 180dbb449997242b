// rust_websocket_utils/src/client/transport.rs

//! WebSocket 客户端传输层。
//!
//! 提供建立连接 (`connect_client`)、发送文本帧 (`send_text`)、关闭发送端 (`close_sink`)
//! 以及接收文本帧 (`receive_text`) 的函数。上层的连接管理 (状态机、发送队列、分发) 不在本模块中，
//! 本模块只负责把 `tokio-tungstenite` 的流/汇包装成以文本为单位的收发操作。

use futures_util::{
    stream::{SplitSink, SplitStream}, // 用于将 WebSocket 流拆分为发送端和接收端
    Sink, SinkExt, Stream, StreamExt,
};
use log::{debug, error, info};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    tungstenite::Error as TungsteniteError,
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::error::WsError;

/// 客户端 WebSocket 流的类型别名。
pub type ClientWsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
/// 客户端发送端。
pub type ClientSink = SplitSink<ClientWsStream, Message>;
/// 客户端接收端。
pub type ClientReceiver = SplitStream<ClientWsStream>;

/// 一个已建立的客户端连接，已拆分为发送端与接收端。
pub struct ClientConnection {
    pub ws_sender: ClientSink,
    pub ws_receiver: ClientReceiver,
}

impl ClientConnection {
    /// 发送一条文本帧。
    pub async fn send_text(&mut self, text: String) -> Result<(), WsError> {
        send_text(&mut self.ws_sender, text).await
    }

    /// 拆分为 `(发送端, 接收端)`，便于把接收端交给独立的读取任务。
    pub fn split(self) -> (ClientSink, ClientReceiver) {
        (self.ws_sender, self.ws_receiver)
    }
}

/// 连接到指定的 WebSocket URL。
///
/// URL 先经过 `url` crate 校验，非法时返回 `WsError::InvalidUrl` 而不发起任何网络操作。
pub async fn connect_client(url_str: &str) -> Result<ClientConnection, WsError> {
    info!("客户端：开始尝试连接到 WebSocket 服务器，URL: {}", url_str);
    let parsed_url = Url::parse(url_str)
        .map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", url_str, e)))?;
    if !matches!(parsed_url.scheme(), "ws" | "wss") {
        return Err(WsError::InvalidUrl(format!(
            "不支持的 URL 协议 '{}' (仅支持 ws/wss)",
            parsed_url.scheme()
        )));
    }

    match connect_async(parsed_url.as_str()).await {
        Ok((ws_stream, response)) => {
            info!("客户端：已成功连接到 {} (HTTP 状态码: {})", url_str, response.status());
            let (ws_sender, ws_receiver) = ws_stream.split();
            Ok(ClientConnection { ws_sender, ws_receiver })
        }
        Err(e) => {
            error!("客户端：连接到 {} 失败，错误: {}", url_str, e);
            Err(WsError::WebSocketProtocolError(e))
        }
    }
}

/// 通过任意 WebSocket 发送端写入一条文本帧。
pub async fn send_text<S>(sink: &mut S, text: String) -> Result<(), WsError>
where
    S: Sink<Message, Error = TungsteniteError> + Unpin,
{
    debug!("传输层：发送文本帧: {}", text);
    sink.send(Message::Text(text)).await?;
    Ok(())
}

/// 发送 Close 帧并关闭发送端。对已关闭的连接调用不视为错误。
pub async fn close_sink<S>(sink: &mut S) -> Result<(), WsError>
where
    S: Sink<Message, Error = TungsteniteError> + Unpin,
{
    match sink.close().await {
        Ok(()) | Err(TungsteniteError::ConnectionClosed) | Err(TungsteniteError::AlreadyClosed) => Ok(()),
        Err(e) => Err(WsError::WebSocketProtocolError(e)),
    }
}

/// 从任意 WebSocket 接收端读取下一条文本帧。
///
/// - Ping/Pong 与原始 Frame 被跳过 (控制帧由底层库自动应答)。
/// - 二进制帧返回 `Some(Err(..))`，设备协议只使用文本帧。
/// - 收到 Close 帧、连接已关闭或流结束时返回 `None`。
pub async fn receive_text<S>(ws_receiver: &mut S) -> Option<Result<String, WsError>>
where
    S: Stream<Item = Result<Message, TungsteniteError>> + Unpin,
{
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!("传输层：收到文本帧: '{}'", text);
                break Some(Ok(text));
            }
            Some(Ok(Message::Binary(bin))) => {
                debug!("传输层：收到二进制帧，长度: {} 字节", bin.len());
                break Some(Err(WsError::Message("收到了非预期的 WebSocket 二进制消息".to_string())));
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                // 控制帧，继续等待
            }
            Some(Ok(Message::Close(close_frame))) => {
                debug!("传输层：收到 Close 控制帧: {:?}", close_frame);
                break None;
            }
            Some(Err(TungsteniteError::ConnectionClosed)) | Some(Err(TungsteniteError::AlreadyClosed)) => {
                debug!("传输层：连接已关闭。");
                break None;
            }
            Some(Err(e)) => {
                error!("传输层：从 WebSocket 流接收消息时发生底层错误: {}", e);
                break Some(Err(WsError::WebSocketProtocolError(e)));
            }
            None => {
                debug!("传输层：WebSocket 接收流已结束。");
                break None;
            }
        }
    }
}
