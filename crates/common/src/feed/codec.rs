/// 帧解码辅助函数

use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::{Error, Result};

/// 解码后的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// 文本负载（待解析为 JSON）
    Text(String),

    /// 对端关闭，附带关闭原因
    Close(Option<String>),

    /// 控制帧等无需上报的帧
    Ignored,
}

/// 解码 WebSocket 消息
pub fn decode(ws_msg: WsMessage) -> Result<Frame> {
    match ws_msg {
        WsMessage::Text(text) => Ok(Frame::Text(text)),
        WsMessage::Binary(data) => String::from_utf8(data)
            .map(Frame::Text)
            .map_err(|e| Error::InvalidArgument(format!("二进制帧不是有效的 UTF-8: {}", e))),
        WsMessage::Close(frame) => Ok(Frame::Close(frame.map(|f| f.reason.to_string()))),
        _ => Ok(Frame::Ignored),
    }
}
