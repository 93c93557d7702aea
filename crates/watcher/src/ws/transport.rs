/// 传输层抽象
///
/// 管理器只通过 [`Connector`] 打开会话，会话的打开、消息、错误、关闭
/// 全部以事件形式经 [`SessionSink`] 回传，打开与关闭都不阻塞调用方

use common::feed::{self, Frame};
use common::EntityId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::manager::Input;

/// 会话上报的传输事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed(Option<String>),
}

/// 管理器内部事件
#[derive(Debug)]
pub(crate) enum ManagerEvent {
    Transport {
        entity_id: EntityId,
        session: u64,
        event: TransportEvent,
    },
    RetryDue {
        entity_id: EntityId,
        session: u64,
        attempt: u32,
    },
}

/// 会话事件回传端
#[derive(Debug, Clone)]
pub struct SessionSink {
    entity_id: EntityId,
    session: u64,
    tx: mpsc::WeakUnboundedSender<Input>,
}

impl SessionSink {
    pub(crate) fn new(
        entity_id: EntityId,
        session: u64,
        tx: mpsc::WeakUnboundedSender<Input>,
    ) -> Self {
        Self { entity_id, session, tx }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// 上报事件，管理器已退出时返回 false
    ///
    /// 回传端只持有弱引用，会话存活不会阻止管理器退出
    pub fn send(&self, event: TransportEvent) -> bool {
        let Some(tx) = self.tx.upgrade() else {
            return false;
        };
        tx.send(Input::Event(ManagerEvent::Transport {
            entity_id: self.entity_id.clone(),
            session: self.session,
            event,
        }))
        .is_ok()
    }
}

/// 一个已发起的传输会话，由连接记录独占
pub trait Transport: Send {
    /// 请求关闭会话，立即返回
    fn close(&mut self);
}

/// 会话工厂
pub trait Connector: Send + Sync + 'static {
    /// 向 `url` 发起连接，立即返回会话句柄
    fn open(&self, url: &str, sink: SessionSink) -> Box<dyn Transport>;
}

/// 基于 tokio-tungstenite 的连接器
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &str, sink: SessionSink) -> Box<dyn Transport> {
        let token = CancellationToken::new();
        tokio::spawn(run_session(url.to_string(), sink, token.clone()));
        Box::new(WsTransport { token })
    }
}

/// WebSocket 会话句柄
struct WsTransport {
    token: CancellationToken,
}

impl Transport for WsTransport {
    fn close(&mut self) {
        self.token.cancel();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// 会话任务：连接、读取帧，直到对端关闭或本地取消
async fn run_session(url: String, sink: SessionSink, token: CancellationToken) {
    let connected = tokio::select! {
        _ = token.cancelled() => {
            sink.send(TransportEvent::Closed(Some("连接被取消".to_string())));
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            // 与浏览器一致：连接失败先报告错误，再报告关闭
            sink.send(TransportEvent::Error(e.to_string()));
            sink.send(TransportEvent::Closed(None));
            return;
        }
    };

    debug!("会话已建立: entity={}, session={}", sink.entity_id(), sink.session());
    sink.send(TransportEvent::Opened);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            _ = token.cancelled() => {
                if let Err(e) = ws_sender.send(Message::Close(None)).await {
                    debug!("发送关闭帧失败: {}", e);
                }
                break Some("本地关闭".to_string());
            }
            next = ws_receiver.next() => match next {
                Some(Ok(msg)) => match feed::decode(msg) {
                    Ok(Frame::Text(text)) => {
                        if !sink.send(TransportEvent::Message(text)) {
                            break None;
                        }
                    }
                    Ok(Frame::Close(reason)) => break reason,
                    Ok(Frame::Ignored) => {}
                    Err(e) => warn!("忽略无法解码的帧: entity={}, error={}", sink.entity_id(), e),
                },
                Some(Err(e)) => {
                    sink.send(TransportEvent::Error(e.to_string()));
                    break None;
                }
                None => break None,
            }
        }
    };

    sink.send(TransportEvent::Closed(reason));
}
