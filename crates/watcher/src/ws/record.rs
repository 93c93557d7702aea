/// 连接记录
///
/// 每个实体一条记录，持有当前传输会话与重连簿记

use chrono::{DateTime, Utc};
use common::{ConnectionStatus, EntityId};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::reconnect::ScheduledTask;
use super::transport::Transport;

type MessageCallback = Arc<dyn Fn(&Value, &EntityId) + Send + Sync>;
type LifecycleCallback = Arc<dyn Fn(&EntityId) + Send + Sync>;

/// 用户回调，在记录的整个生命周期内复用（包括每次重连）
///
/// 回调在管理器任务中同步执行，不应阻塞
#[derive(Clone, Default)]
pub struct Callbacks {
    on_message: Option<MessageCallback>,
    on_open: Option<LifecycleCallback>,
    on_close: Option<LifecycleCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(mut self, f: impl Fn(&Value, &EntityId) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_open(mut self, f: impl Fn(&EntityId) + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    pub fn on_close(mut self, f: impl Fn(&EntityId) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    pub(crate) fn message(&self, payload: &Value, entity_id: &EntityId) {
        if let Some(f) = &self.on_message {
            f(payload, entity_id);
        }
    }

    pub(crate) fn opened(&self, entity_id: &EntityId) {
        if let Some(f) = &self.on_open {
            f(entity_id);
        }
    }

    pub(crate) fn closed(&self, entity_id: &EntityId) {
        if let Some(f) = &self.on_close {
            f(entity_id);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_message", &self.on_message.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// 记录状态机
///
/// `Idle → Connecting → Open → Closed`，`Closed` 经重连策略回到
/// `Connecting`，预算耗尽则进入终态 `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ConnectionState {
    /// 映射为三值的连接状态查询结果
    pub fn status(&self) -> ConnectionStatus {
        match self {
            Self::Open => ConnectionStatus::Connected,
            _ => ConnectionStatus::Connecting,
        }
    }
}

/// 连接信息快照
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub entity_id: EntityId,
    pub state: ConnectionState,
    pub reconnect_count: u32,
    pub retry_pending: bool,
    pub connected_since: Option<DateTime<Utc>>,
}

pub(crate) struct ConnectionRecord {
    pub entity_id: EntityId,
    transport: Option<Box<dyn Transport>>,
    pub session: u64,
    /// 当前会话是否已上报过关闭
    session_closed: bool,
    pub state: ConnectionState,
    pub reconnect_count: u32,
    pub callbacks: Callbacks,
    retry: Option<ScheduledTask>,
    pub connected_since: Option<DateTime<Utc>>,
}

impl ConnectionRecord {
    pub fn new(entity_id: EntityId, callbacks: Callbacks) -> Self {
        Self {
            entity_id,
            transport: None,
            session: 0,
            session_closed: false,
            state: ConnectionState::Idle,
            reconnect_count: 0,
            callbacks,
            retry: None,
            connected_since: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// 换上新会话，旧会话随之关闭
    pub fn attach(&mut self, session: u64, transport: Box<dyn Transport>) {
        self.close_transport();
        self.transport = Some(transport);
        self.session = session;
        self.session_closed = false;
        self.state = ConnectionState::Connecting;
    }

    /// 标记当前会话已打开
    pub fn mark_open(&mut self) {
        self.session_closed = false;
        self.state = ConnectionState::Open;
    }

    /// 标记当前会话已关闭，同一会话重复关闭时返回 false
    pub fn mark_closed(&mut self) -> bool {
        if self.session_closed {
            return false;
        }
        self.session_closed = true;
        self.state = ConnectionState::Closed;
        true
    }

    pub fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    /// 登记重连任务，至多保留一个
    pub fn set_retry(&mut self, task: ScheduledTask) {
        self.cancel_retry();
        self.retry = Some(task);
    }

    pub fn cancel_retry(&mut self) {
        if let Some(task) = self.retry.take() {
            task.cancel();
        }
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            entity_id: self.entity_id.clone(),
            state: self.state,
            reconnect_count: self.reconnect_count,
            retry_pending: self.retry_pending(),
            connected_since: self.connected_since,
        }
    }
}

impl Drop for ConnectionRecord {
    fn drop(&mut self) {
        self.cancel_retry();
        self.close_transport();
    }
}
