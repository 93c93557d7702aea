/// 实时连接管理器
///
/// 每个实体维持一条推送连接。注册表由单个管理器任务独占，
/// 命令、会话事件与重连定时器共用同一条输入通道，
/// 管理器严格按发送顺序处理，因此不需要任何锁

use chrono::Utc;
use common::utils::endpoint_url;
use common::{ConnectionStatus, EntityId, Error, Result, StatusEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::handler;
use super::reconnect::{ReconnectDecision, ScheduledTask};
use super::record::{Callbacks, ConnectionInfo, ConnectionRecord, ConnectionState};
use super::transport::{Connector, ManagerEvent, SessionSink, Transport, TransportEvent, WsConnector};
use crate::config::ManagerConfig;
use crate::events::{DomainEvent, EventBus, EventKind, Subscription};

/// 管理器输入：句柄命令与会话/定时器事件按发送顺序排队
pub(crate) enum Input {
    Command(Command),
    Event(ManagerEvent),
}

/// 管理器命令
pub(crate) enum Command {
    Connect {
        entity_id: EntityId,
        callbacks: Callbacks,
    },
    Disconnect {
        entity_id: EntityId,
    },
    DisconnectAll {
        done: Option<oneshot::Sender<()>>,
    },
    State {
        entity_id: EntityId,
        reply: oneshot::Sender<Option<ConnectionState>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<ConnectionInfo>>,
    },
}

/// 连接管理器句柄
///
/// 由调用方创建并显式传递，克隆的句柄共享同一个管理器。
/// 最后一个句柄释放时，管理器断开所有连接后退出
#[derive(Clone)]
pub struct ConnectionManager {
    inputs: mpsc::UnboundedSender<Input>,
    events: EventBus,
}

impl ConnectionManager {
    /// 使用 WebSocket 连接器创建管理器，需要在 tokio 运行时中调用
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector::new()))
    }

    /// 使用自定义连接器创建管理器
    pub fn with_connector(config: ManagerConfig, connector: Arc<dyn Connector>) -> Self {
        let (inputs, input_rx) = mpsc::unbounded_channel();
        let events = EventBus::new(config.event_capacity);

        let actor = ManagerActor {
            config,
            connector,
            bus: events.clone(),
            registry: HashMap::new(),
            input_tx: inputs.downgrade(),
            next_session: 0,
        };
        tokio::spawn(actor.run(input_rx));

        Self { inputs, events }
    }

    /// 连接实体，立即返回；已跟踪的实体重复连接时忽略
    pub fn connect(&self, entity_id: impl Into<EntityId>, callbacks: Callbacks) {
        self.send(Command::Connect {
            entity_id: entity_id.into(),
            callbacks,
        });
    }

    /// 断开实体连接，不会触发重连
    pub fn disconnect(&self, entity_id: impl Into<EntityId>) {
        self.send(Command::Disconnect {
            entity_id: entity_id.into(),
        });
    }

    /// 断开全部连接
    pub fn disconnect_all(&self) {
        self.send(Command::DisconnectAll { done: None });
    }

    /// 断开全部连接并等待完成，用于进程退出
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|done| Command::DisconnectAll { done: Some(done) })
            .await
    }

    /// 查询连接状态
    pub async fn connection_status(&self, entity_id: impl Into<EntityId>) -> Result<ConnectionStatus> {
        let state = self.connection_state(entity_id).await?;
        Ok(state
            .map(|state| state.status())
            .unwrap_or(ConnectionStatus::Disconnected))
    }

    /// 查询记录的完整状态，未跟踪时返回 None
    pub async fn connection_state(
        &self,
        entity_id: impl Into<EntityId>,
    ) -> Result<Option<ConnectionState>> {
        let entity_id = entity_id.into();
        self.request(|reply| Command::State { entity_id, reply }).await
    }

    /// 当前已连接的实体
    pub async fn active_connections(&self) -> Result<HashSet<EntityId>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .into_iter()
            .filter(|info| info.state == ConnectionState::Open)
            .map(|info| info.entity_id)
            .collect())
    }

    /// 所有记录的快照
    pub async fn snapshot(&self) -> Result<Vec<ConnectionInfo>> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// 订阅全部领域事件
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// 订阅指定种类的领域事件
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Subscription {
        self.events.subscribe_to(kinds)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn send(&self, command: Command) {
        if self.inputs.send(Input::Command(command)).is_err() {
            warn!("连接管理器已关闭，忽略命令");
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.inputs
            .send(Input::Command(make(tx)))
            .map_err(|_| Error::ManagerClosed)?;
        rx.await.map_err(|_| Error::ManagerClosed)
    }
}

/// 管理器任务，独占注册表
struct ManagerActor {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    bus: EventBus,
    registry: HashMap<EntityId, ConnectionRecord>,
    /// 会话与定时器只持有弱引用，最后一个句柄释放后通道关闭
    input_tx: mpsc::WeakUnboundedSender<Input>,
    next_session: u64,
}

impl ManagerActor {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = inputs.recv().await {
            match input {
                Input::Command(command) => self.handle_command(command),
                Input::Event(event) => self.handle_event(event),
            }
        }

        // 所有句柄都已释放
        self.disconnect_all();
        debug!("连接管理器已退出");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { entity_id, callbacks } => self.connect(entity_id, callbacks),
            Command::Disconnect { entity_id } => self.disconnect(&entity_id),
            Command::DisconnectAll { done } => {
                self.disconnect_all();
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Command::State { entity_id, reply } => {
                let _ = reply.send(self.registry.get(&entity_id).map(|record| record.state));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.registry.values().map(ConnectionRecord::info).collect());
            }
        }
    }

    fn handle_event(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::Transport {
                entity_id,
                session,
                event,
            } => {
                if !self.is_current(&entity_id, session) {
                    // 已断开或已被新会话替换的会话，其事件一律丢弃
                    debug!("丢弃过期会话事件: entity={}, session={}, event={:?}", entity_id, session, event);
                    return;
                }
                match event {
                    TransportEvent::Opened => self.on_open(&entity_id),
                    TransportEvent::Message(text) => self.on_message(&entity_id, &text),
                    TransportEvent::Error(reason) => self.on_error(&entity_id, &reason),
                    TransportEvent::Closed(reason) => self.on_close(&entity_id, reason),
                }
            }
            ManagerEvent::RetryDue {
                entity_id,
                session,
                attempt,
            } => self.on_retry_due(&entity_id, session, attempt),
        }
    }

    fn is_current(&self, entity_id: &EntityId, session: u64) -> bool {
        self.registry
            .get(entity_id)
            .is_some_and(|record| record.session == session)
    }

    fn open_session(&mut self, entity_id: &EntityId) -> (u64, Box<dyn Transport>) {
        self.next_session += 1;
        let session = self.next_session;
        let url = endpoint_url(&self.config.base_url, entity_id);
        debug!("打开会话: entity={}, session={}, url={}", entity_id, session, url);

        let sink = SessionSink::new(entity_id.clone(), session, self.input_tx.clone());
        (session, self.connector.open(&url, sink))
    }

    fn connect(&mut self, entity_id: EntityId, callbacks: Callbacks) {
        match self.registry.get(&entity_id).map(|record| record.state) {
            Some(ConnectionState::Failed) => {
                info!("重新连接已放弃重连的实体: {}", entity_id);
                let (session, transport) = self.open_session(&entity_id);
                if let Some(record) = self.registry.get_mut(&entity_id) {
                    record.callbacks = callbacks;
                    record.reconnect_count = 0;
                    record.attach(session, transport);
                }
                self.emit_status(&entity_id, StatusEvent::Connecting);
            }
            Some(_) => {
                warn!("实体 {} 已在连接中，忽略重复的 connect", entity_id);
            }
            None => {
                info!("连接实体: {}", entity_id);
                let mut record = ConnectionRecord::new(entity_id.clone(), callbacks);
                let (session, transport) = self.open_session(&entity_id);
                record.attach(session, transport);
                self.registry.insert(entity_id, record);
            }
        }
    }

    fn disconnect(&mut self, entity_id: &EntityId) {
        let mut record = match self.registry.remove(entity_id) {
            Some(record) => record,
            None => return,
        };

        // 记录移除后，该会话随后上报的关闭事件会作为过期事件丢弃，不会重连
        record.cancel_retry();
        record.close_transport();
        info!("已断开实体: {}", entity_id);

        self.emit_status(entity_id, StatusEvent::Disconnected);
        record.callbacks.closed(entity_id);
    }

    fn disconnect_all(&mut self) {
        let entity_ids: Vec<EntityId> = self.registry.keys().cloned().collect();
        for entity_id in entity_ids {
            self.disconnect(&entity_id);
        }
    }

    fn on_open(&mut self, entity_id: &EntityId) {
        let callbacks = match self.registry.get_mut(entity_id) {
            Some(record) => {
                record.mark_open();
                record.reconnect_count = 0;
                record.cancel_retry();
                record.connected_since = Some(Utc::now());
                record.callbacks.clone()
            }
            None => return,
        };

        info!("✅ 已连接到实体 {}", entity_id);
        self.emit_status(entity_id, StatusEvent::Connected);
        callbacks.opened(entity_id);
    }

    fn on_message(&mut self, entity_id: &EntityId, text: &str) {
        let dispatch = match handler::dispatch(entity_id, text) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                error!("解析消息失败: entity={}, error={}", entity_id, e);
                return;
            }
        };

        if let Some(event) = dispatch.event {
            self.bus.publish(event);
        }
        if let Some(record) = self.registry.get(entity_id) {
            record.callbacks.message(&dispatch.payload, entity_id);
        }
    }

    fn on_error(&mut self, entity_id: &EntityId, reason: &str) {
        // 错误本身不关闭连接，恢复由随后的关闭事件驱动
        error!("连接错误: entity={}, error={}", entity_id, reason);
        self.emit_status(entity_id, StatusEvent::Error);
    }

    fn on_close(&mut self, entity_id: &EntityId, reason: Option<String>) {
        let callbacks = match self.registry.get_mut(entity_id) {
            Some(record) => {
                if !record.mark_closed() {
                    debug!("忽略同一会话的重复关闭: entity={}, session={}", entity_id, record.session);
                    return;
                }
                record.connected_since = None;
                record.close_transport();
                record.callbacks.clone()
            }
            None => return,
        };

        info!(
            "实体 {} 连接已关闭: {}",
            entity_id,
            reason.as_deref().unwrap_or("无原因")
        );
        self.emit_status(entity_id, StatusEvent::Disconnected);
        callbacks.closed(entity_id);

        self.schedule_reconnect(entity_id);
    }

    fn schedule_reconnect(&mut self, entity_id: &EntityId) {
        let policy = self.config.reconnect;
        let input_tx = self.input_tx.clone();

        let record = match self.registry.get_mut(entity_id) {
            Some(record) => record,
            None => return,
        };
        record.reconnect_count += 1;

        match policy.decide(record.reconnect_count) {
            ReconnectDecision::GiveUp { attempts } => {
                record.state = ConnectionState::Failed;
                record.cancel_retry();
                warn!("实体 {} 已重连 {} 次，放弃自动重连", entity_id, attempts);
                self.emit_status(entity_id, StatusEvent::Error);
            }
            ReconnectDecision::Retry { attempt, delay } => {
                record.state = ConnectionState::Connecting;
                let due = ManagerEvent::RetryDue {
                    entity_id: entity_id.clone(),
                    session: record.session,
                    attempt,
                };
                record.set_retry(ScheduledTask::schedule(delay, async move {
                    if let Some(tx) = input_tx.upgrade() {
                        let _ = tx.send(Input::Event(due));
                    }
                }));
                info!("实体 {} 将在 {:?} 后第 {} 次重连", entity_id, delay, attempt);
                self.emit_status(entity_id, StatusEvent::Connecting);
            }
        }
    }

    fn on_retry_due(&mut self, entity_id: &EntityId, session: u64, attempt: u32) {
        match self.registry.get_mut(entity_id) {
            Some(record) if record.session == session && record.reconnect_count == attempt => {
                record.cancel_retry();
                if record.is_connected() {
                    debug!("实体 {} 已恢复连接，跳过重连", entity_id);
                    return;
                }
            }
            _ => {
                debug!("丢弃过期的重连任务: entity={}, attempt={}", entity_id, attempt);
                return;
            }
        }

        info!("正在重连实体 {} (第 {} 次)", entity_id, attempt);
        let (session, transport) = self.open_session(entity_id);
        if let Some(record) = self.registry.get_mut(entity_id) {
            record.attach(session, transport);
        }
    }

    fn emit_status(&self, entity_id: &EntityId, status: StatusEvent) {
        self.bus.publish(DomainEvent::StatusChanged {
            entity_id: entity_id.clone(),
            status,
        });
    }
}
