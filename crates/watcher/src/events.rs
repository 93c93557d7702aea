/// 领域事件广播
///
/// 连接管理器把入站消息转换为领域事件后在这里发布，
/// 展示层等外部组件通过订阅获取，没有订阅者时事件被直接丢弃

use common::{EntityId, StatusEvent, StockLevel};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

/// 库存变更事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdate {
    pub entity_id: EntityId,
    pub stock: i64,
    pub available_stock: i64,
    pub is_in_stock: bool,
}

impl StockUpdate {
    /// 可用库存水位
    pub fn level(&self) -> StockLevel {
        StockLevel::from_available(self.available_stock)
    }
}

/// 实体信息变更事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdate {
    pub entity_id: EntityId,
    pub update_type: String,
    pub data: serde_json::Value,
}

/// 领域事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum DomainEvent {
    StockUpdate(StockUpdate),
    EntityUpdate(EntityUpdate),
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        entity_id: EntityId,
        status: StatusEvent,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StockUpdate(_) => EventKind::StockUpdate,
            Self::EntityUpdate(_) => EventKind::EntityUpdate,
            Self::StatusChanged { .. } => EventKind::StatusChanged,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::StockUpdate(e) => &e.entity_id,
            Self::EntityUpdate(e) => &e.entity_id,
            Self::StatusChanged { entity_id, .. } => entity_id,
        }
    }
}

/// 事件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StockUpdate,
    EntityUpdate,
    StatusChanged,
}

impl EventKind {
    /// 事件名
    pub fn name(&self) -> &'static str {
        match self {
            Self::StockUpdate => "stockUpdate",
            Self::EntityUpdate => "entityUpdate",
            Self::StatusChanged => "statusChanged",
        }
    }
}

/// 事件总线
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// 创建事件总线，`capacity` 为每个订阅者可积压的事件数
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布事件，返回收到事件的订阅者数量
    pub fn publish(&self, event: DomainEvent) -> usize {
        // 没有订阅者时 send 返回错误，属于正常情况
        self.sender.send(event).unwrap_or(0)
    }

    /// 订阅全部事件
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            kinds: None,
        }
    }

    /// 只订阅指定种类的事件
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            kinds: Some(kinds.to_vec()),
        }
    }

    /// 当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 事件订阅，drop 即取消订阅
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<DomainEvent>,
    kinds: Option<Vec<EventKind>>,
}

impl Subscription {
    fn accepts(&self, event: &DomainEvent) -> bool {
        match &self.kinds {
            Some(kinds) => kinds.contains(&event.kind()),
            None => true,
        }
    }

    /// 等待下一个事件，总线关闭后返回 None
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("事件订阅者处理过慢，丢弃 {} 个事件", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞地获取下一个事件
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("事件订阅者处理过慢，丢弃 {} 个事件", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
