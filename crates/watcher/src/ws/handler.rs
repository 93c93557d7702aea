/// 入站消息分发
///
/// 把文本帧解析为 JSON，按 `type` 分类并转换为领域事件

use common::feed::{classify, InboundMessage, MessageKind};
use common::{EntityId, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::events::{DomainEvent, EntityUpdate, StockUpdate};

/// 分发结果
#[derive(Debug)]
pub struct Dispatch {
    /// 已解析的原始负载，交给用户的 on_message 回调
    pub payload: Value,

    /// 需要发布的领域事件
    pub event: Option<DomainEvent>,
}

/// 解析并分发一条文本消息
///
/// 只有 JSON 解析失败时返回错误；未知类型与字段缺失只记录日志
pub fn dispatch(entity_id: &EntityId, text: &str) -> Result<Dispatch> {
    let payload: Value = serde_json::from_str(text)?;
    debug!("收到消息: entity={}, payload={}", entity_id, payload);

    let event = match classify(&payload) {
        MessageKind::Known(msg) => handle_known(entity_id, msg),
        MessageKind::Unrecognized(kind) => {
            warn!(
                "未知消息类型: entity={}, type={}",
                entity_id,
                kind.as_deref().unwrap_or("<missing>")
            );
            None
        }
        MessageKind::Malformed { kind, reason } => {
            error!("消息字段不完整: entity={}, type={}, error={}", entity_id, kind, reason);
            None
        }
    };

    Ok(Dispatch { payload, event })
}

fn handle_known(entity_id: &EntityId, msg: InboundMessage) -> Option<DomainEvent> {
    debug!("已识别消息: entity={}, type={}", entity_id, msg.kind());
    match msg {
        InboundMessage::StockUpdate(update) => Some(DomainEvent::StockUpdate(StockUpdate {
            entity_id: entity_id.clone(),
            stock: update.stock,
            available_stock: update.available_stock,
            is_in_stock: update.is_in_stock,
        })),
        InboundMessage::InitialStock(initial) => {
            // 初始库存只用于展示，不产生领域事件
            debug!(
                "初始库存: entity={}, available_stock={}",
                entity_id, initial.available_stock
            );
            None
        }
        InboundMessage::EntityUpdate(update) => {
            info!("实体已更新: entity={}, update_type={}", entity_id, update.update_type);
            Some(DomainEvent::EntityUpdate(EntityUpdate {
                entity_id: entity_id.clone(),
                update_type: update.update_type,
                data: update.data,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stock_update_event() {
        let id = EntityId::from(42u64);
        let text = r#"{"type": "stock_update", "stock": 7, "available_stock": 3, "is_in_stock": true}"#;

        let result = dispatch(&id, text).unwrap();
        assert_eq!(result.payload["type"], "stock_update");
        assert_eq!(
            result.event,
            Some(DomainEvent::StockUpdate(StockUpdate {
                entity_id: id,
                stock: 7,
                available_stock: 3,
                is_in_stock: true,
            }))
        );
    }

    #[test]
    fn test_entity_update_event() {
        let id = EntityId::from(5u64);
        let text = json!({"type": "entity_update", "update_type": "price", "data": {"price": 12}}).to_string();

        let result = dispatch(&id, &text).unwrap();
        match result.event {
            Some(DomainEvent::EntityUpdate(update)) => {
                assert_eq!(update.update_type, "price");
                assert_eq!(update.data, json!({"price": 12}));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_no_event_kinds() {
        let id = EntityId::from(5u64);
        for text in [
            r#"{"type": "initial_stock", "available_stock": 4}"#,
            r#"{"type": "flash_sale"}"#,
            r#"{"type": "stock_update", "stock": "many"}"#,
            r#"{"hello": "world"}"#,
        ] {
            let result = dispatch(&id, text).unwrap();
            assert!(result.event.is_none(), "{} should not emit", text);
        }
    }

    #[test]
    fn test_invalid_json() {
        let id = EntityId::from(5u64);
        assert!(matches!(
            dispatch(&id, "{not json"),
            Err(common::Error::Serialization(_))
        ));
    }
}
