/// 推送消息定义
///
/// 每个入站帧都是带有 `type` 判别字段的 JSON 对象

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 已知的消息类型判别值
const KNOWN_KINDS: &[&str] = &["stock_update", "initial_stock", "entity_update", "product_update"];

/// 库存变更消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockUpdateMessage {
    pub stock: i64,
    pub available_stock: i64,
    pub is_in_stock: bool,
}

/// 连接建立后服务端推送的初始库存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialStockMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,

    /// 服务端旧版本使用 `available` 字段名
    #[serde(alias = "available")]
    pub available_stock: i64,
}

/// 实体（商品）信息变更消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdateMessage {
    pub update_type: String,

    #[serde(default)]
    pub data: Value,
}

/// 入站消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    StockUpdate(StockUpdateMessage),
    InitialStock(InitialStockMessage),
    #[serde(alias = "product_update")]
    EntityUpdate(EntityUpdateMessage),
}

impl InboundMessage {
    /// 消息类型判别值
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StockUpdate(_) => "stock_update",
            Self::InitialStock(_) => "initial_stock",
            Self::EntityUpdate(_) => "entity_update",
        }
    }
}

/// 消息分类结果
#[derive(Debug)]
pub enum MessageKind {
    /// 已知类型且字段完整
    Known(InboundMessage),

    /// 未知类型，或缺少 `type` 字段
    Unrecognized(Option<String>),

    /// 已知类型但必需字段缺失或类型不符
    Malformed {
        kind: String,
        reason: serde_json::Error,
    },
}

/// 按 `type` 字段对已解析的负载进行分类
pub fn classify(payload: &Value) -> MessageKind {
    let kind = payload.get("type").and_then(Value::as_str);

    match kind {
        Some(kind) if KNOWN_KINDS.contains(&kind) => {
            match InboundMessage::deserialize(payload) {
                Ok(msg) => MessageKind::Known(msg),
                Err(reason) => MessageKind::Malformed {
                    kind: kind.to_string(),
                    reason,
                },
            }
        }
        other => MessageKind::Unrecognized(other.map(str::to_string)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_stock_update() {
        let payload = json!({
            "type": "stock_update",
            "stock": 7,
            "available_stock": 3,
            "is_in_stock": true
        });

        match classify(&payload) {
            MessageKind::Known(InboundMessage::StockUpdate(msg)) => {
                assert_eq!(msg.stock, 7);
                assert_eq!(msg.available_stock, 3);
                assert!(msg.is_in_stock);
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_initial_stock_accepts_legacy_field() {
        let payload = json!({"type": "initial_stock", "product_id": 4, "stock": 9, "available": 2});

        match classify(&payload) {
            MessageKind::Known(InboundMessage::InitialStock(msg)) => {
                assert_eq!(msg.available_stock, 2);
                assert_eq!(msg.stock, Some(9));
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_product_update_alias() {
        let payload = json!({"type": "product_update", "update_type": "price", "data": {"price": "9.90"}});

        let msg = match classify(&payload) {
            MessageKind::Known(msg) => msg,
            other => panic!("unexpected classification: {:?}", other),
        };
        assert_eq!(msg.kind(), "entity_update");
        match msg {
            InboundMessage::EntityUpdate(update) => {
                assert_eq!(update.update_type, "price");
                assert_eq!(update.data["price"], "9.90");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_entity_update_without_data() {
        let payload = json!({"type": "entity_update", "update_type": "deleted"});

        match classify(&payload) {
            MessageKind::Known(InboundMessage::EntityUpdate(update)) => {
                assert!(update.data.is_null());
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field_is_malformed() {
        let payload = json!({"type": "stock_update", "stock": 7});

        match classify(&payload) {
            MessageKind::Malformed { kind, .. } => assert_eq!(kind, "stock_update"),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_missing_type() {
        assert!(matches!(
            classify(&json!({"type": "price_drop"})),
            MessageKind::Unrecognized(Some(ref kind)) if kind == "price_drop"
        ));
        assert!(matches!(
            classify(&json!({"stock": 1})),
            MessageKind::Unrecognized(None)
        ));
        assert!(matches!(
            classify(&json!([1, 2, 3])),
            MessageKind::Unrecognized(None)
        ));
    }
}
