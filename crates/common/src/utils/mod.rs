/// 工具函数集合

use crate::models::EntityId;

/// 根据实体 ID 生成推送端点地址
///
/// 端点只由基础地址与实体 ID 决定，例如 `ws://host/ws/products/42/`
pub fn endpoint_url(base_url: &str, entity_id: &EntityId) -> String {
    format!("{}/{}/", base_url.trim_end_matches('/'), entity_id)
}

/// 验证基础地址是否为 WebSocket 地址
pub fn validate_ws_url(url: &str) -> bool {
    let rest = match url.strip_prefix("ws://").or_else(|| url.strip_prefix("wss://")) {
        Some(rest) => rest,
        None => return false,
    };
    !rest.is_empty() && !rest.starts_with('/')
}
