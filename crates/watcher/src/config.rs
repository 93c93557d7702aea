/// 配置管理

use common::utils::validate_ws_url;
use common::{EntityId, Error, Result};
use std::time::Duration;

use crate::ws::ReconnectPolicy;

/// 连接管理器配置
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// 推送端点基础地址，实体 ID 拼接在其后
    pub base_url: String,

    /// 重连策略
    pub reconnect: ReconnectPolicy,

    /// 领域事件广播通道容量
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:8000/ws/products".to_string(),
            reconnect: ReconnectPolicy::default(),
            event_capacity: 256,
        }
    }
}

impl ManagerConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if !validate_ws_url(&self.base_url) {
            return Err(Error::Config(format!(
                "base_url 不是有效的 WebSocket 地址: {}",
                self.base_url
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity 必须大于 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub manager: ManagerConfig,
    pub entity_ids: Vec<EntityId>,
    pub log_level: String,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = ManagerConfig::default();

        let base_url = std::env::var("WS_BASE_URL").unwrap_or(defaults.base_url);

        let max_attempts = std::env::var("WS_MAX_RECONNECT_ATTEMPTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;

        let delay_ms: u64 = std::env::var("WS_RECONNECT_DELAY_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()?;

        let event_capacity: usize = std::env::var("WS_EVENT_CAPACITY")
            .unwrap_or_else(|_| "256".to_string())
            .parse()?;

        let entity_ids = parse_entity_ids(&std::env::var("WATCH_ENTITY_IDS").unwrap_or_default());

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());

        let manager = ManagerConfig {
            base_url,
            reconnect: ReconnectPolicy::new(max_attempts, Duration::from_millis(delay_ms)),
            event_capacity,
        };
        manager.validate()?;

        Ok(Self {
            manager,
            entity_ids,
            log_level,
        })
    }
}

/// 解析逗号分隔的实体 ID 列表，忽略空项与重复项
fn parse_entity_ids(raw: &str) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id = EntityId::from(part);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}
