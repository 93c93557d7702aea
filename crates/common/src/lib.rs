/// 商品实时推送 - 公共库
/// 
/// 提供连接管理器与推送协议共享的类型、错误处理、工具函数等

pub mod errors;
pub mod feed;
pub mod models;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use feed::{InboundMessage, MessageKind};
pub use models::{ConnectionStatus, EntityId, StatusEvent, StockLevel};
