/// 商品实时推送 - 客户端连接管理
/// 
/// 为每个被跟踪的商品维持一条推送连接，把入站消息转换为领域事件，
/// 并在传输失败后自动重连

pub mod config;
pub mod events;
pub mod ws;

pub use config::{Config, ManagerConfig};
pub use events::{DomainEvent, EntityUpdate, EventBus, EventKind, StockUpdate, Subscription};
pub use ws::{Callbacks, ConnectionInfo, ConnectionManager, ConnectionState};
