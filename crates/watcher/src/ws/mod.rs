/// 实时连接模块
/// 
/// 每个实体一条 WebSocket 推送连接，断线后按固定间隔有限次重连

pub mod handler;
pub mod manager;
pub mod reconnect;
pub mod record;
pub mod transport;

pub use manager::ConnectionManager;
pub use reconnect::{ReconnectDecision, ReconnectPolicy, ScheduledTask};
pub use record::{Callbacks, ConnectionInfo, ConnectionState};
pub use transport::{Connector, SessionSink, Transport, TransportEvent, WsConnector};
